//! Durable plan records and dependency edges.

mod db;
mod models;
mod queries;

pub use db::Database;
pub use models::{Plan, PlanStatus};
