//! Shared foundation for the tracker orchestrator.
//!
//! Holds the pieces every other crate needs: the error taxonomy, typed
//! configuration, data-directory layout, the agent's stream-JSON protocol,
//! SQLite pool helpers, and tracing setup.

pub mod config;
pub mod db;
pub mod error;
pub mod paths;
pub mod planfile;
pub mod slug;
pub mod stream;
pub mod tracing_init;

pub use error::{Error, Result};
