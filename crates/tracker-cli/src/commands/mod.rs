//! Command implementations.

pub mod config_cmd;
pub mod deps;
pub mod lifecycle;
pub mod plan;
pub mod shell;
pub mod task;
pub mod ui_cmd;
pub mod work;

use std::path::PathBuf;

use tracker_core::config::Config;
use tracker_core::paths;
use tracker_engine::storage::{Database, Plan};

/// Shared handles every command needs.
pub struct Context {
    pub db: Database,
    pub config: Config,
    pub config_path: PathBuf,
    pub logs_dir: PathBuf,
    pub plans_dir: PathBuf,
    pub worktree_base: PathBuf,
}

impl Context {
    pub async fn load() -> anyhow::Result<Self> {
        let config_path = paths::config_path()?;
        let config = Config::load(&config_path);
        let db = Database::open(&paths::database_path()?).await?;
        Ok(Self {
            db,
            config,
            config_path,
            logs_dir: paths::logs_dir()?,
            plans_dir: paths::plans_dir()?,
            worktree_base: paths::worktree_base()?,
        })
    }
}

/// One-line rendering used by `list` and the work reports.
pub fn plan_line(plan: &Plan) -> String {
    let dep = plan
        .depends_on_id
        .map(|d| format!("  (after #{d})"))
        .unwrap_or_default();
    format!(
        "#{:<4} [{:<11}] {}{}",
        plan.id,
        plan.status,
        plan.title,
        dep
    )
}
