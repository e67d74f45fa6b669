//! Shared application state for the dashboard.

use std::path::PathBuf;

use tracker_core::config::Config;
use tracker_engine::storage::Database;

/// State shared by every handler. Cheap to clone.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub config: Config,
    pub logs_dir: PathBuf,
    pub plans_dir: PathBuf,
    /// The tracker binary itself, re-invoked for detached `work` children.
    pub tracker_exe: PathBuf,
}

impl AppState {
    pub fn new(
        db: Database,
        config: Config,
        logs_dir: PathBuf,
        plans_dir: PathBuf,
        tracker_exe: PathBuf,
    ) -> Self {
        Self {
            db,
            config,
            logs_dir,
            plans_dir,
            tracker_exe,
        }
    }
}
