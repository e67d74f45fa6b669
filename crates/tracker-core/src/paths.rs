//! Data-directory layout.
//!
//! All durable state lives under the platform data directory
//! (`~/.local/share/task-tracker` on Linux, `~/Library/Application Support`
//! on macOS). Worktrees get their own base under the home directory so the
//! checkouts are easy to find and nuke by hand.

use std::path::PathBuf;

use crate::error::{Error, Result};

const APP_DIR: &str = "task-tracker";

/// Root data directory, created on demand.
pub fn data_dir() -> Result<PathBuf> {
    let base = dirs::data_dir()
        .or_else(dirs::home_dir)
        .ok_or_else(|| Error::Config("could not determine a data directory".into()))?;
    Ok(base.join(APP_DIR))
}

/// Path to the plans database.
pub fn database_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("plans.db"))
}

/// Path to the JSON config document.
pub fn config_path() -> Result<PathBuf> {
    Ok(data_dir()?.join("config.json"))
}

/// Directory holding per-plan JSONL log files.
pub fn logs_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("logs"))
}

/// Directory holding generated plan documents for tasks created without one.
pub fn plans_dir() -> Result<PathBuf> {
    Ok(data_dir()?.join("plans"))
}

/// Base directory for per-plan isolated worktrees.
pub fn worktree_base() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("could not determine home directory".into()))?;
    Ok(home.join(".task-tracker").join("worktrees"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_lives_under_data_dir() {
        let db = database_path().unwrap();
        assert!(db.starts_with(data_dir().unwrap()));
        assert_eq!(db.file_name().unwrap(), "plans.db");
    }

    #[test]
    fn worktree_base_is_under_home() {
        let base = worktree_base().unwrap();
        assert!(base.ends_with(".task-tracker/worktrees"));
    }
}
