//! Per-plan JSONL log files.
//!
//! One file per `work` invocation, named `<id>-<iso-utc>.jsonl` with the
//! timestamp separators flattened to dashes so the names sort and stay
//! shell-safe. Concurrent plans write to distinct files, never interleaved.

use std::path::{Path, PathBuf};

use chrono::{SecondsFormat, Utc};
use tracker_core::Result;

/// Allocate a fresh log path for a plan, creating the logs directory.
pub fn create_log_path(logs_dir: &Path, plan_id: i64) -> Result<PathBuf> {
    std::fs::create_dir_all(logs_dir)?;
    let stamp = Utc::now()
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    Ok(logs_dir.join(format!("{plan_id}-{stamp}.jsonl")))
}

/// The most recent log file for a plan, by filename ordering.
pub fn find_latest(logs_dir: &Path, plan_id: i64) -> Option<PathBuf> {
    let prefix = format!("{plan_id}-");
    let mut newest: Option<(String, PathBuf)> = None;

    for entry in std::fs::read_dir(logs_dir).ok()?.flatten() {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) || !name.ends_with(".jsonl") {
            continue;
        }
        if newest.as_ref().is_none_or(|(best, _)| name > *best) {
            newest = Some((name, entry.path()));
        }
    }

    newest.map(|(_, path)| path)
}

/// All log files belonging to a plan.
pub fn list_for_plan(logs_dir: &Path, plan_id: i64) -> Vec<PathBuf> {
    let prefix = format!("{plan_id}-");
    let Ok(entries) = std::fs::read_dir(logs_dir) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .flatten()
        .filter(|e| {
            let name = e.file_name().to_string_lossy().into_owned();
            name.starts_with(&prefix) && name.ends_with(".jsonl")
        })
        .map(|e| e.path())
        .collect();
    files.sort();
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_name_has_id_prefix_and_no_colons() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_log_path(dir.path(), 7).unwrap();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("7-"));
        assert!(name.ends_with(".jsonl"));
        assert!(!name.contains(':'));
    }

    #[test]
    fn find_latest_picks_newest_for_right_plan() {
        let dir = tempfile::tempdir().unwrap();
        for name in [
            "1-2026-01-01T00-00-00-000Z.jsonl",
            "1-2026-02-01T00-00-00-000Z.jsonl",
            "2-2026-03-01T00-00-00-000Z.jsonl",
            "10-2026-04-01T00-00-00-000Z.jsonl",
        ] {
            std::fs::write(dir.path().join(name), "").unwrap();
        }

        let latest = find_latest(dir.path(), 1).unwrap();
        assert_eq!(
            latest.file_name().unwrap(),
            "1-2026-02-01T00-00-00-000Z.jsonl"
        );
        assert!(find_latest(dir.path(), 3).is_none());
    }

    #[test]
    fn prefix_match_does_not_cross_ids() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("12-2026-01-01T00-00-00-000Z.jsonl"), "").unwrap();
        assert!(find_latest(dir.path(), 1).is_none());
        assert_eq!(list_for_plan(dir.path(), 12).len(), 1);
    }

    #[test]
    fn missing_dir_is_empty() {
        assert!(find_latest(Path::new("/nonexistent-dir"), 1).is_none());
        assert!(list_for_plan(Path::new("/nonexistent-dir"), 1).is_empty());
    }
}
