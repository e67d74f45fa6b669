//! Gitignored environment-file copy.
//!
//! A fresh worktree carries only tracked files; the agent usually also needs
//! the repo's local configuration (`.env`, tool version pins, editor dirs)
//! that the ignore rules keep out of version control. This walks the source
//! checkout and copies everything the ignore rules catch, bounded at 10 MiB
//! per file, skipping anything already present in the destination.
//!
//! Matching is full gitignore dialect: `*` (non-slash), `**`, `?`, character
//! classes, leading-`/` anchoring, trailing-`/` directory-only patterns, and
//! `!` negation with later patterns overriding earlier ones. A built-in set
//! of common environment-file patterns is layered *under* the repo's own
//! rules so repository negations win.

use std::path::Path;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use tracker_core::{Error, Result};

/// Per-file size cap.
const MAX_COPY_BYTES: u64 = 10 * 1024 * 1024;

/// Environment files worth carrying into a worktree even when the repository
/// has no ignore rule of its own for them.
const ENV_FILE_PATTERNS: &[&str] = &[
    ".env",
    ".env.*",
    "*.local",
    ".envrc",
    ".npmrc",
    ".yarnrc",
    ".nvmrc",
    ".tool-versions",
    ".python-version",
    ".mise.toml",
    ".claude/",
    ".vscode/",
    ".idea/",
];

/// What a copy pass did.
#[derive(Debug, Default, Clone)]
pub struct CopyReport {
    pub copied: usize,
    pub skipped_existing: usize,
    pub skipped_oversize: usize,
}

/// Build the combined matcher for a repository root.
fn build_matcher(repo_root: &Path) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new(repo_root);

    // Built-in env patterns first; repo rules added later override them.
    for pattern in ENV_FILE_PATTERNS {
        builder
            .add_line(None, pattern)
            .map_err(|e| Error::Input(format!("bad built-in ignore pattern {pattern:?}: {e}")))?;
    }

    for file in [".gitignore", ".git/info/exclude"] {
        let path = repo_root.join(file);
        if path.is_file() {
            // add() reports per-line problems; a broken user rule should not
            // abort the copy.
            if let Some(e) = builder.add(&path) {
                warn!(path = %path.display(), error = %e, "ignoring unreadable ignore file");
            }
        }
    }

    builder
        .build()
        .map_err(|e| Error::Input(format!("building ignore matcher: {e}")))
}

/// Copy ignored files from `repo_root` into `dest_root`.
pub fn copy_ignored_files(repo_root: &Path, dest_root: &Path) -> Result<CopyReport> {
    let matcher = build_matcher(repo_root)?;
    let mut report = CopyReport::default();
    walk(repo_root, repo_root, dest_root, &matcher, &mut report)?;
    debug!(
        copied = report.copied,
        skipped_existing = report.skipped_existing,
        skipped_oversize = report.skipped_oversize,
        "gitignored file copy complete"
    );
    Ok(report)
}

fn walk(
    dir: &Path,
    repo_root: &Path,
    dest_root: &Path,
    matcher: &Gitignore,
    report: &mut CopyReport,
) -> Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            if entry.file_name() == ".git" {
                continue;
            }
            walk(&path, repo_root, dest_root, matcher, report)?;
            continue;
        }
        if !file_type.is_file() {
            continue;
        }

        if !matcher.matched_path_or_any_parents(&path, false).is_ignore() {
            continue;
        }

        let Ok(rel) = path.strip_prefix(repo_root) else {
            continue;
        };
        let dest = dest_root.join(rel);
        if dest.exists() {
            report.skipped_existing += 1;
            continue;
        }

        let size = entry.metadata()?.len();
        if size > MAX_COPY_BYTES {
            report.skipped_oversize += 1;
            continue;
        }

        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&path, &dest)?;
        report.copied += 1;
    }
    Ok(())
}
