//! Worktree lifecycle: create, inspect, remove, and orphan scanning.
//!
//! Each plan gets `<base>/<project-slug>/<plan-id>` so parallel plans across
//! projects never share a working directory and serial plans within one
//! project keep their checkouts apart between invocations.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use tracker_core::slug::project_slug;
use tracker_core::{Error, Result};

use crate::storage::Database;
use crate::vcs::Git;

use super::copy::copy_ignored_files;

/// Minimum git version with stable out-of-tree worktrees.
const MIN_GIT_VERSION: (u32, u32) = (2, 5);

/// A worktree directory with no matching plan in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanWorktree {
    pub path: PathBuf,
    pub project_slug: String,
    pub plan_id: i64,
}

/// Manages per-plan isolated checkouts.
#[derive(Clone)]
pub struct WorktreeManager {
    db: Database,
    base: PathBuf,
}

impl WorktreeManager {
    pub const fn new(db: Database, base: PathBuf) -> Self {
        Self { db, base }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Expected worktree path for a plan.
    pub fn path_for(&self, project_path: &Path, plan_id: i64) -> PathBuf {
        self.base
            .join(project_slug(project_path))
            .join(plan_id.to_string())
    }

    /// Whether the host git supports out-of-tree worktrees. Callers degrade
    /// to a branch checkout in the main repo when this is false.
    pub async fn supported(&self, project_path: &Path) -> bool {
        match Git::new(project_path).version().await {
            Ok(Some(version)) => version >= MIN_GIT_VERSION,
            _ => false,
        }
    }

    /// Create the worktree for a plan, ensuring its branch exists first.
    ///
    /// Re-invoking on an existing worktree is a no-op returning the same
    /// path. When `copy_gitignored` is set, local environment files from the
    /// main checkout are carried over.
    pub async fn create(
        &self,
        project_path: &Path,
        branch: &str,
        plan_id: i64,
        copy_gitignored: bool,
    ) -> Result<PathBuf> {
        let git = Git::new(project_path);

        if !git.branch_exists(branch).await? {
            git.create_branch(branch, "main").await?;
        }

        let path = self.path_for(project_path, plan_id);
        if self.exists(project_path, plan_id) {
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = tokio::process::Command::new("git")
            .args(["worktree", "add"])
            .arg(&path)
            .arg(branch)
            .current_dir(project_path)
            .output()
            .await?;
        if !output.status.success() {
            return Err(Error::Vcs {
                command: format!("worktree add {}", path.display()),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        info!(plan_id, branch, path = %path.display(), "created worktree");

        if copy_gitignored {
            if let Err(e) = copy_ignored_files(project_path, &path) {
                warn!(plan_id, error = %e, "gitignored file copy failed");
            }
        }

        Ok(path)
    }

    /// The expected directory exists and carries worktree metadata.
    pub fn exists(&self, project_path: &Path, plan_id: i64) -> bool {
        let path = self.path_for(project_path, plan_id);
        path.is_dir() && path.join(".git").exists()
    }

    /// Force-remove a plan's worktree and prune stale administrative data.
    pub async fn remove(&self, project_path: &Path, plan_id: i64) -> Result<bool> {
        let path = self.path_for(project_path, plan_id);
        if !path.exists() {
            return Ok(false);
        }

        let output = tokio::process::Command::new("git")
            .args(["worktree", "remove", "--force"])
            .arg(&path)
            .current_dir(project_path)
            .output()
            .await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!(plan_id, error = %stderr.trim(), "git worktree remove failed, deleting directory");
            tokio::fs::remove_dir_all(&path).await.ok();
        }

        let _ = tokio::process::Command::new("git")
            .args(["worktree", "prune"])
            .current_dir(project_path)
            .output()
            .await;

        info!(plan_id, path = %path.display(), "removed worktree");
        Ok(true)
    }

    /// Worktrees under the base whose `(project-slug, plan-id)` pair has no
    /// matching plan in the store.
    pub async fn scan_orphans(&self) -> Result<Vec<OrphanWorktree>> {
        let mut orphans = Vec::new();
        let Ok(projects) = std::fs::read_dir(&self.base) else {
            return Ok(orphans);
        };

        for project_entry in projects.flatten() {
            if !project_entry.path().is_dir() {
                continue;
            }
            let slug = project_entry.file_name().to_string_lossy().into_owned();

            let Ok(trees) = std::fs::read_dir(project_entry.path()) else {
                continue;
            };
            for tree_entry in trees.flatten() {
                let name = tree_entry.file_name().to_string_lossy().into_owned();
                let Ok(plan_id) = name.parse::<i64>() else {
                    continue;
                };

                let matched = match self.db.get(plan_id).await {
                    Ok(plan) => project_slug(&plan.project_path()) == slug,
                    Err(Error::NotFound(_)) => false,
                    Err(e) => return Err(e),
                };
                if !matched {
                    orphans.push(OrphanWorktree {
                        path: tree_entry.path(),
                        project_slug: slug.clone(),
                        plan_id,
                    });
                }
            }
        }

        orphans.sort_by(|a, b| (&a.project_slug, a.plan_id).cmp(&(&b.project_slug, b.plan_id)));
        Ok(orphans)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "test@example.com"],
            vec!["config", "user.name", "Test"],
            vec!["commit", "--allow-empty", "-m", "init"],
        ] {
            let out = tokio::process::Command::new("git")
                .args(&args)
                .current_dir(dir)
                .output()
                .await
                .unwrap();
            assert!(out.status.success(), "git {args:?} failed");
        }
    }

    async fn manager() -> (WorktreeManager, tempfile::TempDir) {
        let db = Database::open_in_memory().await.unwrap();
        let base = tempfile::tempdir().unwrap();
        (WorktreeManager::new(db, base.path().to_path_buf()), base)
    }

    #[tokio::test]
    async fn path_derivation_uses_slug_and_id() {
        let (mgr, base) = manager().await;
        let path = mgr.path_for(Path::new("/home/user/projects/myrepo"), 5);
        assert_eq!(path, base.path().join("projects-myrepo").join("5"));
    }

    #[tokio::test]
    async fn supported_on_host_git() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let (mgr, _base) = manager().await;
        assert!(mgr.supported(repo.path()).await);
    }

    #[tokio::test]
    async fn create_makes_branch_and_worktree() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let (mgr, _base) = manager().await;

        let path = mgr.create(repo.path(), "plan/1-x", 1, false).await.unwrap();
        assert!(mgr.exists(repo.path(), 1));
        assert!(path.join(".git").exists());

        let git = Git::new(repo.path());
        assert!(git.branch_exists("plan/1-x").await.unwrap());
        assert_eq!(
            Git::new(&path).current_branch().await.unwrap(),
            "plan/1-x"
        );
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let (mgr, _base) = manager().await;

        let first = mgr.create(repo.path(), "plan/2-y", 2, false).await.unwrap();
        let second = mgr.create(repo.path(), "plan/2-y", 2, false).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn create_copies_gitignored_env_files() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        std::fs::write(repo.path().join(".gitignore"), ".env\n").unwrap();
        std::fs::write(repo.path().join(".env"), "KEY=local").unwrap();

        let (mgr, _base) = manager().await;
        let path = mgr.create(repo.path(), "plan/3-z", 3, true).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(path.join(".env")).unwrap(),
            "KEY=local"
        );
    }

    #[tokio::test]
    async fn remove_deletes_directory() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;
        let (mgr, _base) = manager().await;

        mgr.create(repo.path(), "plan/4-w", 4, false).await.unwrap();
        assert!(mgr.remove(repo.path(), 4).await.unwrap());
        assert!(!mgr.exists(repo.path(), 4));
        assert!(!mgr.remove(repo.path(), 4).await.unwrap());
    }

    #[tokio::test]
    async fn scan_orphans_flags_unknown_plans() {
        let repo = tempfile::tempdir().unwrap();
        init_repo(repo.path()).await;

        let db = Database::open_in_memory().await.unwrap();
        let base = tempfile::tempdir().unwrap();
        let mgr = WorktreeManager::new(db.clone(), base.path().to_path_buf());

        let plan = db.create_task(repo.path(), "known", None).await.unwrap();
        mgr.create(repo.path(), "plan/known", plan.id, false)
            .await
            .unwrap();

        // A directory nobody tracks.
        let orphan_dir = base.path().join(project_slug(repo.path())).join("99");
        std::fs::create_dir_all(&orphan_dir).unwrap();

        let orphans = mgr.scan_orphans().await.unwrap();
        assert_eq!(orphans.len(), 1);
        assert_eq!(orphans[0].plan_id, 99);
        assert_eq!(orphans[0].path, orphan_dir);
    }
}
