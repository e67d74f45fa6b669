//! Plan scheduling: serial per project, parallel across projects.
//!
//! One `work` invocation runs a batch of plans to completion and returns;
//! there is no persistent supervisor. Dependency blocking is advisory at
//! call time: a blocked plan is skipped with a message, not queued, and the
//! user re-invokes once the predecessor advances.

use std::path::PathBuf;

use tokio::task::JoinSet;
use tracing::{error, info, warn};

use tracker_core::config::Config;
use tracker_core::slug::branch_name;
use tracker_core::Result;

use crate::agent::AgentRunner;
use crate::review::{ReviewContext, ReviewLoop, ReviewOutcome};
use crate::state;
use crate::storage::{Database, Plan, PlanStatus};
use crate::usage;
use crate::vcs::Git;
use crate::worktree::WorktreeManager;

/// How one plan's run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanRunResult {
    /// Dependency gate was closed; nothing was started.
    Skipped { reason: String },
    /// The review loop ran to an outcome.
    Finished { outcome: ReviewOutcome },
    /// Provisioning or supervision failed.
    Failed { error: String },
}

/// Per-plan report for the caller to print.
#[derive(Debug, Clone)]
pub struct PlanReport {
    pub plan_id: i64,
    pub title: String,
    pub project_path: String,
    pub result: PlanRunResult,
}

/// Multiplexes plan runs across projects.
#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    config: Config,
    logs_dir: PathBuf,
    worktree_base: PathBuf,
    agent_binary: Option<PathBuf>,
}

impl Scheduler {
    pub fn new(db: Database, config: Config, logs_dir: PathBuf, worktree_base: PathBuf) -> Self {
        Self {
            db,
            config,
            logs_dir,
            worktree_base,
            agent_binary: None,
        }
    }

    /// Override the agent binary (tests point this at a stub).
    pub fn with_agent_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.agent_binary = Some(binary.into());
        self
    }

    /// Work a batch of plans. Per project the list order is kept and runs
    /// are strictly sequential; across projects groups run concurrently.
    /// Group failures are collected, never cancelling sibling groups.
    pub async fn work(&self, ids: &[i64]) -> Result<Vec<PlanReport>> {
        let mut plans = Vec::with_capacity(ids.len());
        for id in ids {
            plans.push(self.db.get(*id).await?);
        }

        usage::preflight(&self.config.usage_limits).await?;

        // Partition by project, preserving submission order inside a group
        // and the order groups first appear.
        let mut groups: Vec<(String, Vec<Plan>)> = Vec::new();
        for plan in plans {
            match groups.iter_mut().find(|(p, _)| *p == plan.project_path) {
                Some((_, group)) => group.push(plan),
                None => groups.push((plan.project_path.clone(), vec![plan])),
            }
        }

        let mut set: JoinSet<Vec<PlanReport>> = JoinSet::new();
        for (project, group) in groups {
            let scheduler = self.clone();
            set.spawn(async move {
                info!(project = %project, plans = group.len(), "starting project group");
                let mut reports = Vec::with_capacity(group.len());
                for plan in group {
                    reports.push(scheduler.run_one(plan).await);
                }
                reports
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(group_reports) => reports.extend(group_reports),
                Err(e) => error!(error = %e, "project group task panicked"),
            }
        }
        reports.sort_by_key(|r| r.plan_id);
        Ok(reports)
    }

    async fn run_one(&self, plan: Plan) -> PlanReport {
        let plan_id = plan.id;
        let title = plan.title.clone();
        let project_path = plan.project_path.clone();

        let result = match self.try_run(plan).await {
            Ok(result) => result,
            Err(e) => {
                error!(plan_id, error = %e, "plan run failed");
                PlanRunResult::Failed {
                    error: e.to_string(),
                }
            }
        };

        PlanReport {
            plan_id,
            title,
            project_path,
            result,
        }
    }

    async fn try_run(&self, plan: Plan) -> Result<PlanRunResult> {
        let gate = state::can_start(&self.db, plan.id).await?;
        if !gate.allowed {
            let reason = gate.reason.unwrap_or_else(|| "blocked".into());
            warn!(plan_id = plan.id, %reason, "skipping blocked plan");
            return Ok(PlanRunResult::Skipped { reason });
        }

        self.db.update_status(plan.id, PlanStatus::InProgress).await?;

        let branch = branch_name(plan.id, &plan.title);
        self.db.update_branch(plan.id, &branch).await?;

        let project = plan.project_path();
        let manager = WorktreeManager::new(self.db.clone(), self.worktree_base.clone());
        let workdir = if self.config.worktree.enabled && manager.supported(&project).await {
            let path = manager
                .create(
                    &project,
                    &branch,
                    plan.id,
                    self.config.worktree.copy_gitignored,
                )
                .await?;
            self.db.update_worktree_path(plan.id, Some(&path)).await?;
            path
        } else {
            // Degraded mode: check the branch out in the main repo. The
            // per-project serial discipline keeps this safe.
            let git = Git::new(&project);
            if !git.branch_exists(&branch).await? {
                git.create_branch(&branch, "main").await?;
            }
            git.checkout(&branch).await?;
            project.clone()
        };

        let plan_content = self.plan_content(&self.db.get(plan.id).await?);
        let log_path = crate::logs::create_log_path(&self.logs_dir, plan.id)?;

        let mut runner = AgentRunner::new(&self.config);
        if let Some(binary) = &self.agent_binary {
            runner = runner.with_binary(binary);
        }
        let review = ReviewLoop::new(runner, self.config.max_review_rounds);
        let ctx = ReviewContext {
            plan_id: plan.id,
            plan_content: &plan_content,
            workdir: &workdir,
            log_path: &log_path,
        };
        let outcome = review.run(&self.db, &ctx).await?;

        if outcome.worker_succeeded() {
            self.db.update_status(plan.id, PlanStatus::InReview).await?;
        }
        // A failed worker leaves the plan in-progress for inspection.

        Ok(PlanRunResult::Finished { outcome })
    }

    /// The body handed to the agent: the plan file when present, else a
    /// document synthesized from the title and description.
    fn plan_content(&self, plan: &Plan) -> String {
        if !plan.plan_path.is_empty() {
            if let Ok(content) = std::fs::read_to_string(&plan.plan_path) {
                return content;
            }
            warn!(plan_id = plan.id, path = %plan.plan_path, "plan file unreadable, using description");
        }
        format!("# {}\n\n{}\n", plan.title, plan.description)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use std::path::Path;

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-b", "main"],
            vec!["config", "user.email", "t@example.com"],
            vec!["config", "user.name", "T"],
            vec!["commit", "--allow-empty", "-m", "init"],
        ] {
            assert!(tokio::process::Command::new("git")
                .args(&args)
                .current_dir(dir)
                .output()
                .await
                .unwrap()
                .status
                .success());
        }
    }

    /// Stub agent: commits a change on worker runs, approves on review runs.
    fn approving_agent(dir: &Path) -> PathBuf {
        let path = dir.join("fake-agent");
        let script = r#"#!/bin/sh
PROMPT=$(cat)
case "$PROMPT" in
  *"<diff>"*)
    echo '{"type":"assistant","message":{"content":[{"type":"text","text":"<verdict>APPROVE</verdict>"}]}}'
    ;;
  *)
    echo "work" >> agent-output.txt
    git add -A >/dev/null 2>&1
    git commit -m "agent work" >/dev/null 2>&1
    echo '{"type":"assistant","message":{"content":[{"type":"text","text":"done"}]}}'
    ;;
esac
echo '{"type":"result","subtype":"success","session_id":"sess"}'
"#;
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn scheduler(db: &Database, stub: &Path, tmp: &Path) -> Scheduler {
        let config = Config::with_defaults();
        Scheduler::new(
            db.clone(),
            config,
            tmp.join("logs"),
            tmp.join("worktrees"),
        )
        .with_agent_binary(stub)
    }

    #[tokio::test]
    async fn happy_path_single_plan() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("r");
        std::fs::create_dir_all(&repo).unwrap();
        init_repo(&repo).await;
        let stub = approving_agent(tmp.path());

        let db = Database::open_in_memory().await.unwrap();
        let plan = db.create_task(&repo, "Add X", None).await.unwrap();

        let reports = scheduler(&db, &stub, tmp.path()).work(&[plan.id]).await.unwrap();
        assert_eq!(reports.len(), 1);
        assert_eq!(
            reports[0].result,
            PlanRunResult::Finished {
                outcome: ReviewOutcome::Approved { rounds: 1 }
            }
        );

        let plan = db.get(plan.id).await.unwrap();
        assert_eq!(plan.status(), PlanStatus::InReview);
        assert_eq!(plan.branch.as_deref(), Some("plan/1-add-x"));
        assert!(plan.session_id.is_some());
        assert!(plan.worktree_path.is_some());

        // Branch exists in the project repo.
        assert!(Git::new(&repo).branch_exists("plan/1-add-x").await.unwrap());

        // Exactly one log file for the plan.
        assert_eq!(crate::logs::list_for_plan(&tmp.path().join("logs"), plan.id).len(), 1);
    }

    #[tokio::test]
    async fn blocked_plan_is_skipped_not_started() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("r");
        std::fs::create_dir_all(&repo).unwrap();
        init_repo(&repo).await;
        let stub = approving_agent(tmp.path());

        let db = Database::open_in_memory().await.unwrap();
        let a = db.create_task(&repo, "A", None).await.unwrap();
        let b = db.create_task(&repo, "B", None).await.unwrap();
        db.set_dependency(b.id, Some(a.id)).await.unwrap();

        let reports = scheduler(&db, &stub, tmp.path()).work(&[b.id]).await.unwrap();
        match &reports[0].result {
            PlanRunResult::Skipped { reason } => {
                assert!(reason.contains(&format!("#{}", a.id)), "{reason}");
            }
            other => panic!("expected skip, got {other:?}"),
        }
        assert_eq!(db.get(b.id).await.unwrap().status(), PlanStatus::Open);
        assert!(db.get(b.id).await.unwrap().branch.is_none());
    }

    #[tokio::test]
    async fn dependent_runs_once_predecessor_in_review() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("r");
        std::fs::create_dir_all(&repo).unwrap();
        init_repo(&repo).await;
        let stub = approving_agent(tmp.path());

        let db = Database::open_in_memory().await.unwrap();
        let a = db.create_task(&repo, "A", None).await.unwrap();
        let b = db.create_task(&repo, "B", None).await.unwrap();
        db.set_dependency(b.id, Some(a.id)).await.unwrap();
        db.update_status(a.id, PlanStatus::InReview).await.unwrap();

        let reports = scheduler(&db, &stub, tmp.path()).work(&[b.id]).await.unwrap();
        assert!(matches!(reports[0].result, PlanRunResult::Finished { .. }));
        assert_eq!(db.get(b.id).await.unwrap().status(), PlanStatus::InReview);
    }

    #[tokio::test]
    async fn cross_project_plans_both_finish() {
        let tmp = tempfile::tempdir().unwrap();
        let r1 = tmp.path().join("r1");
        let r2 = tmp.path().join("r2");
        std::fs::create_dir_all(&r1).unwrap();
        std::fs::create_dir_all(&r2).unwrap();
        init_repo(&r1).await;
        init_repo(&r2).await;
        let stub = approving_agent(tmp.path());

        let db = Database::open_in_memory().await.unwrap();
        let p1 = db.create_task(&r1, "One", None).await.unwrap();
        let p2 = db.create_task(&r2, "Two", None).await.unwrap();

        let reports = scheduler(&db, &stub, tmp.path())
            .work(&[p1.id, p2.id])
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        for report in &reports {
            assert!(
                matches!(report.result, PlanRunResult::Finished { .. }),
                "{report:?}"
            );
        }
        assert_eq!(db.get(p1.id).await.unwrap().status(), PlanStatus::InReview);
        assert_eq!(db.get(p2.id).await.unwrap().status(), PlanStatus::InReview);

        // Distinct worktrees, distinct log files.
        let w1 = db.get(p1.id).await.unwrap().worktree_path.unwrap();
        let w2 = db.get(p2.id).await.unwrap().worktree_path.unwrap();
        assert_ne!(w1, w2);
        assert_eq!(crate::logs::list_for_plan(&tmp.path().join("logs"), p1.id).len(), 1);
        assert_eq!(crate::logs::list_for_plan(&tmp.path().join("logs"), p2.id).len(), 1);
    }

    #[tokio::test]
    async fn unknown_id_aborts_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let db = Database::open_in_memory().await.unwrap();
        let stub = approving_agent(tmp.path());
        assert!(scheduler(&db, &stub, tmp.path()).work(&[42]).await.is_err());
    }

    #[tokio::test]
    async fn worker_failure_leaves_plan_in_progress() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = tmp.path().join("r");
        std::fs::create_dir_all(&repo).unwrap();
        init_repo(&repo).await;

        let stub = tmp.path().join("failing-agent");
        std::fs::write(&stub, "#!/bin/sh\ncat > /dev/null\nexit 1\n").unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let db = Database::open_in_memory().await.unwrap();
        let plan = db.create_task(&repo, "Doomed", None).await.unwrap();

        let reports = scheduler(&db, &stub, tmp.path()).work(&[plan.id]).await.unwrap();
        assert_eq!(
            reports[0].result,
            PlanRunResult::Finished {
                outcome: ReviewOutcome::WorkerFailed { exit_code: 1 }
            }
        );
        assert_eq!(db.get(plan.id).await.unwrap().status(), PlanStatus::InProgress);
    }
}
