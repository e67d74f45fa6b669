//! Completion, reset, cancellation, and cleanup.

use anyhow::bail;
use owo_colors::OwoColorize;

use tracker_core::Error;
use tracker_engine::state;
use tracker_engine::storage::{Plan, PlanStatus};
use tracker_engine::vcs::Git;
use tracker_engine::worktree::WorktreeManager;

use super::Context;

/// Merge an approved plan into main.
///
/// Merge order is main -> branch -> main: conflicts surface on the feature
/// branch, never on main. There is deliberately no rebase path.
pub async fn complete(ctx: &Context, id: Option<i64>, db_only: bool) -> anyhow::Result<()> {
    let plan = match id {
        Some(id) => ctx.db.get(id).await?,
        None => infer_from_current_branch(ctx).await?,
    };
    let id = plan.id;

    if plan.status() != PlanStatus::InReview {
        bail!(
            "plan {id} is {}; only in-review plans can be completed",
            plan.status()
        );
    }
    let gate = state::can_complete(&ctx.db, id).await?;
    if !gate.allowed {
        bail!("cannot complete plan {id}: {}", gate.reason.unwrap_or_default());
    }

    if !db_only {
        let Some(branch) = plan.branch.clone() else {
            bail!("plan {id} has no branch recorded");
        };
        let project = plan.project_path();

        // Bring main into the branch first, inside the branch's checkout.
        if let Some(worktree) = &plan.worktree_path {
            Git::new(worktree).merge("main").await?;
        } else {
            let git = Git::new(&project);
            git.checkout(&branch).await?;
            git.merge("main").await?;
        }

        // Then fast-forward main.
        let git = Git::new(&project);
        git.checkout("main").await?;
        git.merge(&branch).await?;

        if ctx.config.worktree.auto_cleanup_on_complete && plan.worktree_path.is_some() {
            let manager = WorktreeManager::new(ctx.db.clone(), ctx.worktree_base.clone());
            manager.remove(&project, id).await?;
            ctx.db.update_worktree_path(id, None).await?;
        }
    }

    ctx.db.update_status(id, PlanStatus::Completed).await?;
    println!("{} plan #{id} merged to main", "completed".green());
    Ok(())
}

async fn infer_from_current_branch(ctx: &Context) -> anyhow::Result<Plan> {
    let cwd = std::env::current_dir()?;
    let branch = Git::new(&cwd).current_branch().await?;
    let plans = ctx.db.list().await?;
    plans
        .into_iter()
        .find(|p| p.branch.as_deref() == Some(branch.as_str()))
        .ok_or_else(|| anyhow::anyhow!("no plan owns the current branch {branch:?}; pass an id"))
}

/// Return a plan to open, optionally destroying its branch and worktree.
pub async fn reset(ctx: &Context, id: i64, delete_branch: bool) -> anyhow::Result<()> {
    let plan = ctx.db.get(id).await?;

    if plan.status() == PlanStatus::Completed && !delete_branch {
        bail!(
            "plan {id} is completed; resetting it discards the merge bookkeeping. \
             Re-run with --delete-branch to confirm branch deletion"
        );
    }

    if delete_branch {
        remove_branch_artifacts(ctx, &plan).await;
        ctx.db.clear_work_state(id).await?;
    }
    ctx.db.update_status(id, PlanStatus::Open).await?;
    println!("plan #{id} reset to open");
    Ok(())
}

/// Delete a plan record and its branch. Cannot stop an in-flight agent: the
/// subprocess was detached from whatever CLI spawned it.
pub async fn cancel(ctx: &Context, id: i64) -> anyhow::Result<()> {
    let plan = ctx.db.get(id).await?;

    let dependents = ctx.db.get_dependents(id).await?;
    if !dependents.is_empty() {
        let ids: Vec<String> = dependents.iter().map(|p| format!("#{}", p.id)).collect();
        return Err(Error::State(format!(
            "cannot cancel plan {id}: plans {} depend on it",
            ids.join(", ")
        ))
        .into());
    }

    remove_branch_artifacts(ctx, &plan).await;
    ctx.db.delete(id).await?;
    println!("cancelled plan #{id}");
    Ok(())
}

/// Best-effort removal of worktree and branch; failures are reported, not
/// fatal, so a half-removed checkout never wedges the record update.
async fn remove_branch_artifacts(ctx: &Context, plan: &Plan) {
    let project = plan.project_path();

    if plan.worktree_path.is_some() {
        let manager = WorktreeManager::new(ctx.db.clone(), ctx.worktree_base.clone());
        if let Err(e) = manager.remove(&project, plan.id).await {
            eprintln!("warning: failed to remove worktree: {e}");
        }
    }

    if let Some(branch) = &plan.branch {
        let git = Git::new(&project);
        match git.branch_exists(branch).await {
            Ok(true) => {
                // The branch may be checked out in the main repo.
                if git.current_branch().await.ok().as_deref() == Some(branch.as_str()) {
                    let _ = git.checkout("main").await;
                }
                if let Err(e) = git.branch_delete(branch).await {
                    eprintln!("warning: failed to delete branch {branch}: {e}");
                }
            }
            Ok(false) => {}
            Err(e) => eprintln!("warning: could not inspect branch {branch}: {e}"),
        }
    }
}

/// Remove orphaned worktrees and log files for plans that no longer exist.
pub async fn cleanup(ctx: &Context) -> anyhow::Result<()> {
    let manager = WorktreeManager::new(ctx.db.clone(), ctx.worktree_base.clone());
    let orphans = manager.scan_orphans().await?;

    if orphans.is_empty() {
        println!("no orphaned worktrees");
    }
    for orphan in &orphans {
        match std::fs::remove_dir_all(&orphan.path) {
            Ok(()) => println!(
                "removed orphaned worktree {} (plan #{} gone)",
                orphan.path.display(),
                orphan.plan_id
            ),
            Err(e) => eprintln!("warning: could not remove {}: {e}", orphan.path.display()),
        }
    }

    // Logs whose plan id no longer resolves.
    let mut stale_logs = 0usize;
    if let Ok(entries) = std::fs::read_dir(&ctx.logs_dir) {
        for entry in entries.flatten() {
            let name = entry.file_name().to_string_lossy().into_owned();
            let Some(id) = name
                .split('-')
                .next()
                .and_then(|prefix| prefix.parse::<i64>().ok())
            else {
                continue;
            };
            if matches!(ctx.db.get(id).await, Err(Error::NotFound(_)))
                && std::fs::remove_file(entry.path()).is_ok()
            {
                stale_logs += 1;
            }
        }
    }
    if stale_logs > 0 {
        println!("removed {stale_logs} stale log file(s)");
    }

    // Keep git's own worktree bookkeeping tidy for every known project.
    let mut seen = std::collections::HashSet::new();
    for plan in ctx.db.list().await? {
        if seen.insert(plan.project_path.clone()) {
            let _ = tokio::process::Command::new("git")
                .args(["worktree", "prune"])
                .current_dir(plan.project_path())
                .output()
                .await;
        }
    }

    Ok(())
}
