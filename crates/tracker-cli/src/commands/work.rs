//! Work scheduling, branch checkout, and conversation resumption.

use anyhow::bail;
use owo_colors::OwoColorize;

use tracker_engine::agent::{AgentRunner, SessionMode};
use tracker_engine::children;
use tracker_engine::logs;
use tracker_engine::review::ReviewOutcome;
use tracker_engine::scheduler::{PlanRunResult, Scheduler};
use tracker_engine::vcs::Git;

use super::Context;

/// Run a batch of plans. With no ids, every unblocked open plan runs.
pub async fn run(ctx: &Context, ids: Vec<i64>) -> anyhow::Result<()> {
    let ids = if ids.is_empty() {
        let unblocked = ctx.db.unblocked_open_tasks().await?;
        if unblocked.is_empty() {
            println!("nothing to work on: no unblocked open plans");
            return Ok(());
        }
        unblocked.iter().map(|p| p.id).collect()
    } else {
        ids
    };

    install_sigint_policy();

    let scheduler = Scheduler::new(
        ctx.db.clone(),
        ctx.config.clone(),
        ctx.logs_dir.clone(),
        ctx.worktree_base.clone(),
    );
    let reports = scheduler.work(&ids).await?;

    let mut failures = 0usize;
    for report in &reports {
        match &report.result {
            PlanRunResult::Skipped { reason } => {
                println!(
                    "{} #{} \"{}\": {}",
                    "skipped".yellow(),
                    report.plan_id,
                    report.title,
                    reason
                );
            }
            PlanRunResult::Finished { outcome } => print_outcome(report.plan_id, &report.title, outcome),
            PlanRunResult::Failed { error } => {
                failures += 1;
                println!(
                    "{} #{} \"{}\": {}",
                    "failed".red(),
                    report.plan_id,
                    report.title,
                    error
                );
            }
        }
    }

    if failures > 0 {
        bail!("{failures} plan(s) failed");
    }
    Ok(())
}

fn print_outcome(id: i64, title: &str, outcome: &ReviewOutcome) {
    match outcome {
        ReviewOutcome::Approved { rounds } => println!(
            "{} #{id} \"{title}\": approved in round {rounds}, now in-review",
            "done".green()
        ),
        ReviewOutcome::ChangesOutstanding { rounds } => println!(
            "{} #{id} \"{title}\": {rounds} rounds exhausted with changes outstanding, now in-review",
            "done".yellow()
        ),
        ReviewOutcome::NoChanges => println!(
            "{} #{id} \"{title}\": worker produced no changes, now in-review",
            "done".yellow()
        ),
        ReviewOutcome::WorkerFailed { exit_code } => println!(
            "{} #{id} \"{title}\": worker exited with {exit_code}, still in-progress (see logs)",
            "failed".red()
        ),
        ReviewOutcome::ReviewInconclusive { rounds } => println!(
            "{} #{id} \"{title}\": reviewer failed in round {rounds}, now in-review",
            "done".yellow()
        ),
        ReviewOutcome::RevisionFailed { rounds } => println!(
            "{} #{id} \"{title}\": revision failed in round {rounds}, now in-review",
            "done".yellow()
        ),
    }
}

/// First Ctrl+C is advisory while agents are alive; the second abandons them
/// (they run in their own process group and keep going).
fn install_sigint_policy() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        let live = children::live_count();
        if live > 0 {
            eprintln!(
                "\n{live} agent process(es) still running; press Ctrl+C again to exit and \
                 leave them running in the background."
            );
            let _ = tokio::signal::ctrl_c().await;
        }
        std::process::exit(130);
    });
}

/// Check out a plan's branch, or point at its worktree.
pub async fn checkout(ctx: &Context, id: i64, path_only: bool) -> anyhow::Result<()> {
    let plan = ctx.db.get(id).await?;
    let Some(branch) = plan.branch.clone() else {
        bail!("plan {id} has no branch yet; run `tracker work {id}` first");
    };

    if let Some(worktree) = &plan.worktree_path {
        if path_only {
            println!("{worktree}");
        } else {
            println!("plan #{id} is checked out at {worktree} (branch {branch})");
        }
        return Ok(());
    }

    let git = Git::new(plan.project_path());
    git.checkout(&branch).await?;
    if path_only {
        println!("{}", plan.project_path);
    } else {
        println!("checked out {branch} in {}", plan.project_path);
    }
    Ok(())
}

/// Resume the worker conversation for a plan with unfinished work.
pub async fn resume(ctx: &Context, id: i64) -> anyhow::Result<()> {
    let plan = ctx.db.get(id).await?;
    let Some(session) = plan.session_id.clone() else {
        bail!("plan {id} has no worker session to resume; run `tracker work {id}` first");
    };

    install_sigint_policy();

    let log_path = logs::create_log_path(&ctx.logs_dir, id)?;
    let runner = AgentRunner::new(&ctx.config);
    let run = runner
        .run(
            "Continue working on the plan. Address anything unfinished, run the \
             repository's checks, and commit your work locally. Never push.",
            &SessionMode::Resume(session),
            &plan.working_directory(),
            &log_path,
        )
        .await?;

    if run.success() {
        println!("resumed worker for plan #{id}; log: {}", log_path.display());
        Ok(())
    } else {
        bail!("agent exited with status {}", run.exit_code);
    }
}
