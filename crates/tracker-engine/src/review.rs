//! Bounded worker↔reviewer dialogue.
//!
//! One worker conversation (resumed across rounds) against fresh reviewer
//! sessions, converging on a single verdict per plan. The loop is bounded by
//! the configured round cap; exhausting it still hands the plan to a human
//! by letting the caller advance it to in-review.

use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use tracker_core::Result;

use crate::agent::{
    parse_verdict, revision_prompt, review_prompt, worker_prompt, AgentRunner, SessionMode, Verdict,
};
use crate::storage::Database;
use crate::vcs::Git;

/// How a review loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    /// Reviewer approved in the given round.
    Approved { rounds: u32 },
    /// Round cap exhausted with changes still requested.
    ChangesOutstanding { rounds: u32 },
    /// Worker produced no diff against main; nothing to review.
    NoChanges,
    /// The initial worker run failed; the plan stays in-progress.
    WorkerFailed { exit_code: i32 },
    /// A reviewer run failed; treated as inconclusive.
    ReviewInconclusive { rounds: u32 },
    /// A revision run failed mid-loop.
    RevisionFailed { rounds: u32 },
}

impl ReviewOutcome {
    /// True on every path where the initial worker succeeded; the caller
    /// advances the plan to in-review exactly in these cases.
    pub const fn worker_succeeded(&self) -> bool {
        !matches!(self, Self::WorkerFailed { .. })
    }
}

/// Inputs for one plan's dialogue.
#[derive(Debug)]
pub struct ReviewContext<'a> {
    pub plan_id: i64,
    /// Fixed plan body passed to both roles.
    pub plan_content: &'a str,
    /// Worktree when isolated, else the project root.
    pub workdir: &'a Path,
    /// Per-run JSONL log shared by all rounds.
    pub log_path: &'a Path,
}

/// Drives the dialogue for one plan.
pub struct ReviewLoop {
    runner: AgentRunner,
    max_rounds: u32,
}

impl ReviewLoop {
    pub const fn new(runner: AgentRunner, max_rounds: u32) -> Self {
        Self { runner, max_rounds }
    }

    pub async fn run(&self, db: &Database, ctx: &ReviewContext<'_>) -> Result<ReviewOutcome> {
        let session_id = Uuid::new_v4().to_string();

        let worker = self
            .runner
            .run(
                &worker_prompt(ctx.plan_content),
                &SessionMode::New(session_id.clone()),
                ctx.workdir,
                ctx.log_path,
            )
            .await?;
        if !worker.success() {
            warn!(plan_id = ctx.plan_id, exit_code = worker.exit_code, "worker run failed");
            return Ok(ReviewOutcome::WorkerFailed {
                exit_code: worker.exit_code,
            });
        }
        db.update_session(ctx.plan_id, &session_id).await?;

        let git = Git::new(ctx.workdir);
        for round in 1..=self.max_rounds {
            let diff = git.diff_range("main...HEAD").await?;
            if diff.trim().is_empty() {
                info!(plan_id = ctx.plan_id, round, "no diff against main, nothing to review");
                return Ok(ReviewOutcome::NoChanges);
            }

            let reviewer = self
                .runner
                .run(
                    &review_prompt(ctx.plan_content, &diff),
                    &SessionMode::New(Uuid::new_v4().to_string()),
                    ctx.workdir,
                    ctx.log_path,
                )
                .await?;
            if !reviewer.success() {
                warn!(plan_id = ctx.plan_id, round, "reviewer run failed, treating as inconclusive");
                return Ok(ReviewOutcome::ReviewInconclusive { rounds: round });
            }

            match parse_verdict(&reviewer.transcript) {
                Verdict::Approve => {
                    info!(plan_id = ctx.plan_id, round, "reviewer approved");
                    return Ok(ReviewOutcome::Approved { rounds: round });
                }
                Verdict::RequestChanges { feedback } => {
                    info!(plan_id = ctx.plan_id, round, "reviewer requested changes");
                    let revision = self
                        .runner
                        .run(
                            &revision_prompt(&feedback),
                            &SessionMode::Resume(session_id.clone()),
                            ctx.workdir,
                            ctx.log_path,
                        )
                        .await?;
                    if !revision.success() {
                        warn!(plan_id = ctx.plan_id, round, "revision run failed");
                        return Ok(ReviewOutcome::RevisionFailed { rounds: round });
                    }
                }
            }
        }

        info!(plan_id = ctx.plan_id, rounds = self.max_rounds, "review rounds exhausted");
        Ok(ReviewOutcome::ChangesOutstanding {
            rounds: self.max_rounds,
        })
    }
}
