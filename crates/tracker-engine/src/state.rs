//! Plan lifecycle state machine.
//!
//! Transitions and guards over the four statuses. Guards return a [`Gate`]
//! value, never an error: a closed gate is a normal answer, not a fault.
//!
//! The dependency rule is deliberately asymmetric: a plan may *start* once
//! its predecessor is in review, but may only *complete* after the
//! predecessor has completed. Downstream work can begin while upstream is
//! still under review, compressing pipeline time.

use tracker_core::Result;

use crate::storage::{Database, Plan, PlanStatus};

/// Outcome of a guard check.
#[derive(Debug, Clone)]
pub struct Gate {
    pub allowed: bool,
    /// Human-readable reason when closed.
    pub reason: Option<String>,
    /// The predecessor blocking the transition, when applicable.
    pub blocked_by: Option<Plan>,
}

impl Gate {
    pub const fn open() -> Self {
        Self {
            allowed: true,
            reason: None,
            blocked_by: None,
        }
    }

    fn closed(reason: String, blocked_by: Option<Plan>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
            blocked_by,
        }
    }
}

/// Whether a direct status transition is legal, ignoring dependency guards.
pub fn transition_allowed(from: PlanStatus, to: PlanStatus) -> bool {
    use PlanStatus::{Completed, InProgress, InReview, Open};
    match (from, to) {
        // Idempotent writes are always fine.
        (a, b) if a == b => true,
        (Open, InProgress) => true,
        (InProgress, InReview) => true,
        (InReview, Completed) => true,
        // `reset` paths.
        (InProgress | InReview | Completed, Open) => true,
        _ => false,
    }
}

/// May this plan be claimed by the scheduler?
///
/// Open iff the dependency is unset or the predecessor has reached
/// in-review or completed.
pub async fn can_start(db: &Database, id: i64) -> Result<Gate> {
    let Some(dep) = db.get_dependency(id).await? else {
        return Ok(Gate::open());
    };
    match dep.status() {
        PlanStatus::InReview | PlanStatus::Completed => Ok(Gate::open()),
        status => Ok(Gate::closed(
            format!(
                "blocked by #{} \"{}\" ({})",
                dep.id, dep.title, status
            ),
            Some(dep),
        )),
    }
}

/// May this plan be merged to main?
///
/// Open iff the dependency is unset or the predecessor has completed.
pub async fn can_complete(db: &Database, id: i64) -> Result<Gate> {
    let Some(dep) = db.get_dependency(id).await? else {
        return Ok(Gate::open());
    };
    match dep.status() {
        PlanStatus::Completed => Ok(Gate::open()),
        status => Ok(Gate::closed(
            format!(
                "predecessor #{} \"{}\" is {} (must be completed)",
                dep.id, dep.title, status
            ),
            Some(dep),
        )),
    }
}
