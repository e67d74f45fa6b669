//! Database models for plans.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Plan record from the database. One row per plan.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: i64,
    /// Absolute path of the plan markdown; empty while still being drafted.
    pub plan_path: String,
    pub title: String,
    pub description: String,
    pub project_path: String,
    pub project_name: String,
    pub status: String,
    pub branch: Option<String>,
    /// Worker conversation handle; null until work starts.
    pub session_id: Option<String>,
    /// Separate handle for iterative plan drafting.
    pub planning_session_id: Option<String>,
    pub worktree_path: Option<String>,
    pub depends_on_id: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Plan {
    pub fn status(&self) -> PlanStatus {
        PlanStatus::parse(&self.status).unwrap_or(PlanStatus::Open)
    }

    pub fn project_path(&self) -> PathBuf {
        PathBuf::from(&self.project_path)
    }

    /// Directory the agent should run in: the worktree when isolated,
    /// otherwise the project root.
    pub fn working_directory(&self) -> PathBuf {
        self.worktree_path
            .as_ref()
            .map_or_else(|| self.project_path(), PathBuf::from)
    }
}

/// Plan lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanStatus {
    Open,
    InProgress,
    InReview,
    Completed,
}

impl PlanStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::InProgress => "in-progress",
            Self::InReview => "in-review",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "in-progress" => Some(Self::InProgress),
            "in-review" => Some(Self::InReview),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub const ALL: [Self; 4] = [Self::Open, Self::InProgress, Self::InReview, Self::Completed];
}

impl std::fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
