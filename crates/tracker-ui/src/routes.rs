//! HTTP surface of the dashboard.
//!
//! JSON in and out except the log/chat streams and raw plan content. Errors
//! map to `{ "error": "..." }` with a 4xx/5xx status by kind.

use std::process::Stdio;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use tracker_core::Error;
use tracker_engine::agent::{AgentRunner, SessionMode};
use tracker_engine::children;
use tracker_engine::drafting;
use tracker_engine::state;
use tracker_engine::storage::{Plan, PlanStatus};
use tracker_engine::usage::UsageClient;

use crate::sse;
use crate::state::AppState;

/// Build the full router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(landing))
        .route("/api/plans", get(list_plans).post(create_plan))
        .route("/api/plans/work-all", post(work_all))
        .route("/api/plans/{id}", get(get_plan).delete(delete_plan))
        .route("/api/plans/{id}/work", post(work_plan))
        .route("/api/plans/{id}/logs", get(stream_logs))
        .route("/api/plans/{id}/plan-content", get(plan_content))
        .route("/api/plans/{id}/plan", post(generate_plan))
        .route("/api/plans/{id}/chat", post(chat))
        .route(
            "/api/plans/{id}/dependency",
            get(get_dependency).put(put_dependency),
        )
        .route("/api/plans/{id}/dependents", get(get_dependents))
        .route("/api/plans/{id}/can-start", get(can_start_query))
        .route("/api/usage", get(usage_snapshot))
        .with_state(state)
}

// =============================================================================
// Error mapping
// =============================================================================

struct ApiError(Error);

type ApiResult<T> = std::result::Result<T, ApiError>;

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Input(_) | Error::Dependency(_) => StatusCode::BAD_REQUEST,
            Error::State(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

// =============================================================================
// Plan CRUD
// =============================================================================

async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<Plan>>> {
    Ok(Json(state.db.list().await?))
}

async fn get_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Plan>> {
    Ok(Json(state.db.get(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatePlanRequest {
    title: String,
    project_path: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    depends_on_id: Option<i64>,
}

async fn create_plan(
    State(state): State<AppState>,
    Json(req): Json<CreatePlanRequest>,
) -> ApiResult<(StatusCode, Json<Plan>)> {
    if req.title.trim().is_empty() {
        return Err(Error::Input("title must not be empty".into()).into());
    }
    if req.project_path.trim().is_empty() {
        return Err(Error::Input("projectPath must not be empty".into()).into());
    }

    let plan = state
        .db
        .create_task(
            std::path::Path::new(&req.project_path),
            req.title.trim(),
            req.description.as_deref(),
        )
        .await?;

    if let Some(dep) = req.depends_on_id {
        if let Err(e) = state.db.set_dependency(plan.id, Some(dep)).await {
            // Roll the half-created record back so a bad dependency does not
            // leave a surprise plan behind.
            let _ = state.db.delete(plan.id).await;
            return Err(e.into());
        }
    }

    Ok((StatusCode::CREATED, Json(state.db.get(plan.id).await?)))
}

async fn delete_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    let plan = state.db.get(id).await?;
    if plan.status() != PlanStatus::Open {
        return Err(Error::State(format!(
            "only open plans can be deleted; plan {id} is {}",
            plan.status()
        ))
        .into());
    }
    state.db.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Work spawning
// =============================================================================

#[derive(Debug, Serialize)]
struct WorkSpawned {
    started: Vec<i64>,
    skipped: Vec<serde_json::Value>,
}

/// Launch a detached `tracker work <id>` child and register its PID.
async fn spawn_worker(state: &AppState, plan_id: i64) -> tracker_core::Result<u32> {
    let mut cmd = tokio::process::Command::new(&state.tracker_exe);
    cmd.arg("work")
        .arg(plan_id.to_string())
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null());
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn()?;
    let pid = child.id().unwrap_or(0);
    children::register(pid);
    info!(plan_id, pid, "spawned detached worker");

    // Reap in the background so the table stays accurate; the child itself
    // is detached and survives a dashboard shutdown.
    tokio::spawn(async move {
        let _ = child.wait().await;
        children::unregister(pid);
    });

    Ok(pid)
}

async fn work_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.get(id).await?;
    let gate = state::can_start(&state.db, id).await?;
    if !gate.allowed {
        return Err(Error::State(
            gate.reason.unwrap_or_else(|| "plan is blocked".into()),
        )
        .into());
    }
    let pid = spawn_worker(&state, id).await?;
    Ok(Json(json!({ "started": true, "pid": pid })))
}

async fn work_all(State(state): State<AppState>) -> ApiResult<Json<WorkSpawned>> {
    let unblocked = state.db.unblocked_open_tasks().await?;
    let mut started = Vec::new();
    let mut skipped = Vec::new();
    for plan in unblocked {
        match spawn_worker(&state, plan.id).await {
            Ok(_) => started.push(plan.id),
            Err(e) => {
                warn!(plan_id = plan.id, error = %e, "failed to spawn worker");
                skipped.push(json!({ "id": plan.id, "error": e.to_string() }));
            }
        }
    }
    Ok(Json(WorkSpawned { started, skipped }))
}

// =============================================================================
// Logs and plan content
// =============================================================================

async fn stream_logs(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<impl IntoResponse> {
    state.db.get(id).await?;
    Ok(sse::log_tail(state.logs_dir.clone(), id))
}

async fn plan_content(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Response> {
    let plan = state.db.get(id).await?;
    if plan.plan_path.is_empty() {
        return Err(Error::NotFound(format!("plan {id} has no plan file yet")).into());
    }
    let content = std::fs::read_to_string(&plan.plan_path)
        .map_err(|_| Error::NotFound(format!("plan file missing: {}", plan.plan_path)))?;
    Ok(([("content-type", "text/markdown; charset=utf-8")], content).into_response())
}

// =============================================================================
// Plan drafting
// =============================================================================

async fn generate_plan(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Plan>> {
    let plan = drafting::generate_plan(
        &state.db,
        &state.config,
        None,
        &state.plans_dir,
        &state.logs_dir,
        id,
    )
    .await?;
    Ok(Json(plan))
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
}

async fn chat(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let plan = state.db.get(id).await?;
    if req.message.trim().is_empty() {
        return Err(Error::Input("message must not be empty".into()).into());
    }

    let (mode, session_id) = match plan.planning_session_id.clone() {
        Some(session) => (SessionMode::Resume(session.clone()), session),
        None => {
            let session = Uuid::new_v4().to_string();
            (SessionMode::New(session.clone()), session)
        }
    };
    state.db.update_planning_session(id, &session_id).await?;

    let chat_log = state
        .logs_dir
        .join("planning")
        .join(format!("{id}-{}.jsonl", Uuid::new_v4()));

    let prompt = if plan.plan_path.is_empty() {
        format!(
            "We are drafting an implementation plan for the task \"{}\".\n\
             User message:\n{}\n",
            plan.title, req.message
        )
    } else {
        format!(
            "We are iterating on the implementation plan at {}.\n\
             Apply the user's request to that file, then summarize what changed.\n\
             User message:\n{}\n",
            plan.plan_path, req.message
        )
    };

    let runner = AgentRunner::new(&state.config);
    let cwd = plan.project_path();
    let log_for_task = chat_log.clone();
    let task = tokio::spawn(async move {
        match runner.run(&prompt, &mode, &cwd, &log_for_task).await {
            Ok(run) => run.success(),
            Err(e) => {
                warn!(error = %e, "chat agent run failed");
                false
            }
        }
    });

    Ok(sse::chat_follow(chat_log, task))
}

// =============================================================================
// Dependencies and guards
// =============================================================================

async fn get_dependency(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Option<Plan>>> {
    Ok(Json(state.db.get_dependency(id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetDependencyRequest {
    depends_on_id: Option<i64>,
}

async fn put_dependency(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<SetDependencyRequest>,
) -> ApiResult<Json<Option<Plan>>> {
    state.db.set_dependency(id, req.depends_on_id).await?;
    Ok(Json(state.db.get_dependency(id).await?))
}

async fn get_dependents(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Vec<Plan>>> {
    state.db.get(id).await?;
    Ok(Json(state.db.get_dependents(id).await?))
}

async fn can_start_query(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<serde_json::Value>> {
    state.db.get(id).await?;
    let gate = state::can_start(&state.db, id).await?;
    Ok(Json(json!({
        "allowed": gate.allowed,
        "reason": gate.reason,
        "blockedBy": gate.blocked_by,
    })))
}

// =============================================================================
// Usage
// =============================================================================

async fn usage_snapshot(State(state): State<AppState>) -> ApiResult<Json<serde_json::Value>> {
    if !state.config.usage_limits.enabled {
        return Ok(Json(json!({ "enabled": false })));
    }
    let client = UsageClient::new(&state.config.usage_limits);
    let snapshot = client.snapshot().await?;
    Ok(Json(json!({ "enabled": true, "snapshot": snapshot })))
}

// =============================================================================
// Landing page
// =============================================================================

async fn landing() -> Html<&'static str> {
    Html(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>tracker</title>
<style>
  * { margin: 0; padding: 0; box-sizing: border-box; }
  body { font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
         color: #e0e0e0; background: #0d1117; line-height: 1.6; }
  .container { max-width: 720px; margin: 0 auto; padding: 2rem 1rem; }
  h1 { font-size: 1.8rem; margin-bottom: 0.5rem; color: #f0f0f0; }
  p { margin-bottom: 1rem; color: #a0a0a0; }
  code { background: #161b22; padding: 0.15em 0.4em; border-radius: 4px; font-size: 0.9em; }
  table { width: 100%; border-collapse: collapse; }
  th, td { padding: 0.4rem 0.6rem; text-align: left; border-bottom: 1px solid #21262d; }
  th { color: #8b949e; font-weight: 600; font-size: 0.85em; text-transform: uppercase; }
</style>
</head>
<body>
<div class="container">
  <h1>tracker</h1>
  <p>Agent orchestrator dashboard API. Point a frontend at <code>/api</code>.</p>
  <table>
    <thead><tr><th>Method</th><th>Path</th></tr></thead>
    <tbody>
      <tr><td>GET</td><td><code>/api/plans</code></td></tr>
      <tr><td>POST</td><td><code>/api/plans</code></td></tr>
      <tr><td>GET</td><td><code>/api/plans/:id</code></td></tr>
      <tr><td>DELETE</td><td><code>/api/plans/:id</code></td></tr>
      <tr><td>POST</td><td><code>/api/plans/:id/work</code></td></tr>
      <tr><td>POST</td><td><code>/api/plans/work-all</code></td></tr>
      <tr><td>GET</td><td><code>/api/plans/:id/logs</code> (SSE)</td></tr>
      <tr><td>GET</td><td><code>/api/plans/:id/plan-content</code></td></tr>
      <tr><td>POST</td><td><code>/api/plans/:id/plan</code></td></tr>
      <tr><td>POST</td><td><code>/api/plans/:id/chat</code> (SSE)</td></tr>
      <tr><td>GET/PUT</td><td><code>/api/plans/:id/dependency</code></td></tr>
      <tr><td>GET</td><td><code>/api/plans/:id/dependents</code></td></tr>
      <tr><td>GET</td><td><code>/api/plans/:id/can-start</code></td></tr>
      <tr><td>GET</td><td><code>/api/usage</code></td></tr>
    </tbody>
  </table>
</div>
</body>
</html>"#,
    )
}
