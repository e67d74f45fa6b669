//! Task creation, registration, listing, and manual status changes.

use std::path::{Path, PathBuf};

use anyhow::bail;

use tracker_engine::state::transition_allowed;
use tracker_engine::storage::PlanStatus;

use super::{plan_line, Context};

pub async fn create(
    ctx: &Context,
    title: &str,
    project: Option<PathBuf>,
    description: Option<String>,
    depends_on: Option<i64>,
) -> anyhow::Result<()> {
    let project = resolve_project(project)?;
    let plan = ctx
        .db
        .create_task(&project, title, description.as_deref())
        .await?;

    if let Some(dep) = depends_on {
        if let Err(e) = ctx.db.set_dependency(plan.id, Some(dep)).await {
            let _ = ctx.db.delete(plan.id).await;
            return Err(e.into());
        }
    }

    println!("created task #{} \"{}\" in {}", plan.id, plan.title, plan.project_path);
    Ok(())
}

pub async fn add(ctx: &Context, plan_path: &Path, project_dir: &Path) -> anyhow::Result<()> {
    if !plan_path.is_file() {
        bail!("plan file not found: {}", plan_path.display());
    }
    let plan_path = plan_path.canonicalize()?;
    let project = resolve_project(Some(project_dir.to_path_buf()))?;

    let plan = ctx.db.add_plan(&plan_path, &project, None).await?;
    println!("added plan #{} \"{}\"", plan.id, plan.title);
    Ok(())
}

pub async fn list(ctx: &Context) -> anyhow::Result<()> {
    let plans = ctx.db.list().await?;
    if plans.is_empty() {
        println!("no plans yet; try `tracker create <title>`");
        return Ok(());
    }

    let mut current_project: Option<&str> = None;
    for plan in &plans {
        if current_project != Some(plan.project_path.as_str()) {
            println!("\n{} ({})", plan.project_name, plan.project_path);
            current_project = Some(plan.project_path.as_str());
        }
        println!("  {}", plan_line(plan));
    }
    Ok(())
}

pub async fn set_status(ctx: &Context, id: i64, status: &str) -> anyhow::Result<()> {
    let Some(target) = PlanStatus::parse(status) else {
        bail!(
            "unknown status {status:?}; expected one of open, in-progress, in-review, completed"
        );
    };

    let plan = ctx.db.get(id).await?;
    let current = plan.status();
    if !transition_allowed(current, target) {
        bail!("cannot move plan {id} from {current} to {target}");
    }

    ctx.db.update_status(id, target).await?;
    println!("plan #{id}: {current} -> {target}");
    Ok(())
}

fn resolve_project(project: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    let dir = match project {
        Some(p) => p,
        None => std::env::current_dir()?,
    };
    if !dir.is_dir() {
        bail!("project directory not found: {}", dir.display());
    }
    Ok(dir.canonicalize()?)
}
