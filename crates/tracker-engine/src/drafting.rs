//! Plan document drafting via the agent.
//!
//! Tasks created without a plan file get one generated by a one-shot agent
//! call; the drafting conversation id is kept separately from the worker
//! session so iterative editing can resume it later.

use std::path::{Path, PathBuf};

use uuid::Uuid;

use tracker_core::config::Config;
use tracker_core::slug::title_slug;
use tracker_core::{planfile, Error, Result};

use crate::agent::{AgentRunner, SessionMode};
use crate::storage::{Database, Plan};

/// Prompt for the one-shot plan generation call.
pub fn draft_prompt(plan: &Plan) -> String {
    format!(
        "Write an implementation plan for the following task in this repository.\n\
         \n\
         Task: {}\n\
         {}\n\
         Explore the codebase as needed. Respond with ONLY the plan as markdown, \
         starting with a single `# <title>` heading, covering approach, files to \
         change, and verification steps.\n",
        plan.title,
        if plan.description.is_empty() {
            String::new()
        } else {
            format!("Details: {}\n", plan.description)
        }
    )
}

/// Where a generated plan document lands.
pub fn plan_file_path(plans_dir: &Path, id: i64, title: &str) -> PathBuf {
    let slug = title_slug(title);
    if slug.is_empty() {
        plans_dir.join(format!("{id}.md"))
    } else {
        plans_dir.join(format!("{id}-{slug}.md"))
    }
}

/// Generate (or regenerate) the plan document for a task.
///
/// Runs the agent once in the project root, writes the transcript as the
/// plan file, and records the plan path, drafting session, and any title the
/// generated heading carries.
pub async fn generate_plan(
    db: &Database,
    config: &Config,
    runner: Option<AgentRunner>,
    plans_dir: &Path,
    logs_dir: &Path,
    id: i64,
) -> Result<Plan> {
    let plan = db.get(id).await?;

    let session_id = Uuid::new_v4().to_string();
    let chat_log = logs_dir
        .join("planning")
        .join(format!("{id}-{session_id}.jsonl"));

    let runner = runner.unwrap_or_else(|| AgentRunner::new(config));
    let run = runner
        .run(
            &draft_prompt(&plan),
            &SessionMode::New(session_id.clone()),
            &plan.project_path(),
            &chat_log,
        )
        .await?;
    if !run.success() {
        return Err(Error::Agent {
            code: run.exit_code,
        });
    }

    std::fs::create_dir_all(plans_dir)?;
    let plan_file = plan_file_path(plans_dir, id, &plan.title);
    std::fs::write(&plan_file, &run.transcript)?;

    db.update_plan_path(id, &plan_file).await?;
    db.update_planning_session(id, &session_id).await?;
    if let Some(title) = planfile::title_from_content(&run.transcript) {
        db.update_title(id, &title).await?;
    }

    db.get(id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_file_path_uses_slug_with_id_fallback() {
        let dir = Path::new("/data/plans");
        assert_eq!(
            plan_file_path(dir, 3, "Add OAuth"),
            PathBuf::from("/data/plans/3-add-oauth.md")
        );
        assert_eq!(plan_file_path(dir, 3, "!!!"), PathBuf::from("/data/plans/3.md"));
    }

    #[tokio::test]
    async fn draft_prompt_carries_title_and_description() {
        let db = Database::open_in_memory().await.unwrap();
        let plan = db
            .create_task(Path::new("/repo"), "Add caching", Some("LRU, 1k entries"))
            .await
            .unwrap();
        let prompt = draft_prompt(&plan);
        assert!(prompt.contains("Add caching"));
        assert!(prompt.contains("LRU, 1k entries"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn generate_writes_plan_file_and_updates_record() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let project = tmp.path().join("repo");
        std::fs::create_dir_all(&project).unwrap();

        let stub = tmp.path().join("fake-agent");
        // printf %s keeps the JSON \n escapes intact regardless of shell.
        std::fs::write(
            &stub,
            r##"#!/bin/sh
cat > /dev/null
printf '%s\n' '{"type":"assistant","message":{"content":[{"type":"text","text":"# Generated title\n\n- step one"}]}}'
printf '%s\n' '{"type":"result","subtype":"success","session_id":"draft-sess"}'
"##,
        )
        .unwrap();
        std::fs::set_permissions(&stub, std::fs::Permissions::from_mode(0o755)).unwrap();

        let db = Database::open_in_memory().await.unwrap();
        let created = db.create_task(&project, "Rough idea", None).await.unwrap();

        let config = Config::with_defaults();
        let runner = AgentRunner::new(&config).with_binary(&stub);
        let plan = generate_plan(
            &db,
            &config,
            Some(runner),
            &tmp.path().join("plans"),
            &tmp.path().join("logs"),
            created.id,
        )
        .await
        .unwrap();

        assert!(!plan.plan_path.is_empty());
        assert!(plan.planning_session_id.is_some());
        assert_eq!(plan.title, "Generated title");
        let content = std::fs::read_to_string(&plan.plan_path).unwrap();
        assert!(content.starts_with("# Generated title"));
    }
}
