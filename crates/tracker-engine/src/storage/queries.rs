//! Plan queries and dependency-edge maintenance.

use std::collections::HashSet;
use std::path::Path;

use tracker_core::db::unix_timestamp;
use tracker_core::{planfile, Error, Result};

use super::db::Database;
use super::models::{Plan, PlanStatus};

impl Database {
    // =========================================================================
    // Creation
    // =========================================================================

    /// Register an existing plan file. The title comes from the caller, else
    /// the file's first heading, else the file stem.
    pub async fn add_plan(
        &self,
        plan_path: &Path,
        project_path: &Path,
        title: Option<&str>,
    ) -> Result<Plan> {
        let title = match title {
            Some(t) => t.to_string(),
            None => planfile::parse_title(plan_path).unwrap_or_else(|| {
                plan_path
                    .file_stem()
                    .map_or_else(|| "untitled".to_string(), |s| s.to_string_lossy().into_owned())
            }),
        };
        self.insert(&plan_path.to_string_lossy(), project_path, &title, "")
            .await
    }

    /// Create a task with no plan file yet (drafted later).
    pub async fn create_task(
        &self,
        project_path: &Path,
        title: &str,
        description: Option<&str>,
    ) -> Result<Plan> {
        self.insert("", project_path, title, description.unwrap_or(""))
            .await
    }

    async fn insert(
        &self,
        plan_path: &str,
        project_path: &Path,
        title: &str,
        description: &str,
    ) -> Result<Plan> {
        let project_name = project_path
            .file_name()
            .map_or_else(|| "unknown".to_string(), |n| n.to_string_lossy().into_owned());
        let now = unix_timestamp();

        let result = sqlx::query(
            r#"
            INSERT INTO plans (plan_path, title, description, project_path, project_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(plan_path)
        .bind(title)
        .bind(description)
        .bind(project_path.to_string_lossy().as_ref())
        .bind(&project_name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?;

        self.get(result.last_insert_rowid()).await
    }

    // =========================================================================
    // Lookup
    // =========================================================================

    /// Get a plan by id.
    pub async fn get(&self, id: i64) -> Result<Plan> {
        sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| Error::NotFound(format!("no plan with id {id}")))
    }

    /// All plans, grouped by project, most recently touched first within one.
    pub async fn list(&self) -> Result<Vec<Plan>> {
        Ok(
            sqlx::query_as::<_, Plan>(
                "SELECT * FROM plans ORDER BY project_path ASC, updated_at DESC, id DESC",
            )
            .fetch_all(self.pool())
            .await?,
        )
    }

    /// Plans for one project.
    pub async fn list_by_project(&self, project_path: &Path) -> Result<Vec<Plan>> {
        Ok(sqlx::query_as::<_, Plan>(
            "SELECT * FROM plans WHERE project_path = ? ORDER BY updated_at DESC, id DESC",
        )
        .bind(project_path.to_string_lossy().as_ref())
        .fetch_all(self.pool())
        .await?)
    }

    // =========================================================================
    // Field updates
    // =========================================================================

    /// Set the plan status. Idempotent with the target value.
    pub async fn update_status(&self, id: i64, status: PlanStatus) -> Result<()> {
        self.update_column(id, "status", Some(status.as_str())).await
    }

    pub async fn update_branch(&self, id: i64, branch: &str) -> Result<()> {
        self.update_column(id, "branch", Some(branch)).await
    }

    pub async fn update_session(&self, id: i64, session_id: &str) -> Result<()> {
        self.update_column(id, "session_id", Some(session_id)).await
    }

    pub async fn update_planning_session(&self, id: i64, session_id: &str) -> Result<()> {
        self.update_column(id, "planning_session_id", Some(session_id))
            .await
    }

    pub async fn update_plan_path(&self, id: i64, plan_path: &Path) -> Result<()> {
        self.update_column(id, "plan_path", Some(plan_path.to_string_lossy().as_ref()))
            .await
    }

    pub async fn update_worktree_path(&self, id: i64, worktree_path: Option<&Path>) -> Result<()> {
        let value = worktree_path.map(|p| p.to_string_lossy().into_owned());
        self.update_column(id, "worktree_path", value.as_deref())
            .await
    }

    pub async fn update_title(&self, id: i64, title: &str) -> Result<()> {
        self.update_column(id, "title", Some(title)).await
    }

    /// Clear branch and session after a reset that destroyed the branch.
    pub async fn clear_work_state(&self, id: i64) -> Result<()> {
        let now = unix_timestamp();
        let result = sqlx::query(
            "UPDATE plans SET branch = NULL, session_id = NULL, worktree_path = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(id)
        .execute(self.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("no plan with id {id}")));
        }
        Ok(())
    }

    async fn update_column(&self, id: i64, column: &str, value: Option<&str>) -> Result<()> {
        let now = unix_timestamp();
        // Column names come from the fixed call sites above, never from input.
        let sql = format!("UPDATE plans SET {column} = ?, updated_at = ? WHERE id = ?");
        let result = sqlx::query(&sql)
            .bind(value)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("no plan with id {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Deletion
    // =========================================================================

    /// Delete a plan record. Refused while other plans depend on it.
    pub async fn delete(&self, id: i64) -> Result<()> {
        let dependents = self.get_dependents(id).await?;
        if !dependents.is_empty() {
            let ids: Vec<String> = dependents.iter().map(|p| format!("#{}", p.id)).collect();
            return Err(Error::State(format!(
                "cannot delete plan {id}: plans {} depend on it",
                ids.join(", ")
            )));
        }
        let result = sqlx::query("DELETE FROM plans WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("no plan with id {id}")));
        }
        Ok(())
    }

    // =========================================================================
    // Dependency edges
    // =========================================================================

    /// Set or clear the plan's single predecessor.
    ///
    /// Validates in order: target exists, same project, not self, no cycle.
    pub async fn set_dependency(&self, id: i64, depends_on: Option<i64>) -> Result<()> {
        let plan = self.get(id).await?;

        if let Some(dep_id) = depends_on {
            let dep = match self.get(dep_id).await {
                Ok(dep) => dep,
                Err(Error::NotFound(_)) => {
                    return Err(Error::Dependency(format!(
                        "dependency target {dep_id} does not exist"
                    )))
                }
                Err(e) => return Err(e),
            };
            if dep.project_path != plan.project_path {
                return Err(Error::Dependency(format!(
                    "plan {id} and plan {dep_id} belong to different projects"
                )));
            }
            if dep_id == id {
                return Err(Error::Dependency(format!(
                    "plan {id} cannot depend on itself"
                )));
            }
            if self.would_create_cycle(id, dep_id).await? {
                return Err(Error::Dependency(
                    "setting this dependency would create a circular dependency".into(),
                ));
            }
        }

        let now = unix_timestamp();
        sqlx::query("UPDATE plans SET depends_on_id = ?, updated_at = ? WHERE id = ?")
            .bind(depends_on)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// The plan's predecessor, if any.
    pub async fn get_dependency(&self, id: i64) -> Result<Option<Plan>> {
        let plan = self.get(id).await?;
        match plan.depends_on_id {
            Some(dep_id) => Ok(Some(self.get(dep_id).await?)),
            None => Ok(None),
        }
    }

    /// Plans whose dependency edge points at `id`.
    pub async fn get_dependents(&self, id: i64) -> Result<Vec<Plan>> {
        Ok(
            sqlx::query_as::<_, Plan>("SELECT * FROM plans WHERE depends_on_id = ? ORDER BY id")
                .bind(id)
                .fetch_all(self.pool())
                .await?,
        )
    }

    /// Pure cycle check: would pointing `id` at `candidate` close a loop?
    ///
    /// Walks predecessor edges from `candidate`; reaching `id` means yes.
    /// The visited set guards against pre-existing corruption.
    pub async fn would_create_cycle(&self, id: i64, candidate: i64) -> Result<bool> {
        let mut visited: HashSet<i64> = HashSet::new();
        let mut cursor = Some(candidate);
        while let Some(current) = cursor {
            if current == id {
                return Ok(true);
            }
            if !visited.insert(current) {
                return Ok(true);
            }
            cursor = match self.get(current).await {
                Ok(plan) => plan.depends_on_id,
                Err(Error::NotFound(_)) => None,
                Err(e) => return Err(e),
            };
        }
        Ok(false)
    }

    /// Dependency chain from the root predecessor down to this plan.
    pub async fn get_dependency_chain(&self, id: i64) -> Result<Vec<Plan>> {
        let mut chain = vec![self.get(id).await?];
        let mut visited: HashSet<i64> = HashSet::new();
        visited.insert(id);

        while let Some(dep_id) = chain.last().and_then(|p| p.depends_on_id) {
            if !visited.insert(dep_id) {
                break;
            }
            chain.push(self.get(dep_id).await?);
        }

        chain.reverse();
        Ok(chain)
    }

    // =========================================================================
    // Scheduling views
    // =========================================================================

    /// Open plans whose predecessor (if any) is in-review or completed.
    pub async fn unblocked_open_tasks(&self) -> Result<Vec<Plan>> {
        Ok(sqlx::query_as::<_, Plan>(
            r#"
            SELECT p.* FROM plans p
            LEFT JOIN plans d ON p.depends_on_id = d.id
            WHERE p.status = 'open'
              AND (p.depends_on_id IS NULL OR d.status IN ('in-review', 'completed'))
            ORDER BY p.project_path ASC, p.id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?)
    }

    /// Open plans blocked by a predecessor that has not reached review yet.
    pub async fn blocked_tasks(&self) -> Result<Vec<Plan>> {
        Ok(sqlx::query_as::<_, Plan>(
            r#"
            SELECT p.* FROM plans p
            JOIN plans d ON p.depends_on_id = d.id
            WHERE p.status = 'open'
              AND d.status NOT IN ('in-review', 'completed')
            ORDER BY p.project_path ASC, p.id ASC
            "#,
        )
        .fetch_all(self.pool())
        .await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn db() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    async fn task(db: &Database, project: &str, title: &str) -> Plan {
        db.create_task(Path::new(project), title, None).await.unwrap()
    }

    // =========================================================================
    // CRUD
    // =========================================================================

    #[tokio::test]
    async fn create_and_get() {
        let db = db().await;
        let plan = task(&db, "/repo", "Add X").await;
        assert_eq!(plan.status(), PlanStatus::Open);
        assert_eq!(plan.project_name, "repo");
        assert!(plan.plan_path.is_empty());

        let fetched = db.get(plan.id).await.unwrap();
        assert_eq!(fetched.title, "Add X");
    }

    #[tokio::test]
    async fn get_missing_is_not_found() {
        let db = db().await;
        assert!(matches!(db.get(99).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn add_plan_extracts_title_from_file() {
        let db = db().await;
        let dir = tempfile::tempdir().unwrap();
        let plan_file = dir.path().join("feature.md");
        std::fs::write(&plan_file, "# Implement feature Y\n\nDetails.\n").unwrap();

        let plan = db.add_plan(&plan_file, Path::new("/repo"), None).await.unwrap();
        assert_eq!(plan.title, "Implement feature Y");

        // Explicit title wins over the heading.
        let plan = db
            .add_plan(&plan_file, Path::new("/repo"), Some("Override"))
            .await
            .unwrap();
        assert_eq!(plan.title, "Override");
    }

    #[tokio::test]
    async fn add_plan_without_heading_uses_stem() {
        let db = db().await;
        let dir = tempfile::tempdir().unwrap();
        let plan_file = dir.path().join("no-heading.md");
        std::fs::write(&plan_file, "plain text\n").unwrap();

        let plan = db.add_plan(&plan_file, Path::new("/repo"), None).await.unwrap();
        assert_eq!(plan.title, "no-heading");
    }

    #[tokio::test]
    async fn list_orders_by_project_then_recency() {
        let db = db().await;
        task(&db, "/b-repo", "one").await;
        let newer = task(&db, "/a-repo", "two").await;
        task(&db, "/a-repo", "three").await;
        db.update_title(newer.id, "two updated").await.unwrap();

        let all = db.list().await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].project_path, "/a-repo");
        assert_eq!(all[1].project_path, "/a-repo");
        assert_eq!(all[2].project_path, "/b-repo");
    }

    #[tokio::test]
    async fn list_by_project_filters() {
        let db = db().await;
        task(&db, "/a-repo", "one").await;
        task(&db, "/b-repo", "two").await;
        task(&db, "/a-repo", "three").await;

        let a_plans = db.list_by_project(Path::new("/a-repo")).await.unwrap();
        assert_eq!(a_plans.len(), 2);
        assert!(a_plans.iter().all(|p| p.project_path == "/a-repo"));
        assert!(db
            .list_by_project(Path::new("/c-repo"))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn update_status_is_idempotent() {
        let db = db().await;
        let plan = task(&db, "/repo", "t").await;
        db.update_status(plan.id, PlanStatus::InProgress).await.unwrap();
        db.update_status(plan.id, PlanStatus::InProgress).await.unwrap();
        assert_eq!(db.get(plan.id).await.unwrap().status(), PlanStatus::InProgress);
    }

    #[tokio::test]
    async fn update_missing_plan_is_not_found() {
        let db = db().await;
        assert!(matches!(
            db.update_status(42, PlanStatus::Open).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn field_updates_round_trip() {
        let db = db().await;
        let plan = task(&db, "/repo", "t").await;
        db.update_branch(plan.id, "plan/1-t").await.unwrap();
        db.update_session(plan.id, "sess-1").await.unwrap();
        db.update_planning_session(plan.id, "draft-1").await.unwrap();
        db.update_worktree_path(plan.id, Some(Path::new("/wt/repo/1")))
            .await
            .unwrap();

        let plan = db.get(plan.id).await.unwrap();
        assert_eq!(plan.branch.as_deref(), Some("plan/1-t"));
        assert_eq!(plan.session_id.as_deref(), Some("sess-1"));
        assert_eq!(plan.planning_session_id.as_deref(), Some("draft-1"));
        assert_eq!(plan.worktree_path.as_deref(), Some("/wt/repo/1"));

        db.update_worktree_path(plan.id, None).await.unwrap();
        assert!(db.get(plan.id).await.unwrap().worktree_path.is_none());
    }

    // =========================================================================
    // Dependencies
    // =========================================================================

    #[tokio::test]
    async fn set_and_get_dependency_round_trips() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;

        db.set_dependency(b.id, Some(a.id)).await.unwrap();
        let dep = db.get_dependency(b.id).await.unwrap().unwrap();
        assert_eq!(dep.id, a.id);

        db.set_dependency(b.id, None).await.unwrap();
        assert!(db.get_dependency(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn dependency_must_exist() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let err = db.set_dependency(a.id, Some(999)).await.unwrap_err();
        assert!(matches!(err, Error::Dependency(_)), "{err}");
    }

    #[tokio::test]
    async fn dependency_must_share_project() {
        let db = db().await;
        let a = task(&db, "/repo-one", "A").await;
        let b = task(&db, "/repo-two", "B").await;
        let err = db.set_dependency(b.id, Some(a.id)).await.unwrap_err();
        assert!(matches!(err, Error::Dependency(_)));
        assert!(err.to_string().contains("different projects"));
    }

    #[tokio::test]
    async fn self_dependency_rejected() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let err = db.set_dependency(a.id, Some(a.id)).await.unwrap_err();
        assert!(err.to_string().contains("itself"));
    }

    #[tokio::test]
    async fn cycle_rejected_and_graph_unchanged() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;
        db.set_dependency(b.id, Some(a.id)).await.unwrap();

        let err = db.set_dependency(a.id, Some(b.id)).await.unwrap_err();
        assert!(err.to_string().contains("circular"), "{err}");
        assert!(db.get(a.id).await.unwrap().depends_on_id.is_none());
    }

    #[tokio::test]
    async fn transitive_cycle_rejected() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;
        let c = task(&db, "/repo", "C").await;
        db.set_dependency(b.id, Some(a.id)).await.unwrap();
        db.set_dependency(c.id, Some(b.id)).await.unwrap();

        assert!(db.would_create_cycle(a.id, c.id).await.unwrap());
        assert!(!db.would_create_cycle(c.id, a.id).await.unwrap());
        assert!(db.set_dependency(a.id, Some(c.id)).await.is_err());
    }

    #[tokio::test]
    async fn dependency_chain_is_root_to_leaf() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;
        let c = task(&db, "/repo", "C").await;
        db.set_dependency(b.id, Some(a.id)).await.unwrap();
        db.set_dependency(c.id, Some(b.id)).await.unwrap();

        let chain = db.get_dependency_chain(c.id).await.unwrap();
        let ids: Vec<i64> = chain.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
    }

    #[tokio::test]
    async fn delete_refused_with_dependents() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;
        db.set_dependency(b.id, Some(a.id)).await.unwrap();

        let err = db.delete(a.id).await.unwrap_err();
        assert!(matches!(err, Error::State(_)));
        assert!(err.to_string().contains(&format!("#{}", b.id)));

        db.set_dependency(b.id, None).await.unwrap();
        db.delete(a.id).await.unwrap();
        assert!(db.get(a.id).await.is_err());
    }

    // =========================================================================
    // Scheduling views
    // =========================================================================

    #[tokio::test]
    async fn unblocked_and_blocked_views() {
        let db = db().await;
        let a = task(&db, "/repo", "A").await;
        let b = task(&db, "/repo", "B").await;
        let free = task(&db, "/repo", "Free").await;
        db.set_dependency(b.id, Some(a.id)).await.unwrap();

        let unblocked: Vec<i64> = db
            .unblocked_open_tasks()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(unblocked, vec![a.id, free.id]);

        let blocked: Vec<i64> = db.blocked_tasks().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(blocked, vec![b.id]);

        // Predecessor reaching in-review unblocks the dependent.
        db.update_status(a.id, PlanStatus::InReview).await.unwrap();
        let unblocked: Vec<i64> = db
            .unblocked_open_tasks()
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(unblocked, vec![b.id, free.id]);
        assert!(db.blocked_tasks().await.unwrap().is_empty());
    }
}
