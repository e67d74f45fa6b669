//! Database connection and schema management.
//!
//! Schema evolution is additive: on open the base table is created if absent,
//! then `PRAGMA table_info` introspection adds any column a newer binary
//! knows about with its nullable default. Columns are never removed or
//! renamed online, so older binaries keep working against a newer file.

use std::path::Path;

use sqlx::{Pool, Row, Sqlite};
use tracing::info;

use tracker_core::db::{open_pool, open_pool_in_memory};
use tracker_core::{Error, Result};

/// Columns added after the initial schema, with the DDL used to backfill
/// them on databases created by older binaries.
const ADDITIVE_COLUMNS: &[(&str, &str)] = &[
    ("description", "TEXT NOT NULL DEFAULT ''"),
    ("project_name", "TEXT NOT NULL DEFAULT ''"),
    ("planning_session_id", "TEXT"),
    ("worktree_path", "TEXT"),
    ("depends_on_id", "INTEGER"),
];

/// Plan database handle. Cheap to clone; wraps a connection pool.
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open or create the database at the given path and migrate the schema.
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = open_pool(path).await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Open an in-memory database (for testing).
    pub async fn open_in_memory() -> Result<Self> {
        let pool = open_pool_in_memory().await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    /// Get a reference to the connection pool.
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_path TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                project_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                branch TEXT,
                session_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        let existing = self.column_names().await?;
        for (name, ddl) in ADDITIVE_COLUMNS {
            if !existing.iter().any(|c| c == name) {
                sqlx::query(&format!("ALTER TABLE plans ADD COLUMN {name} {ddl}"))
                    .execute(&self.pool)
                    .await?;
                info!(column = name, "added missing plans column");
            }
        }

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_plans_project ON plans (project_path, updated_at)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn column_names(&self) -> Result<Vec<String>> {
        let rows = sqlx::query("PRAGMA table_info(plans)")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("name").map_err(Error::from))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_migrates() {
        let db = Database::open_in_memory().await.unwrap();
        let columns = db.column_names().await.unwrap();
        for (name, _) in ADDITIVE_COLUMNS {
            assert!(columns.iter().any(|c| c == name), "missing column {name}");
        }
    }

    #[tokio::test]
    async fn migration_is_additive_over_old_schema() {
        // Simulate a database created by an older binary: base table only.
        let pool = open_pool_in_memory().await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE plans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                plan_path TEXT NOT NULL DEFAULT '',
                title TEXT NOT NULL,
                project_path TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'open',
                branch TEXT,
                session_id TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO plans (title, project_path, created_at, updated_at) VALUES ('t', '/r', 0, 0)",
        )
        .execute(&pool)
        .await
        .unwrap();

        let db = Database { pool };
        db.migrate().await.unwrap();

        // Old row survives with the new columns defaulted.
        let row = sqlx::query("SELECT depends_on_id, description FROM plans WHERE id = 1")
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert!(row.try_get::<Option<i64>, _>("depends_on_id").unwrap().is_none());
        assert_eq!(row.try_get::<String, _>("description").unwrap(), "");
    }

    #[tokio::test]
    async fn migration_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        db.migrate().await.unwrap();
        db.migrate().await.unwrap();
    }
}
