//! Study plan storage using SQLite
//!
//! This module handles all local storage including:
//! - The content catalog (books, chapters, topics, learning objectives, assignments)
//! - Study plans and their items
//! - Join rows between content units and items
//! - Sync task history

mod catalog;
mod items;
mod schema;
mod tasks;

pub use catalog::*;
pub use items::*;
pub use schema::*;
pub use tasks::*;

use crate::config::{Config, DatabaseConfig, EngineConfig};
use crate::error::Result;
use crate::model::ContentKind;
use crate::sync::Propagator;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Database handle; implements the engine's catalog, repository and task traits
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    /// Connect to the database configured in `config`
    pub async fn connect(config: &Config) -> Result<Self> {
        Self::open(&config.paths.db_file, &config.database).await
    }

    /// Open a database at a path with default settings, creating the schema if needed
    pub async fn new(db_path: &Path) -> Result<Self> {
        let store = Self::open(db_path, &DatabaseConfig::default()).await?;

        if !store.is_initialized().await? {
            store.init_schema().await?;
        }

        Ok(store)
    }

    async fn open(db_path: &Path, settings: &DatabaseConfig) -> Result<Self> {
        // Create parent directory if needed
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(settings.busy_timeout_secs));

        debug!("Connecting to SQLite database at {:?}", db_path);

        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// Initialize the database schema
    pub async fn init_schema(&self) -> Result<()> {
        info!("Initializing database schema");
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    /// Check if database is initialized
    pub async fn is_initialized(&self) -> Result<bool> {
        let result: Option<(i32,)> = sqlx::query_as(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='study_plan_items'",
        )
        .fetch_optional(&self.pool)
        .await?;
        Ok(result.is_some())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Build an engine backed by this store
    pub fn propagator(&self, settings: EngineConfig) -> Propagator {
        let shared = Arc::new(self.clone());
        Propagator::new(shared.clone(), shared.clone(), shared, settings)
    }

    // ===== Statistics =====

    /// Count join rows of one kind
    pub async fn count_join_rows(&self, kind: ContentKind) -> Result<i64> {
        let query = format!("SELECT COUNT(*) FROM {}", kind.join_table());
        let count: i64 = sqlx::query_scalar(&query).fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Get global statistics
    pub async fn global_stats(&self) -> Result<GlobalStats> {
        let book_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM books")
            .fetch_one(&self.pool)
            .await?;

        let (plan_count, master_count): (i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*), COALESCE(SUM(CASE WHEN master_study_plan_id IS NULL THEN 1 ELSE 0 END), 0)
            FROM study_plans WHERE deleted_at IS NULL
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let item_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM study_plan_items WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        let join_row_count = self.count_join_rows(ContentKind::LearningObjective).await?
            + self.count_join_rows(ContentKind::Assignment).await?;

        let task_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sync_tasks")
            .fetch_one(&self.pool)
            .await?;

        Ok(GlobalStats {
            book_count: book_count as usize,
            study_plan_count: plan_count as usize,
            master_plan_count: master_count as usize,
            item_count: item_count as usize,
            join_row_count: join_row_count as usize,
            task_count: task_count as usize,
        })
    }

    /// Mark a study plan deleted; its items stay but the engine no longer sees the plan
    pub async fn soft_delete_study_plan(&self, study_plan_id: &str) -> Result<bool> {
        let now = Utc::now().to_rfc3339();
        let result = sqlx::query(
            "UPDATE study_plans SET deleted_at = ?, updated_at = ? WHERE study_plan_id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(&now)
        .bind(study_plan_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Comma-separated bind placeholders for an `IN (...)` list
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(",")
}

/// Global statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalStats {
    pub book_count: usize,
    pub study_plan_count: usize,
    pub master_plan_count: usize,
    pub item_count: usize,
    pub join_row_count: usize,
    pub task_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn setup_test_db() -> (Store, TempDir) {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.paths.db_file = tmp.path().join("test.db");

        let store = Store::connect(&config).await.unwrap();
        store.init_schema().await.unwrap();
        (store, tmp)
    }

    #[tokio::test]
    async fn test_init_schema_is_idempotent() {
        let (store, _tmp) = setup_test_db().await;
        assert!(store.is_initialized().await.unwrap());
        store.init_schema().await.unwrap();

        let stats = store.global_stats().await.unwrap();
        assert_eq!(stats.book_count, 0);
        assert_eq!(stats.item_count, 0);
    }

    #[tokio::test]
    async fn test_new_creates_schema() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(&tmp.path().join("nested").join("db.sqlite"))
            .await
            .unwrap();
        assert!(store.is_initialized().await.unwrap());
    }

    #[tokio::test]
    async fn test_soft_delete_study_plan() {
        let (store, _tmp) = setup_test_db().await;
        let plan = crate::model::StudyPlan {
            id: "sp-master".into(),
            book_id: "book-1".into(),
            course_id: None,
            master_study_plan_id: None,
            name: None,
        };
        store.upsert_study_plan(&plan).await.unwrap();
        assert_eq!(store.global_stats().await.unwrap().master_plan_count, 1);

        assert!(store.soft_delete_study_plan("sp-master").await.unwrap());
        assert!(!store.soft_delete_study_plan("sp-master").await.unwrap());
        assert_eq!(store.global_stats().await.unwrap().study_plan_count, 0);
    }
}
