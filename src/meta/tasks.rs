//! Sync task history

use super::Store;
use crate::error::Result;
use crate::model::TaskStatus;
use crate::sync::TaskTracker;
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A tracked run record
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SyncTask {
    pub task_id: String,
    pub kind: String,
    pub status: String,
    pub detail: Option<String>,
    pub started_at: String,
    pub finished_at: Option<String>,
}

impl SyncTask {
    pub fn get_status(&self) -> Result<TaskStatus> {
        self.status.parse()
    }
}

impl Store {
    /// Most recent tasks first
    pub async fn list_tasks(&self, limit: i64) -> Result<Vec<SyncTask>> {
        let tasks = sqlx::query_as::<_, SyncTask>(
            "SELECT * FROM sync_tasks ORDER BY started_at DESC, task_id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(tasks)
    }
}

#[async_trait]
impl TaskTracker for Store {
    async fn start_task(&self, kind: &str) -> Result<String> {
        let task_id = Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO sync_tasks (task_id, kind, status, started_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&task_id)
        .bind(kind)
        .bind(TaskStatus::InProgress.to_string())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(task_id)
    }

    async fn finish_task(
        &self,
        task_id: &str,
        status: TaskStatus,
        detail: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE sync_tasks SET status = ?, detail = ?, finished_at = ?
            WHERE task_id = ?
            "#,
        )
        .bind(status.to_string())
        .bind(detail)
        .bind(Utc::now().to_rfc3339())
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
