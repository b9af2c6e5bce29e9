//! # Scheduled Task Repository
//!
//! Durable delayed jobs polled by the restock worker.
//!
//! ## The Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Durable Delayed Job                                  │
//! │                                                                         │
//! │  BUSINESS OPERATION (e.g. approve return)                               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. UPDATE returns SET status = 'approved' WHERE id = ?         │   │
//! │  │  2. INSERT INTO scheduled_tasks (kind, payload, due_at_ms)      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← approval and its task exist together or not at all            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │            RESTOCK WORKER (polls, survives restarts)            │   │
//! │  │  1. SELECT ... WHERE completed_at IS NULL AND due_at_ms <= now  │   │
//! │  │  2. For each task:                                              │   │
//! │  │     a. Execute the handler                                      │   │
//! │  │     b. On success: completed_at = now                           │   │
//! │  │     c. On failure: attempts += 1, last_error, due_at_ms pushed  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;
use uuid::Uuid;

use crate::error::DbResult;
use storefront_core::{ScheduledTask, TaskKind};

const TASK_COLUMNS: &str =
    "id, kind, payload, due_at_ms, attempts, last_error, created_at, attempted_at, completed_at";

/// Builds a fresh task value with a new UUID.
pub fn new_task(kind: TaskKind, payload: String, due_at_ms: i64) -> ScheduledTask {
    ScheduledTask {
        id: Uuid::new_v4().to_string(),
        kind,
        payload,
        due_at_ms,
        attempts: 0,
        last_error: None,
        created_at: Utc::now(),
        attempted_at: None,
        completed_at: None,
    }
}

/// Inserts a task through any executor, so callers can enqueue inside
/// their own transaction.
pub(crate) async fn insert_task<'e, E>(executor: E, task: &ScheduledTask) -> DbResult<()>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT INTO scheduled_tasks (
            id, kind, payload, due_at_ms,
            attempts, last_error, created_at, attempted_at, completed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
    )
    .bind(&task.id)
    .bind(task.kind)
    .bind(&task.payload)
    .bind(task.due_at_ms)
    .bind(task.attempts)
    .bind(&task.last_error)
    .bind(task.created_at)
    .bind(task.attempted_at)
    .bind(task.completed_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// Repository for scheduled task operations.
#[derive(Debug, Clone)]
pub struct ScheduledTaskRepository {
    pool: SqlitePool,
}

impl ScheduledTaskRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ScheduledTaskRepository { pool }
    }

    /// Queues a task on its own.
    pub async fn enqueue(&self, kind: TaskKind, payload: String, due_at_ms: i64) -> DbResult<ScheduledTask> {
        let task = new_task(kind, payload, due_at_ms);

        debug!(task_id = %task.id, ?kind, due_at_ms, "Enqueuing task");

        insert_task(&self.pool, &task).await?;
        Ok(task)
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<ScheduledTask>> {
        let task = sqlx::query_as::<_, ScheduledTask>(&format!(
            "SELECT {TASK_COLUMNS} FROM scheduled_tasks WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(task)
    }

    /// Incomplete tasks due at or before `now_ms` with attempts left,
    /// earliest first.
    pub async fn due(&self, now_ms: i64, max_attempts: i64, limit: u32) -> DbResult<Vec<ScheduledTask>> {
        let tasks = sqlx::query_as::<_, ScheduledTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM scheduled_tasks
             WHERE completed_at IS NULL
               AND due_at_ms <= ?1
               AND attempts < ?2
             ORDER BY due_at_ms ASC, created_at ASC
             LIMIT ?3
            "#
        ))
        .bind(now_ms)
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }

    pub async fn mark_completed(&self, id: &str) -> DbResult<()> {
        let now = Utc::now();

        sqlx::query(
            "UPDATE scheduled_tasks SET completed_at = ?2, attempted_at = ?2, attempts = attempts + 1 WHERE id = ?1",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Records a failure and pushes the task back to `retry_at_ms`.
    pub async fn mark_failed(&self, id: &str, error: &str, retry_at_ms: i64) -> DbResult<()> {
        sqlx::query(
            r#"
            UPDATE scheduled_tasks SET
                attempts = attempts + 1,
                last_error = ?2,
                attempted_at = ?3,
                due_at_ms = ?4
            WHERE id = ?1
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(Utc::now())
        .bind(retry_at_ms)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Incomplete tasks, including ones not yet due.
    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scheduled_tasks WHERE completed_at IS NULL")
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    /// Incomplete tasks that ran out of attempts. Need an operator.
    pub async fn exhausted(&self, max_attempts: i64) -> DbResult<Vec<ScheduledTask>> {
        let tasks = sqlx::query_as::<_, ScheduledTask>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM scheduled_tasks
             WHERE completed_at IS NULL AND attempts >= ?1
             ORDER BY due_at_ms
            "#
        ))
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        Ok(tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_due_respects_time_and_attempts() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tasks = db.tasks();

        let early = tasks.enqueue(TaskKind::ReturnRestock, "{}".into(), 1_000).await.unwrap();
        let late = tasks.enqueue(TaskKind::ReturnRestock, "{}".into(), 5_000).await.unwrap();

        let due = tasks.due(2_000, 3, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, early.id);

        tasks.mark_failed(&early.id, "boom", 6_000).await.unwrap();
        let due: Vec<String> = tasks.due(6_000, 3, 10).await.unwrap().into_iter().map(|t| t.id).collect();
        assert_eq!(due, vec![late.id.clone(), early.id.clone()]);

        // One attempt used, max 1 → excluded
        let due = tasks.due(6_000, 1, 10).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(tasks.exhausted(1).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_completed_tasks_leave_queue() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let tasks = db.tasks();

        let task = tasks.enqueue(TaskKind::ReturnRestock, "{}".into(), 0).await.unwrap();
        assert_eq!(tasks.count_pending().await.unwrap(), 1);

        tasks.mark_completed(&task.id).await.unwrap();
        assert_eq!(tasks.count_pending().await.unwrap(), 0);
        assert!(tasks.due(i64::MAX, 5, 10).await.unwrap().is_empty());

        let stored = tasks.get_by_id(&task.id).await.unwrap().unwrap();
        assert!(stored.completed_at.is_some());
        assert_eq!(stored.attempts, 1);
    }
}
