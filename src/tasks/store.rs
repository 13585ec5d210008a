use anyhow::{anyhow, Result};
use sqlx::SqlitePool;

use super::model::{
    new_id, AttachmentRow, CommentRow, NewTask, ResponseRow, SubtaskRow, TaskListParams, TaskRow,
    TaskStatus, TaskView,
};
use crate::storage::{now_ts, with_timeout};

/// Durable record of tasks and their embedded sub-entities.
///
/// Every write to the `tasks` row itself is guarded by the row's `version`
/// counter: `UPDATE … WHERE id = ? AND version = ?` bumping `version`.
/// `rows_affected() == 0` means the caller's snapshot is stale — the mutation
/// engine re-reads and retries. Sub-entity tables (assignee/watcher sets,
/// subtasks, attachments, comments, responses) are keyed inserts and need no
/// version guard of their own.
#[derive(Clone)]
pub struct TaskStore {
    pool: SqlitePool,
}

impl TaskStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─── Create / read ────────────────────────────────────────────────────────

    pub async fn create_task(&self, input: &NewTask, created_by: &str) -> Result<TaskRow> {
        let id = new_id();
        let now = now_ts();
        sqlx::query(
            "INSERT INTO tasks
             (id, workspace_id, title, description, status, priority, due_date,
              created_by, responsible_manager, created_at, updated_at)
             VALUES (?, ?, ?, ?, 'todo', ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&input.workspace_id)
        .bind(&input.title)
        .bind(&input.description)
        .bind(input.priority.as_deref().unwrap_or("medium"))
        .bind(input.due_date)
        .bind(created_by)
        .bind(&input.responsible_manager)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        for user_id in &input.assignees {
            self.add_assignee(&id, user_id).await?;
        }

        self.get_task(&id)
            .await?
            .ok_or_else(|| anyhow!("task not found after insert"))
    }

    pub async fn get_task(&self, id: &str) -> Result<Option<TaskRow>> {
        Ok(sqlx::query_as("SELECT * FROM tasks WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn get_view(&self, id: &str) -> Result<Option<TaskView>> {
        let Some(task) = self.get_task(id).await? else {
            return Ok(None);
        };
        Ok(Some(TaskView {
            assignees: self.assignees(id).await?,
            watchers: self.watchers(id).await?,
            subtasks: self.subtasks(id).await?,
            attachments: self.attachments(id).await?,
            task,
        }))
    }

    pub async fn list_tasks(&self, params: &TaskListParams) -> Result<Vec<TaskRow>> {
        let limit = params.limit.unwrap_or(100).min(500);
        let offset = params.offset.unwrap_or(0);

        let pool = self.pool.clone();
        let mut rows: Vec<TaskRow> = with_timeout(async {
            Ok(sqlx::query_as(
                "SELECT * FROM tasks ORDER BY
                 CASE priority WHEN 'high' THEN 1 WHEN 'medium' THEN 2 ELSE 3 END,
                 updated_at DESC
                 LIMIT ? OFFSET ?",
            )
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await?)
        })
        .await?;

        // Post-filter (SQLite has limited dynamic WHERE support without a query builder)
        if let Some(ref ws) = params.workspace_id {
            rows.retain(|r| &r.workspace_id == ws);
        }
        if let Some(ref status) = params.status {
            rows.retain(|r| &r.status == status);
        }
        if !params.include_archived.unwrap_or(false) {
            rows.retain(|r| !r.is_archived);
        }
        if let Some(ref search) = params.search {
            let q = search.to_lowercase();
            rows.retain(|r| r.title.to_lowercase().contains(&q));
        }
        if let Some(ref assignee) = params.assignee {
            let mut kept = Vec::new();
            for r in rows {
                if self.assignees(&r.id).await?.contains(assignee) {
                    kept.push(r);
                }
            }
            rows = kept;
        }

        Ok(rows)
    }

    // ─── Versioned field updates ─────────────────────────────────────────────

    /// Set status and keep the `completed_at ⟺ done` invariant: entering
    /// `done` stamps it, leaving `done` clears it.
    pub async fn set_status(
        &self,
        id: &str,
        expected_version: i64,
        status: TaskStatus,
    ) -> Result<bool> {
        let now = now_ts();
        let completed_at = match status {
            TaskStatus::Done => Some(now),
            _ => None,
        };
        let affected = sqlx::query(
            "UPDATE tasks
             SET status = ?, completed_at = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(status.as_str())
        .bind(completed_at)
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn set_priority(&self, id: &str, expected_version: i64, priority: &str) -> Result<bool> {
        self.versioned_set(id, expected_version, "priority", priority).await
    }

    pub async fn set_title(&self, id: &str, expected_version: i64, title: &str) -> Result<bool> {
        self.versioned_set(id, expected_version, "title", title).await
    }

    pub async fn set_description(
        &self,
        id: &str,
        expected_version: i64,
        description: &str,
    ) -> Result<bool> {
        self.versioned_set(id, expected_version, "description", description).await
    }

    pub async fn set_responsible_manager(
        &self,
        id: &str,
        expected_version: i64,
        manager: Option<&str>,
    ) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE tasks SET responsible_manager = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(manager)
        .bind(now_ts())
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn set_due_date(
        &self,
        id: &str,
        expected_version: i64,
        due_date: Option<i64>,
    ) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE tasks SET due_date = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(due_date)
        .bind(now_ts())
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    pub async fn set_archived(&self, id: &str, expected_version: i64, archived: bool) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE tasks SET is_archived = ?, version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(archived)
        .bind(now_ts())
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Set or clear the importance flag together with its marker fields.
    pub async fn set_important(
        &self,
        id: &str,
        expected_version: i64,
        important: bool,
        marked_by: Option<&str>,
    ) -> Result<bool> {
        let now = now_ts();
        let marked_at = important.then_some(now);
        let affected = sqlx::query(
            "UPDATE tasks
             SET is_important = ?, marked_important_by = ?, marked_important_at = ?,
                 version = version + 1, updated_at = ?
             WHERE id = ? AND version = ?",
        )
        .bind(important)
        .bind(important.then(|| marked_by.unwrap_or_default()))
        .bind(marked_at)
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Replace the whole assignee set. The version bump and the set swap run
    /// in one transaction so a stale writer cannot interleave.
    pub async fn replace_assignees(
        &self,
        id: &str,
        expected_version: i64,
        assignees: &[String],
    ) -> Result<bool> {
        let now = now_ts();
        let mut tx = self.pool.begin().await?;

        let affected = sqlx::query(
            "UPDATE tasks SET version = version + 1, updated_at = ? WHERE id = ? AND version = ?",
        )
        .bind(now)
        .bind(id)
        .bind(expected_version)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if affected == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query("DELETE FROM task_assignees WHERE task_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for user_id in assignees {
            sqlx::query(
                "INSERT OR IGNORE INTO task_assignees (task_id, user_id, added_at) VALUES (?, ?, ?)",
            )
            .bind(id)
            .bind(user_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(true)
    }

    async fn versioned_set(
        &self,
        id: &str,
        expected_version: i64,
        column: &'static str,
        value: &str,
    ) -> Result<bool> {
        // `column` is a compile-time constant from this module, never input.
        let sql = format!(
            "UPDATE tasks SET {column} = ?, version = version + 1, updated_at = ? \
             WHERE id = ? AND version = ?"
        );
        let affected = sqlx::query(&sql)
            .bind(value)
            .bind(now_ts())
            .bind(id)
            .bind(expected_version)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    // ─── Assignees / watchers ────────────────────────────────────────────────

    pub async fn assignees(&self, task_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM task_assignees WHERE task_id = ? ORDER BY added_at, user_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn add_assignee(&self, task_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_assignees (task_id, user_id, added_at) VALUES (?, ?, ?)",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn watchers(&self, task_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT user_id FROM task_watchers WHERE task_id = ? ORDER BY added_at, user_id",
        )
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    pub async fn add_watcher(&self, task_id: &str, user_id: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR IGNORE INTO task_watchers (task_id, user_id, added_at) VALUES (?, ?, ?)",
        )
        .bind(task_id)
        .bind(user_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_watcher(&self, task_id: &str, user_id: &str) -> Result<bool> {
        let affected = sqlx::query("DELETE FROM task_watchers WHERE task_id = ? AND user_id = ?")
            .bind(task_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?
            .rows_affected();
        Ok(affected > 0)
    }

    // ─── Subtasks / attachments ──────────────────────────────────────────────

    pub async fn subtasks(&self, task_id: &str) -> Result<Vec<SubtaskRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM subtasks WHERE task_id = ? ORDER BY position")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    pub async fn add_subtask(&self, task_id: &str, title: &str) -> Result<SubtaskRow> {
        let id = new_id();
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM subtasks WHERE task_id = ?")
                .bind(task_id)
                .fetch_one(&self.pool)
                .await?;
        sqlx::query(
            "INSERT INTO subtasks (id, task_id, title, completed, position, created_at)
             VALUES (?, ?, ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(title)
        .bind(count)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM subtasks WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn toggle_subtask(&self, task_id: &str, subtask_id: &str) -> Result<Option<SubtaskRow>> {
        sqlx::query(
            "UPDATE subtasks SET completed = NOT completed WHERE id = ? AND task_id = ?",
        )
        .bind(subtask_id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(sqlx::query_as("SELECT * FROM subtasks WHERE id = ? AND task_id = ?")
            .bind(subtask_id)
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn attachments(&self, task_id: &str) -> Result<Vec<AttachmentRow>> {
        Ok(
            sqlx::query_as("SELECT * FROM attachments WHERE task_id = ? ORDER BY created_at")
                .bind(task_id)
                .fetch_all(&self.pool)
                .await?,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_attachment(
        &self,
        task_id: &str,
        file_name: &str,
        file_url: &str,
        file_type: &str,
        file_size: i64,
        uploaded_by: &str,
    ) -> Result<AttachmentRow> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO attachments
             (id, task_id, file_name, file_url, file_type, file_size, uploaded_by, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(file_name)
        .bind(file_url)
        .bind(file_type)
        .bind(file_size)
        .bind(uploaded_by)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM attachments WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    // ─── Comments / responses ────────────────────────────────────────────────

    pub async fn add_comment(
        &self,
        task_id: &str,
        author_id: &str,
        body: &str,
        attachment_url: Option<&str>,
        reply_to: Option<&str>,
    ) -> Result<CommentRow> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO comments (id, task_id, author_id, body, attachment_url, reply_to, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .bind(attachment_url)
        .bind(reply_to)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM comments WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    pub async fn get_comment(&self, id: &str) -> Result<Option<CommentRow>> {
        Ok(sqlx::query_as("SELECT * FROM comments WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    pub async fn add_response(
        &self,
        task_id: &str,
        author_id: &str,
        body: &str,
    ) -> Result<ResponseRow> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO responses (id, task_id, author_id, body, created_at)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(task_id)
        .bind(author_id)
        .bind(body)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM responses WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    // ─── Deletion ────────────────────────────────────────────────────────────

    /// Hard-delete a task with all sub-entities and its activity rows (the
    /// one sanctioned cascade delete of activity history).
    pub async fn delete_task(&self, id: &str) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in [
            "task_assignees",
            "task_watchers",
            "subtasks",
            "attachments",
            "comments",
            "responses",
        ] {
            sqlx::query(&format!("DELETE FROM {table} WHERE task_id = ?"))
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        sqlx::query("DELETE FROM activity_log WHERE resource_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}
