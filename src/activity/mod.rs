//! Best-effort append-only activity log.
//!
//! One row per persisted mutation, used for in-app history display. The
//! recorder never fails its caller: a mutation that committed stays
//! committed even when its history row cannot be written — the failure goes
//! to the operational log instead.

pub mod audit;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::warn;

use crate::storage::now_ts;
use crate::tasks::model::new_id;

// ─── Action vocabulary ───────────────────────────────────────────────────────

/// Closed vocabulary of activity actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreatedTask,
    CreatedTaskBatch,
    UpdatedTaskStatus,
    UpdatedTaskPriority,
    UpdatedTaskTitle,
    UpdatedTaskDescription,
    ChangedTaskDeadline,
    UpdatedTaskAssignees,
    ChangedResponsibleManager,
    ArchivedTask,
    UnarchivedTask,
    MarkedTaskImportant,
    UnmarkedTaskImportant,
    AddedSubtask,
    ToggledSubtask,
    AddedAttachment,
    AddedComment,
    AddedResponse,
    AddedWatcher,
    RemovedWatcher,
    DeletedTask,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreatedTask => "created_task",
            Action::CreatedTaskBatch => "created_task_batch",
            Action::UpdatedTaskStatus => "updated_task_status",
            Action::UpdatedTaskPriority => "updated_task_priority",
            Action::UpdatedTaskTitle => "updated_task_title",
            Action::UpdatedTaskDescription => "updated_task_description",
            Action::ChangedTaskDeadline => "changed_task_deadline",
            Action::UpdatedTaskAssignees => "updated_task_assignees",
            Action::ChangedResponsibleManager => "changed_responsible_manager",
            Action::ArchivedTask => "archived_task",
            Action::UnarchivedTask => "unarchived_task",
            Action::MarkedTaskImportant => "marked_task_important",
            Action::UnmarkedTaskImportant => "unmarked_task_important",
            Action::AddedSubtask => "added_subtask",
            Action::ToggledSubtask => "toggled_subtask",
            Action::AddedAttachment => "added_attachment",
            Action::AddedComment => "added_comment",
            Action::AddedResponse => "added_response",
            Action::AddedWatcher => "added_watcher",
            Action::RemovedWatcher => "removed_watcher",
            Action::DeletedTask => "deleted_task",
        }
    }
}

// ─── Rows / params ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ActivityRow {
    pub id: String,
    pub ts: i64,
    pub actor: String,
    pub action: String,
    pub resource_type: String,
    pub resource_id: String,
    pub detail: Option<String>,
    pub meta: Option<String>,
    pub workspace_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ActivityQueryParams {
    pub resource_id: Option<String>,
    pub workspace_id: Option<String>,
    pub actor: Option<String>,
    pub action: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

// ─── Recorder ────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct ActivityRecorder {
    pool: SqlitePool,
}

impl ActivityRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Append one entry. Infallible from the caller's perspective — a write
    /// failure is logged at WARN and otherwise dropped.
    #[allow(clippy::too_many_arguments)]
    pub async fn record(
        &self,
        actor: &str,
        action: Action,
        resource_type: &str,
        resource_id: &str,
        detail: &str,
        meta: Option<serde_json::Value>,
        workspace_id: &str,
    ) {
        let result = sqlx::query(
            "INSERT INTO activity_log
             (id, ts, actor, action, resource_type, resource_id, detail, meta, workspace_id)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(now_ts())
        .bind(actor)
        .bind(action.as_str())
        .bind(resource_type)
        .bind(resource_id)
        .bind(detail)
        .bind(meta.map(|m| m.to_string()))
        .bind(workspace_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(
                action = action.as_str(),
                resource_id,
                err = %e,
                "activity log write failed (mutation unaffected)"
            );
        }
    }

    /// Query entries newest-first with (page, limit) pagination.
    pub async fn query(&self, params: &ActivityQueryParams) -> Result<Vec<ActivityRow>> {
        let limit = params.limit.unwrap_or(50).min(200);
        let page = params.page.unwrap_or(1).max(1);
        let offset = (page - 1) * limit;

        // The resource_id path is the hot one (per-task history view).
        if let Some(ref resource_id) = params.resource_id {
            let rows: Vec<ActivityRow> = sqlx::query_as(
                "SELECT * FROM activity_log WHERE resource_id = ?
                 ORDER BY ts DESC LIMIT ? OFFSET ?",
            )
            .bind(resource_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await?;
            return Ok(rows);
        }

        let mut rows: Vec<ActivityRow> =
            sqlx::query_as("SELECT * FROM activity_log ORDER BY ts DESC LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        if let Some(ref ws) = params.workspace_id {
            rows.retain(|r| &r.workspace_id == ws);
        }
        if let Some(ref actor) = params.actor {
            rows.retain(|r| &r.actor == actor);
        }
        if let Some(ref action) = params.action {
            rows.retain(|r| &r.action == action);
        }
        Ok(rows)
    }

    /// Delete entries older than `retention_days`. Returns rows removed.
    pub async fn prune(&self, retention_days: i64) -> Result<u64> {
        let cutoff = now_ts() - retention_days * 86400;
        let result = sqlx::query("DELETE FROM activity_log WHERE ts < ?")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
