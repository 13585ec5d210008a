//! Task data model types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Generate a new entity ID (UUID v4).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// ─── Enums ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
    Cancelled,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "todo" => Some(TaskStatus::Todo),
            "in_progress" => Some(TaskStatus::InProgress),
            "done" => Some(TaskStatus::Done),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    Low,
    Medium,
    High,
}

impl TaskPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskPriority::Low => "low",
            TaskPriority::Medium => "medium",
            TaskPriority::High => "high",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "low" => Some(TaskPriority::Low),
            "medium" => Some(TaskPriority::Medium),
            "high" => Some(TaskPriority::High),
            _ => None,
        }
    }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct TaskRow {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub description: String,
    pub status: String,
    pub priority: String,
    pub due_date: Option<i64>,
    pub is_archived: bool,
    pub is_important: bool,
    pub marked_important_by: Option<String>,
    pub marked_important_at: Option<i64>,
    pub completed_at: Option<i64>,
    pub created_by: String,
    pub responsible_manager: Option<String>,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TaskRow {
    pub fn status(&self) -> TaskStatus {
        TaskStatus::from_str(&self.status).unwrap_or(TaskStatus::Todo)
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct SubtaskRow {
    pub id: String,
    pub task_id: String,
    pub title: String,
    pub completed: bool,
    pub position: i64,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AttachmentRow {
    pub id: String,
    pub task_id: String,
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub file_size: i64,
    pub uploaded_by: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct CommentRow {
    pub id: String,
    pub task_id: String,
    pub author_id: String,
    pub body: String,
    pub attachment_url: Option<String>,
    pub reply_to: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct ResponseRow {
    pub id: String,
    pub task_id: String,
    pub author_id: String,
    pub body: String,
    pub created_at: i64,
}

/// Fully populated task representation returned by mutations and reads.
#[derive(Debug, Clone, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: TaskRow,
    pub assignees: Vec<String>,
    pub watchers: Vec<String>,
    pub subtasks: Vec<SubtaskRow>,
    pub attachments: Vec<AttachmentRow>,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct NewTask {
    pub workspace_id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub priority: Option<String>,
    pub due_date: Option<i64>,
    #[serde(default)]
    pub assignees: Vec<String>,
    pub responsible_manager: Option<String>,
}

/// One item of a batch create. The final assignee set of the created task is
/// `assignees ∪ main_assignees` of the batch.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchItem {
    #[serde(default)]
    pub description: String,
    pub due_date: Option<i64>,
    #[serde(default)]
    pub assignees: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTaskBatch {
    pub workspace_id: String,
    pub title: String,
    pub priority: Option<String>,
    pub responsible_manager: Option<String>,
    #[serde(default)]
    pub main_assignees: Vec<String>,
    pub items: Vec<BatchItem>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TaskListParams {
    pub workspace_id: Option<String>,
    pub status: Option<String>,
    pub assignee: Option<String>,
    pub include_archived: Option<bool>,
    pub search: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Union helper used by assignee-diff fan-out and batch dedup.
pub fn to_set(ids: &[String]) -> BTreeSet<String> {
    ids.iter().cloned().collect()
}
