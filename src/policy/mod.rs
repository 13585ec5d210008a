//! Role-Based Access Control for task mutations.
//!
//! Every actor holds a [`Role`]; every mutation is an [`Operation`]. Whether
//! the actor may perform the operation is decided by one declarative table
//! ([`table::RULES`]) consulted through [`check`] — mutation handlers never
//! test role membership themselves.

pub mod table;

use serde::{Deserialize, Serialize};

pub use table::check;

// ─── Roles ────────────────────────────────────────────────────────────────────

/// Roles a platform user can hold, ascending privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular workspace member — works assigned tasks only.
    Member,
    /// Creates and edits tasks in their workspaces.
    Manager,
    /// Manager with status-transition rights over all tasks.
    ChiefManager,
    Admin,
    SuperAdmin,
    /// Unknown or unregistered role — no rights.
    Unknown,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Member => "member",
            Role::Manager => "manager",
            Role::ChiefManager => "chief_manager",
            Role::Admin => "admin",
            Role::SuperAdmin => "super_admin",
            Role::Unknown => "unknown",
        }
    }

    /// Parse a role from its string identifier.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Self {
        match s {
            "member" => Role::Member,
            "manager" => Role::Manager,
            "chief_manager" => Role::ChiefManager,
            "admin" => Role::Admin,
            "super_admin" => Role::SuperAdmin,
            _ => Role::Unknown,
        }
    }

    /// Roles allowed to be set as a task's responsible manager.
    pub fn can_be_responsible_manager(&self) -> bool {
        matches!(self, Role::Manager | Role::Admin | Role::SuperAdmin)
    }
}

// ─── Actor relationship to a task ────────────────────────────────────────────

/// How the actor relates to the task under mutation. Computed by the engine
/// from the task snapshot; the policy table grants operations through
/// relationships independently of role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Relationship {
    pub is_creator: bool,
    pub is_assignee: bool,
    pub is_responsible_manager: bool,
}

// ─── Operations ──────────────────────────────────────────────────────────────

/// Every mutation the engine exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateTask,
    CreateTaskBatch,
    ChangeStatus,
    CancelTask,
    ChangePriority,
    ChangeTitle,
    ChangeDescription,
    ChangeDueDate,
    ChangeAssignees,
    SetResponsibleManager,
    ToggleArchive,
    MarkImportant,
    AddSubtask,
    ToggleSubtask,
    AddAttachment,
    AddWatcher,
    RemoveWatcher,
    AddComment,
    ReplyToComment,
    AddResponse,
    DeleteTask,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::CreateTask => "create_task",
            Operation::CreateTaskBatch => "create_task_batch",
            Operation::ChangeStatus => "change_status",
            Operation::CancelTask => "cancel_task",
            Operation::ChangePriority => "change_priority",
            Operation::ChangeTitle => "change_title",
            Operation::ChangeDescription => "change_description",
            Operation::ChangeDueDate => "change_due_date",
            Operation::ChangeAssignees => "change_assignees",
            Operation::SetResponsibleManager => "set_responsible_manager",
            Operation::ToggleArchive => "toggle_archive",
            Operation::MarkImportant => "mark_important",
            Operation::AddSubtask => "add_subtask",
            Operation::ToggleSubtask => "toggle_subtask",
            Operation::AddAttachment => "add_attachment",
            Operation::AddWatcher => "add_watcher",
            Operation::RemoveWatcher => "remove_watcher",
            Operation::AddComment => "add_comment",
            Operation::ReplyToComment => "reply_to_comment",
            Operation::AddResponse => "add_response",
            Operation::DeleteTask => "delete_task",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ─── Denial ──────────────────────────────────────────────────────────────────

/// A denied operation. Carries the human-readable reason returned to callers.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("role '{role}' may not {operation}{hint}")]
pub struct PolicyDenial {
    pub role: Role,
    pub operation: Operation,
    /// Extra context, e.g. " (only the responsible manager may change status)".
    pub hint: String,
}
