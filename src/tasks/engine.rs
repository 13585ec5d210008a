//! Task Mutation Engine.
//!
//! Every mutation follows the same contract:
//! load → policy check → input validation → versioned write → activity
//! entry → notification fan-out → updated representation. The first three
//! steps abort with no state change; the fan-out runs after commit and its
//! outcome never reaches the caller.
//!
//! Task-row writes are optimistic: the store refuses a write against a stale
//! `version`, and the engine re-reads and retries the whole cycle a bounded
//! number of times before reporting a conflict.

use serde_json::json;
use std::collections::BTreeSet;
use tracing::debug;

use super::mentions::extract_mention_tokens;
use super::model::{
    to_set, AttachmentRow, CommentRow, NewTask, NewTaskBatch, ResponseRow, SubtaskRow,
    TaskListParams, TaskPriority, TaskRow, TaskStatus, TaskView,
};
use super::store::TaskStore;
use crate::activity::audit::{AuditCategory, AuditEntry, AuditRecorder, Origin};
use crate::activity::{Action, ActivityRecorder};
use crate::error::{EngineError, EngineResult};
use crate::notify::{NotificationDispatcher, TaskEvent, TaskSnapshot};
use crate::policy::{self, Operation, Relationship};
use crate::storage::now_ts;
use crate::users::{UserDirectory, UserRow};

/// Re-read/retry budget for optimistic writes.
const WRITE_RETRIES: u32 = 3;

/// Creator deletion window.
const DELETE_WINDOW_SECS: i64 = 24 * 3600;

/// Longest comment excerpt carried in a notification body.
const EXCERPT_LEN: usize = 120;

pub struct TaskEngine {
    store: TaskStore,
    users: UserDirectory,
    activity: ActivityRecorder,
    audit: AuditRecorder,
    dispatcher: NotificationDispatcher,
}

impl TaskEngine {
    pub fn new(
        store: TaskStore,
        users: UserDirectory,
        activity: ActivityRecorder,
        audit: AuditRecorder,
        dispatcher: NotificationDispatcher,
    ) -> Self {
        Self {
            store,
            users,
            activity,
            audit,
            dispatcher,
        }
    }

    // ─── Reads ───────────────────────────────────────────────────────────────

    pub async fn get_task(&self, id: &str) -> EngineResult<TaskView> {
        self.store
            .get_view(id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", id))
    }

    pub async fn list_tasks(&self, params: &TaskListParams) -> EngineResult<Vec<TaskRow>> {
        Ok(self.store.list_tasks(params).await?)
    }

    // ─── Create ──────────────────────────────────────────────────────────────

    pub async fn create_task(&self, actor: &UserRow, input: NewTask) -> EngineResult<TaskView> {
        self.authorize_unbound(Operation::CreateTask, actor)?;
        if input.title.trim().is_empty() {
            return Err(EngineError::validation("task title must not be empty"));
        }
        self.validate_priority(input.priority.as_deref())?;
        self.validate_responsible_manager(input.responsible_manager.as_deref())
            .await?;

        let task = self.store.create_task(&input, &actor.id).await?;

        self.activity
            .record(
                &actor.id,
                Action::CreatedTask,
                "task",
                &task.id,
                &format!("created task \"{}\"", task.title),
                None,
                &task.workspace_id,
            )
            .await;

        let snapshot = self.snapshot(&task).await?;
        self.dispatcher
            .dispatch(&TaskEvent::TaskCreated {
                snapshot,
                actor: actor.id.clone(),
            })
            .await;

        self.get_task(&task.id).await
    }

    /// Batch create: one shared title, N ≥ 2 items. Each task's assignee set
    /// is that item's participants ∪ the shared main assignees; the fan-out
    /// is deduplicated to one notification per unique recipient, referencing
    /// the first created task.
    pub async fn create_task_batch(
        &self,
        actor: &UserRow,
        input: NewTaskBatch,
    ) -> EngineResult<Vec<TaskView>> {
        self.authorize_unbound(Operation::CreateTaskBatch, actor)?;
        if input.items.len() < 2 {
            return Err(EngineError::validation(
                "batch create requires at least 2 tasks",
            ));
        }
        if input.title.trim().is_empty() {
            return Err(EngineError::validation("task title must not be empty"));
        }
        self.validate_priority(input.priority.as_deref())?;
        self.validate_responsible_manager(input.responsible_manager.as_deref())
            .await?;

        let mut created: Vec<TaskRow> = Vec::with_capacity(input.items.len());
        let mut recipients: BTreeSet<String> = BTreeSet::new();

        for item in &input.items {
            let mut assignees = to_set(&item.assignees);
            assignees.extend(input.main_assignees.iter().cloned());

            let task = self
                .store
                .create_task(
                    &NewTask {
                        workspace_id: input.workspace_id.clone(),
                        title: input.title.clone(),
                        description: item.description.clone(),
                        priority: input.priority.clone(),
                        due_date: item.due_date,
                        assignees: assignees.iter().cloned().collect(),
                        responsible_manager: input.responsible_manager.clone(),
                    },
                    &actor.id,
                )
                .await?;

            recipients.extend(assignees);
            if let Some(rm) = &input.responsible_manager {
                recipients.insert(rm.clone());
            }

            self.activity
                .record(
                    &actor.id,
                    Action::CreatedTask,
                    "task",
                    &task.id,
                    &format!("created task \"{}\" (batch)", task.title),
                    None,
                    &task.workspace_id,
                )
                .await;
            created.push(task);
        }

        let first = self.snapshot(&created[0]).await?;
        self.dispatcher
            .dispatch(&TaskEvent::TaskBatchCreated {
                first,
                count: created.len(),
                recipients,
                actor: actor.id.clone(),
            })
            .await;

        let mut views = Vec::with_capacity(created.len());
        for task in &created {
            views.push(self.get_task(&task.id).await?);
        }
        Ok(views)
    }

    // ─── Status ──────────────────────────────────────────────────────────────

    pub async fn update_status(
        &self,
        actor: &UserRow,
        task_id: &str,
        new_status: TaskStatus,
    ) -> EngineResult<TaskView> {
        let op = if new_status == TaskStatus::Cancelled {
            Operation::CancelTask
        } else {
            Operation::ChangeStatus
        };

        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(op, actor, &task).await?;
            let from = task.status();

            if self.store.set_status(&task.id, task.version, new_status).await? {
                self.activity
                    .record(
                        &actor.id,
                        Action::UpdatedTaskStatus,
                        "task",
                        &task.id,
                        &format!("status {} → {}", from, new_status),
                        Some(json!({ "from": from.as_str(), "to": new_status.as_str() })),
                        &task.workspace_id,
                    )
                    .await;

                let updated = self.load(task_id).await?;
                let snapshot = self.snapshot(&updated).await?;
                self.dispatcher
                    .dispatch(&TaskEvent::StatusChanged {
                        snapshot,
                        from: from.as_str().to_string(),
                        to: new_status.as_str().to_string(),
                        actor: actor.id.clone(),
                    })
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale status write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    // ─── Scalar field updates ────────────────────────────────────────────────

    pub async fn update_priority(
        &self,
        actor: &UserRow,
        task_id: &str,
        priority: &str,
    ) -> EngineResult<TaskView> {
        let parsed = TaskPriority::from_str(priority)
            .ok_or_else(|| EngineError::validation(format!("unknown priority '{priority}'")))?;

        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ChangePriority, actor, &task).await?;
            let previous = task.priority.clone();

            if self
                .store
                .set_priority(&task.id, task.version, parsed.as_str())
                .await?
            {
                self.activity
                    .record(
                        &actor.id,
                        Action::UpdatedTaskPriority,
                        "task",
                        &task.id,
                        &format!("priority {} → {}", previous, parsed.as_str()),
                        Some(json!({ "from": previous, "to": parsed.as_str() })),
                        &task.workspace_id,
                    )
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale priority write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    pub async fn update_title(
        &self,
        actor: &UserRow,
        task_id: &str,
        title: &str,
    ) -> EngineResult<TaskView> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("task title must not be empty"));
        }
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ChangeTitle, actor, &task).await?;
            let previous = task.title.clone();

            if self.store.set_title(&task.id, task.version, title).await? {
                self.activity
                    .record(
                        &actor.id,
                        Action::UpdatedTaskTitle,
                        "task",
                        &task.id,
                        &format!("renamed \"{}\" to \"{}\"", previous, title),
                        Some(json!({ "from": previous, "to": title })),
                        &task.workspace_id,
                    )
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale title write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    pub async fn update_description(
        &self,
        actor: &UserRow,
        task_id: &str,
        description: &str,
    ) -> EngineResult<TaskView> {
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ChangeDescription, actor, &task).await?;

            if self
                .store
                .set_description(&task.id, task.version, description)
                .await?
            {
                self.activity
                    .record(
                        &actor.id,
                        Action::UpdatedTaskDescription,
                        "task",
                        &task.id,
                        "updated description",
                        None,
                        &task.workspace_id,
                    )
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale description write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    pub async fn update_due_date(
        &self,
        actor: &UserRow,
        task_id: &str,
        due_date: Option<i64>,
    ) -> EngineResult<TaskView> {
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ChangeDueDate, actor, &task).await?;
            let previous = task.due_date;

            if self
                .store
                .set_due_date(&task.id, task.version, due_date)
                .await?
            {
                self.activity
                    .record(
                        &actor.id,
                        Action::ChangedTaskDeadline,
                        "task",
                        &task.id,
                        "changed deadline",
                        Some(json!({ "from": previous, "to": due_date })),
                        &task.workspace_id,
                    )
                    .await;

                let updated = self.load(task_id).await?;
                let snapshot = self.snapshot(&updated).await?;
                self.dispatcher
                    .dispatch(&TaskEvent::DeadlineChanged {
                        snapshot,
                        due_date,
                        actor: actor.id.clone(),
                    })
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale due-date write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    // ─── Assignees / responsible manager ─────────────────────────────────────

    /// Replace the assignee set. Only users newly added by this edit are
    /// notified — re-saving an unchanged list fans out to nobody.
    pub async fn update_assignees(
        &self,
        actor: &UserRow,
        task_id: &str,
        assignees: Vec<String>,
    ) -> EngineResult<TaskView> {
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ChangeAssignees, actor, &task).await?;

            let previous = to_set(&self.store.assignees(&task.id).await?);
            let incoming = to_set(&assignees);
            let newly_added: BTreeSet<String> =
                incoming.difference(&previous).cloned().collect();

            if self
                .store
                .replace_assignees(&task.id, task.version, &assignees)
                .await?
            {
                self.activity
                    .record(
                        &actor.id,
                        Action::UpdatedTaskAssignees,
                        "task",
                        &task.id,
                        &format!("assignees now {} user(s)", incoming.len()),
                        Some(json!({
                            "from": previous.iter().collect::<Vec<_>>(),
                            "to": incoming.iter().collect::<Vec<_>>(),
                        })),
                        &task.workspace_id,
                    )
                    .await;

                if !newly_added.is_empty() {
                    let updated = self.load(task_id).await?;
                    let snapshot = self.snapshot(&updated).await?;
                    self.dispatcher
                        .dispatch(&TaskEvent::AssigneesAdded {
                            snapshot,
                            newly_added,
                            actor: actor.id.clone(),
                        })
                        .await;
                }
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale assignee write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    pub async fn set_responsible_manager(
        &self,
        actor: &UserRow,
        task_id: &str,
        manager: Option<String>,
    ) -> EngineResult<TaskView> {
        self.validate_responsible_manager(manager.as_deref()).await?;

        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::SetResponsibleManager, actor, &task)
                .await?;
            let previous = task.responsible_manager.clone();

            if self
                .store
                .set_responsible_manager(&task.id, task.version, manager.as_deref())
                .await?
            {
                self.activity
                    .record(
                        &actor.id,
                        Action::ChangedResponsibleManager,
                        "task",
                        &task.id,
                        "changed responsible manager",
                        Some(json!({ "from": previous, "to": manager })),
                        &task.workspace_id,
                    )
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale responsible-manager write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    // ─── Flags ───────────────────────────────────────────────────────────────

    /// Flip the archive flag (soft removal, reversible).
    pub async fn toggle_archive(&self, actor: &UserRow, task_id: &str) -> EngineResult<TaskView> {
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::ToggleArchive, actor, &task).await?;
            let archiving = !task.is_archived;

            if self
                .store
                .set_archived(&task.id, task.version, archiving)
                .await?
            {
                let action = if archiving {
                    Action::ArchivedTask
                } else {
                    Action::UnarchivedTask
                };
                self.activity
                    .record(
                        &actor.id,
                        action,
                        "task",
                        &task.id,
                        &format!(
                            "{} \"{}\"",
                            if archiving { "archived" } else { "unarchived" },
                            task.title
                        ),
                        None,
                        &task.workspace_id,
                    )
                    .await;
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale archive write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    /// Flip the importance flag. Turning it on stamps marker fields, audits
    /// the action, and notifies every super_admin; turning it off clears the
    /// markers silently.
    pub async fn toggle_important(
        &self,
        actor: &UserRow,
        task_id: &str,
        origin: &Origin,
    ) -> EngineResult<TaskView> {
        for attempt in 0..WRITE_RETRIES {
            let task = self.load(task_id).await?;
            self.authorize(Operation::MarkImportant, actor, &task).await?;
            let marking = !task.is_important;

            if self
                .store
                .set_important(&task.id, task.version, marking, Some(&actor.id))
                .await?
            {
                let action = if marking {
                    Action::MarkedTaskImportant
                } else {
                    Action::UnmarkedTaskImportant
                };
                self.activity
                    .record(
                        &actor.id,
                        action,
                        "task",
                        &task.id,
                        &format!(
                            "{} \"{}\"",
                            if marking { "marked important" } else { "unmarked important" },
                            task.title
                        ),
                        None,
                        &task.workspace_id,
                    )
                    .await;

                let audit = AuditEntry::new(action.as_str(), AuditCategory::Task, "task", &task.id)
                    .target_name(&task.title)
                    .values(
                        Some(json!({ "is_important": task.is_important })),
                        Some(json!({ "is_important": marking })),
                    );
                let _ = self.audit.record(actor, origin, audit).await;

                if marking {
                    let updated = self.load(task_id).await?;
                    let snapshot = self.snapshot(&updated).await?;
                    self.dispatcher
                        .dispatch(&TaskEvent::MarkedImportant {
                            snapshot,
                            actor: actor.id.clone(),
                        })
                        .await;
                }
                return self.get_task(task_id).await;
            }
            debug!(task_id, attempt, "stale importance write, retrying");
        }
        Err(EngineError::Conflict {
            id: task_id.to_string(),
        })
    }

    // ─── Sub-entities ────────────────────────────────────────────────────────

    pub async fn add_subtask(
        &self,
        actor: &UserRow,
        task_id: &str,
        title: &str,
    ) -> EngineResult<SubtaskRow> {
        if title.trim().is_empty() {
            return Err(EngineError::validation("subtask title must not be empty"));
        }
        let task = self.load(task_id).await?;
        self.authorize(Operation::AddSubtask, actor, &task).await?;

        let subtask = self.store.add_subtask(&task.id, title).await?;
        self.activity
            .record(
                &actor.id,
                Action::AddedSubtask,
                "task",
                &task.id,
                &format!("added subtask \"{}\"", subtask.title),
                None,
                &task.workspace_id,
            )
            .await;
        Ok(subtask)
    }

    pub async fn toggle_subtask(
        &self,
        actor: &UserRow,
        task_id: &str,
        subtask_id: &str,
    ) -> EngineResult<SubtaskRow> {
        let task = self.load(task_id).await?;
        self.authorize(Operation::ToggleSubtask, actor, &task).await?;

        let subtask = self
            .store
            .toggle_subtask(&task.id, subtask_id)
            .await?
            .ok_or_else(|| EngineError::not_found("subtask", subtask_id))?;
        self.activity
            .record(
                &actor.id,
                Action::ToggledSubtask,
                "task",
                &task.id,
                &format!(
                    "subtask \"{}\" {}",
                    subtask.title,
                    if subtask.completed { "completed" } else { "reopened" }
                ),
                None,
                &task.workspace_id,
            )
            .await;
        Ok(subtask)
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn add_attachment(
        &self,
        actor: &UserRow,
        task_id: &str,
        file_name: &str,
        file_url: &str,
        file_type: &str,
        file_size: i64,
    ) -> EngineResult<AttachmentRow> {
        if file_name.trim().is_empty() || file_url.trim().is_empty() {
            return Err(EngineError::validation(
                "attachment needs a file name and url",
            ));
        }
        let task = self.load(task_id).await?;
        self.authorize(Operation::AddAttachment, actor, &task).await?;

        let attachment = self
            .store
            .add_attachment(&task.id, file_name, file_url, file_type, file_size, &actor.id)
            .await?;
        self.activity
            .record(
                &actor.id,
                Action::AddedAttachment,
                "task",
                &task.id,
                &format!("attached \"{}\"", attachment.file_name),
                None,
                &task.workspace_id,
            )
            .await;
        Ok(attachment)
    }

    pub async fn add_watcher(
        &self,
        actor: &UserRow,
        task_id: &str,
        user_id: &str,
    ) -> EngineResult<TaskView> {
        let task = self.load(task_id).await?;
        self.authorize(Operation::AddWatcher, actor, &task).await?;
        if self.users.get(user_id).await?.is_none() {
            return Err(EngineError::validation(format!(
                "watcher '{user_id}' is not a known user"
            )));
        }

        self.store.add_watcher(&task.id, user_id).await?;
        self.activity
            .record(
                &actor.id,
                Action::AddedWatcher,
                "task",
                &task.id,
                &format!("added watcher {user_id}"),
                None,
                &task.workspace_id,
            )
            .await;
        self.get_task(task_id).await
    }

    pub async fn remove_watcher(
        &self,
        actor: &UserRow,
        task_id: &str,
        user_id: &str,
    ) -> EngineResult<TaskView> {
        let task = self.load(task_id).await?;
        self.authorize(Operation::RemoveWatcher, actor, &task).await?;

        if self.store.remove_watcher(&task.id, user_id).await? {
            self.activity
                .record(
                    &actor.id,
                    Action::RemovedWatcher,
                    "task",
                    &task.id,
                    &format!("removed watcher {user_id}"),
                    None,
                    &task.workspace_id,
                )
                .await;
        }
        self.get_task(task_id).await
    }

    // ─── Comments / responses ────────────────────────────────────────────────

    /// Add a top-level comment. Empty bodies are allowed only when an
    /// attachment rides along. `@mentions` are resolved against the user
    /// directory and pulled into the fan-out.
    pub async fn add_comment(
        &self,
        actor: &UserRow,
        task_id: &str,
        body: &str,
        attachment_url: Option<&str>,
    ) -> EngineResult<CommentRow> {
        if body.trim().is_empty() && attachment_url.is_none() {
            return Err(EngineError::validation(
                "comment needs text or an attachment",
            ));
        }
        let task = self.load(task_id).await?;
        self.authorize(Operation::AddComment, actor, &task).await?;

        let comment = self
            .store
            .add_comment(&task.id, &actor.id, body, attachment_url, None)
            .await?;
        self.record_comment_activity(actor, &task, &comment).await;
        self.dispatch_comment(actor, &task, body).await?;
        Ok(comment)
    }

    /// Reply to an existing comment. Only assignees may reply, and only to
    /// comments authored by a manager-or-above.
    pub async fn reply_to_comment(
        &self,
        actor: &UserRow,
        task_id: &str,
        parent_id: &str,
        body: &str,
    ) -> EngineResult<CommentRow> {
        if body.trim().is_empty() {
            return Err(EngineError::validation("reply must not be empty"));
        }
        let task = self.load(task_id).await?;
        self.authorize(Operation::ReplyToComment, actor, &task).await?;

        let parent = self
            .store
            .get_comment(parent_id)
            .await?
            .filter(|c| c.task_id == task.id)
            .ok_or_else(|| EngineError::not_found("comment", parent_id))?;

        let author_is_manager = match self.users.get(&parent.author_id).await? {
            Some(author) => matches!(
                author.role(),
                policy::Role::Manager | policy::Role::Admin | policy::Role::SuperAdmin
            ),
            None => false,
        };
        if !author_is_manager {
            return Err(EngineError::forbidden(
                "replies are only allowed to comments authored by a manager or admin",
            ));
        }

        let comment = self
            .store
            .add_comment(&task.id, &actor.id, body, None, Some(parent_id))
            .await?;
        self.record_comment_activity(actor, &task, &comment).await;
        self.dispatch_comment(actor, &task, body).await?;
        Ok(comment)
    }

    pub async fn add_response(
        &self,
        actor: &UserRow,
        task_id: &str,
        body: &str,
    ) -> EngineResult<ResponseRow> {
        if body.trim().is_empty() {
            return Err(EngineError::validation("response must not be empty"));
        }
        let task = self.load(task_id).await?;
        self.authorize(Operation::AddResponse, actor, &task).await?;

        let response = self.store.add_response(&task.id, &actor.id, body).await?;
        self.activity
            .record(
                &actor.id,
                Action::AddedResponse,
                "task",
                &task.id,
                "added a response",
                None,
                &task.workspace_id,
            )
            .await;

        let snapshot = self.snapshot(&task).await?;
        self.dispatcher
            .dispatch(&TaskEvent::ResponseAdded {
                snapshot,
                responder: actor.id.clone(),
            })
            .await;
        Ok(response)
    }

    // ─── Deletion ────────────────────────────────────────────────────────────

    /// Hard-delete a task. Creator-only, within 24h of creation, reason
    /// mandatory. Both the refusals and the successful delete land in the
    /// audit log.
    pub async fn delete_task(
        &self,
        actor: &UserRow,
        task_id: &str,
        reason: &str,
        origin: &Origin,
    ) -> EngineResult<()> {
        let task = self.load(task_id).await?;

        if let Err(denied) = self.check_policy(Operation::DeleteTask, actor, &task).await? {
            let audit = AuditEntry::new("deleted_task", AuditCategory::Task, "task", &task.id)
                .target_name(&task.title)
                .failed(&denied.to_string());
            let _ = self.audit.record(actor, origin, audit).await;
            return Err(EngineError::Forbidden {
                reason: denied.to_string(),
            });
        }

        let elapsed = now_ts() - task.created_at;
        if elapsed > DELETE_WINDOW_SECS {
            let elapsed_hours = elapsed / 3600;
            let audit = AuditEntry::new("deleted_task", AuditCategory::Task, "task", &task.id)
                .target_name(&task.title)
                .failed(&format!("delete window expired ({elapsed_hours}h elapsed)"));
            let _ = self.audit.record(actor, origin, audit).await;
            return Err(EngineError::TimeWindowExpired { elapsed_hours });
        }

        if reason.trim().is_empty() {
            return Err(EngineError::validation("a deletion reason is required"));
        }

        let previous = serde_json::to_value(&task).unwrap_or_default();
        self.store.delete_task(&task.id).await?;

        // Written after the cascade so the entry survives it.
        self.activity
            .record(
                &actor.id,
                Action::DeletedTask,
                "task",
                &task.id,
                &format!("deleted task \"{}\": {}", task.title, reason.trim()),
                Some(json!({ "reason": reason.trim() })),
                &task.workspace_id,
            )
            .await;

        let audit = AuditEntry::new("deleted_task", AuditCategory::Task, "task", &task.id)
            .target_name(&task.title)
            .description(reason.trim())
            .values(Some(previous), None);
        let _ = self.audit.record(actor, origin, audit).await;

        Ok(())
    }

    // ─── Helpers ─────────────────────────────────────────────────────────────

    async fn load(&self, task_id: &str) -> EngineResult<TaskRow> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or_else(|| EngineError::not_found("task", task_id))
    }

    fn authorize_unbound(&self, op: Operation, actor: &UserRow) -> EngineResult<()> {
        policy::check(op, actor.role(), &Relationship::default())
            .map_err(|d| EngineError::Forbidden {
                reason: d.to_string(),
            })
    }

    async fn authorize(&self, op: Operation, actor: &UserRow, task: &TaskRow) -> EngineResult<()> {
        match self.check_policy(op, actor, task).await? {
            Ok(()) => Ok(()),
            Err(denied) => Err(EngineError::Forbidden {
                reason: denied.to_string(),
            }),
        }
    }

    /// Policy check that exposes the denial for callers which audit it.
    async fn check_policy(
        &self,
        op: Operation,
        actor: &UserRow,
        task: &TaskRow,
    ) -> EngineResult<Result<(), policy::PolicyDenial>> {
        let assignees = self.store.assignees(&task.id).await?;
        let rel = Relationship {
            is_creator: task.created_by == actor.id,
            is_assignee: assignees.contains(&actor.id),
            is_responsible_manager: task.responsible_manager.as_deref() == Some(actor.id.as_str()),
        };
        Ok(policy::check(op, actor.role(), &rel))
    }

    fn validate_priority(&self, priority: Option<&str>) -> EngineResult<()> {
        if let Some(p) = priority {
            TaskPriority::from_str(p)
                .ok_or_else(|| EngineError::validation(format!("unknown priority '{p}'")))?;
        }
        Ok(())
    }

    /// The responsible manager must exist and hold an elevated role. Checked
    /// on every write that sets the field, not at read time.
    async fn validate_responsible_manager(&self, manager: Option<&str>) -> EngineResult<()> {
        let Some(manager_id) = manager else {
            return Ok(());
        };
        let user = self
            .users
            .get(manager_id)
            .await?
            .ok_or_else(|| {
                EngineError::validation(format!("responsible manager '{manager_id}' is not a known user"))
            })?;
        if !user.role().can_be_responsible_manager() {
            return Err(EngineError::validation(format!(
                "responsible manager must hold a manager, admin or super_admin role (got {})",
                user.role
            )));
        }
        Ok(())
    }

    async fn snapshot(&self, task: &TaskRow) -> EngineResult<TaskSnapshot> {
        let assignees = self.store.assignees(&task.id).await?;
        let watchers = self.store.watchers(&task.id).await?;
        Ok(TaskSnapshot::capture(task, &assignees, &watchers))
    }

    async fn record_comment_activity(&self, actor: &UserRow, task: &TaskRow, comment: &CommentRow) {
        self.activity
            .record(
                &actor.id,
                Action::AddedComment,
                "task",
                &task.id,
                &format!("commented on \"{}\"", task.title),
                Some(json!({ "comment_id": comment.id })),
                &task.workspace_id,
            )
            .await;
    }

    async fn dispatch_comment(
        &self,
        actor: &UserRow,
        task: &TaskRow,
        body: &str,
    ) -> EngineResult<()> {
        let mut mentioned = BTreeSet::new();
        for token in extract_mention_tokens(body) {
            if let Some(user) = self.users.find_by_name_fragment(&token).await? {
                mentioned.insert(user.id);
            }
        }

        let excerpt: String = body.chars().take(EXCERPT_LEN).collect();
        let snapshot = self.snapshot(task).await?;
        self.dispatcher
            .dispatch(&TaskEvent::CommentAdded {
                snapshot,
                author: actor.id.clone(),
                mentioned,
                excerpt,
            })
            .await;
        Ok(())
    }
}

impl TaskEngine {
    /// Everything hangs off one pool; used by main and the integration tests.
    pub fn from_pool(pool: sqlx::SqlitePool, dispatcher: NotificationDispatcher) -> Self {
        Self::new(
            TaskStore::new(pool.clone()),
            UserDirectory::new(pool.clone()),
            ActivityRecorder::new(pool.clone()),
            AuditRecorder::new(pool),
            dispatcher,
        )
    }
}
