//! Mutation events and their recipient computation.
//!
//! `recipients(event)` is a pure function from the event (which embeds the
//! task snapshot taken at mutation time) to a recipient specification —
//! testable with no storage or transport. Role-wide specs are resolved
//! against the user directory by the dispatcher.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::policy::Role;
use crate::tasks::model::TaskRow;

/// The slice of a task the fan-out needs, captured at mutation time.
/// Concurrent mutations after the snapshot do not change who gets notified.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub created_by: String,
    pub responsible_manager: Option<String>,
    pub assignees: BTreeSet<String>,
    pub watchers: BTreeSet<String>,
    pub is_important: bool,
}

impl TaskSnapshot {
    pub fn capture(task: &TaskRow, assignees: &[String], watchers: &[String]) -> Self {
        Self {
            id: task.id.clone(),
            workspace_id: task.workspace_id.clone(),
            title: task.title.clone(),
            created_by: task.created_by.clone(),
            responsible_manager: task.responsible_manager.clone(),
            assignees: assignees.iter().cloned().collect(),
            watchers: watchers.iter().cloned().collect(),
            is_important: task.is_important,
        }
    }

    /// assignees ∪ responsible_manager
    fn core_circle(&self) -> BTreeSet<String> {
        let mut set = self.assignees.clone();
        if let Some(rm) = &self.responsible_manager {
            set.insert(rm.clone());
        }
        set
    }
}

/// Every mutation event that fans out. `actor` is the user who performed the
/// mutation and is excluded from the recipients unless a variant says
/// otherwise.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum TaskEvent {
    TaskCreated {
        snapshot: TaskSnapshot,
        actor: String,
    },
    /// Batch create: one event for the whole batch; `recipients` is the
    /// already-deduplicated union over all created tasks, and the
    /// notification references `first`, not each task.
    TaskBatchCreated {
        first: TaskSnapshot,
        count: usize,
        recipients: BTreeSet<String>,
        actor: String,
    },
    /// Only the users added by this edit — existing assignees are not
    /// re-notified.
    AssigneesAdded {
        snapshot: TaskSnapshot,
        newly_added: BTreeSet<String>,
        actor: String,
    },
    StatusChanged {
        snapshot: TaskSnapshot,
        from: String,
        to: String,
        actor: String,
    },
    DeadlineChanged {
        snapshot: TaskSnapshot,
        due_date: Option<i64>,
        actor: String,
    },
    CommentAdded {
        snapshot: TaskSnapshot,
        author: String,
        mentioned: BTreeSet<String>,
        excerpt: String,
    },
    MarkedImportant {
        snapshot: TaskSnapshot,
        actor: String,
    },
    ResponseAdded {
        snapshot: TaskSnapshot,
        responder: String,
    },
}

/// Who should receive an event, before directory resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecipientSet {
    /// Explicit user ids, actor already excluded.
    Users(BTreeSet<String>),
    /// Every user holding one of these roles, minus `except`.
    Roles {
        roles: Vec<Role>,
        except: String,
    },
}

/// Compute the recipient set for an event. Pure.
pub fn recipients(event: &TaskEvent) -> RecipientSet {
    match event {
        TaskEvent::TaskCreated { snapshot, actor } => {
            RecipientSet::Users(minus(snapshot.core_circle(), actor))
        }
        TaskEvent::TaskBatchCreated {
            recipients, actor, ..
        } => RecipientSet::Users(minus(recipients.clone(), actor)),
        TaskEvent::AssigneesAdded {
            newly_added, actor, ..
        } => RecipientSet::Users(minus(newly_added.clone(), actor)),
        TaskEvent::StatusChanged {
            snapshot, actor, ..
        } => {
            let mut set = snapshot.core_circle();
            set.extend(snapshot.watchers.iter().cloned());
            RecipientSet::Users(minus(set, actor))
        }
        TaskEvent::DeadlineChanged {
            snapshot, actor, ..
        } => RecipientSet::Users(minus(snapshot.core_circle(), actor)),
        TaskEvent::CommentAdded {
            snapshot,
            author,
            mentioned,
            ..
        } => {
            let mut set = snapshot.core_circle();
            set.extend(mentioned.iter().cloned());
            RecipientSet::Users(minus(set, author))
        }
        TaskEvent::MarkedImportant { actor, .. } => RecipientSet::Roles {
            roles: vec![Role::SuperAdmin],
            except: actor.clone(),
        },
        // Responses are manager-facing: creator and assignees are deliberately
        // NOT notified.
        TaskEvent::ResponseAdded { responder, .. } => RecipientSet::Roles {
            roles: vec![Role::Manager, Role::Admin, Role::SuperAdmin],
            except: responder.clone(),
        },
    }
}

/// Notification title and body for an event.
pub fn render(event: &TaskEvent) -> (String, String) {
    match event {
        TaskEvent::TaskCreated { snapshot, .. } => (
            "New task".to_string(),
            format!("You were added to task \"{}\"", snapshot.title),
        ),
        TaskEvent::TaskBatchCreated { first, count, .. } => (
            "New tasks".to_string(),
            format!("You were added to {count} new tasks, starting with \"{}\"", first.title),
        ),
        TaskEvent::AssigneesAdded { snapshot, .. } => (
            "Added to task".to_string(),
            format!("You were added to task \"{}\"", snapshot.title),
        ),
        TaskEvent::StatusChanged {
            snapshot, from, to, ..
        } => (
            "Task status changed".to_string(),
            format!("\"{}\" moved from {from} to {to}", snapshot.title),
        ),
        TaskEvent::DeadlineChanged {
            snapshot, due_date, ..
        } => (
            "Task deadline changed".to_string(),
            match due_date {
                Some(ts) => format!("\"{}\" is now due at {ts}", snapshot.title),
                None => format!("\"{}\" no longer has a due date", snapshot.title),
            },
        ),
        TaskEvent::CommentAdded {
            snapshot, excerpt, ..
        } => (
            "New comment".to_string(),
            format!("On \"{}\": {excerpt}", snapshot.title),
        ),
        TaskEvent::MarkedImportant { snapshot, .. } => (
            "Task marked important".to_string(),
            format!("\"{}\" was marked important", snapshot.title),
        ),
        TaskEvent::ResponseAdded { snapshot, .. } => (
            "New response".to_string(),
            format!("A response was added on \"{}\"", snapshot.title),
        ),
    }
}

/// Whether the event justifies the SMS channel. SMS is reserved for the
/// signals an off-desk recipient must not miss.
pub fn is_urgent(event: &TaskEvent) -> bool {
    match event {
        TaskEvent::StatusChanged { snapshot, to, .. } => {
            snapshot.is_important && (to == "done" || to == "cancelled")
        }
        TaskEvent::DeadlineChanged { snapshot, .. } => snapshot.is_important,
        _ => false,
    }
}

/// The task the notification links back to.
pub fn related(event: &TaskEvent) -> (&'static str, String) {
    let id = match event {
        TaskEvent::TaskCreated { snapshot, .. }
        | TaskEvent::AssigneesAdded { snapshot, .. }
        | TaskEvent::StatusChanged { snapshot, .. }
        | TaskEvent::DeadlineChanged { snapshot, .. }
        | TaskEvent::CommentAdded { snapshot, .. }
        | TaskEvent::MarkedImportant { snapshot, .. }
        | TaskEvent::ResponseAdded { snapshot, .. } => snapshot.id.clone(),
        TaskEvent::TaskBatchCreated { first, .. } => first.id.clone(),
    };
    ("task", id)
}

fn minus(mut set: BTreeSet<String>, actor: &str) -> BTreeSet<String> {
    set.remove(actor);
    set
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(assignees: &[&str], watchers: &[&str], rm: Option<&str>) -> TaskSnapshot {
        TaskSnapshot {
            id: "t1".to_string(),
            workspace_id: "w1".to_string(),
            title: "Ship it".to_string(),
            created_by: "creator".to_string(),
            responsible_manager: rm.map(String::from),
            assignees: assignees.iter().map(|s| s.to_string()).collect(),
            watchers: watchers.iter().map(|s| s.to_string()).collect(),
            is_important: false,
        }
    }

    fn users(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn created_notifies_circle_minus_creator() {
        let event = TaskEvent::TaskCreated {
            snapshot: snapshot(&["a", "creator"], &[], Some("rm")),
            actor: "creator".to_string(),
        };
        assert_eq!(recipients(&event), RecipientSet::Users(users(&["a", "rm"])));
    }

    #[test]
    fn assignee_diff_notifies_only_newly_added() {
        let event = TaskEvent::AssigneesAdded {
            snapshot: snapshot(&["b", "c", "d"], &[], None),
            newly_added: users(&["c", "d"]),
            actor: "editor".to_string(),
        };
        assert_eq!(recipients(&event), RecipientSet::Users(users(&["c", "d"])));
    }

    #[test]
    fn status_change_includes_watchers_excludes_actor() {
        let event = TaskEvent::StatusChanged {
            snapshot: snapshot(&["a"], &["w1", "w2"], Some("rm")),
            from: "todo".to_string(),
            to: "in_progress".to_string(),
            actor: "rm".to_string(),
        };
        assert_eq!(
            recipients(&event),
            RecipientSet::Users(users(&["a", "w1", "w2"]))
        );
    }

    #[test]
    fn comment_unions_mentions() {
        let event = TaskEvent::CommentAdded {
            snapshot: snapshot(&["a"], &[], Some("rm")),
            author: "a".to_string(),
            mentioned: users(&["m"]),
            excerpt: "hi".to_string(),
        };
        assert_eq!(recipients(&event), RecipientSet::Users(users(&["m", "rm"])));
    }

    #[test]
    fn important_goes_to_super_admins() {
        let event = TaskEvent::MarkedImportant {
            snapshot: snapshot(&["a"], &[], None),
            actor: "admin1".to_string(),
        };
        assert_eq!(
            recipients(&event),
            RecipientSet::Roles {
                roles: vec![Role::SuperAdmin],
                except: "admin1".to_string()
            }
        );
    }

    #[test]
    fn response_goes_to_manager_roles_not_circle() {
        let event = TaskEvent::ResponseAdded {
            snapshot: snapshot(&["a"], &[], Some("rm")),
            responder: "a".to_string(),
        };
        assert_eq!(
            recipients(&event),
            RecipientSet::Roles {
                roles: vec![Role::Manager, Role::Admin, Role::SuperAdmin],
                except: "a".to_string()
            }
        );
    }

    #[test]
    fn urgency_gates_on_importance_and_terminal_status() {
        let mut snap = snapshot(&[], &[], None);
        snap.is_important = true;
        let done = TaskEvent::StatusChanged {
            snapshot: snap.clone(),
            from: "in_progress".to_string(),
            to: "done".to_string(),
            actor: "x".to_string(),
        };
        assert!(is_urgent(&done));

        let moved = TaskEvent::StatusChanged {
            snapshot: snap.clone(),
            from: "todo".to_string(),
            to: "in_progress".to_string(),
            actor: "x".to_string(),
        };
        assert!(!is_urgent(&moved));

        snap.is_important = false;
        let unimportant_done = TaskEvent::StatusChanged {
            snapshot: snap,
            from: "in_progress".to_string(),
            to: "done".to_string(),
            actor: "x".to_string(),
        };
        assert!(!is_urgent(&unimportant_done));
    }
}
