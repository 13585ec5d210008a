//! The declarative permission table.
//!
//! One [`Rule`] per operation: the role set that may always perform it, plus
//! the task relationships that grant it regardless of role. [`check`] is the
//! single entry point; there is deliberately no other way to answer a
//! permission question.

use super::{Operation, PolicyDenial, Relationship, Role};

/// Permission rule for one operation.
pub struct Rule {
    pub op: Operation,
    /// Roles that may always perform the operation.
    pub roles: &'static [Role],
    /// Relationship grants, independent of role.
    pub creator: bool,
    pub assignee: bool,
    pub responsible_manager: bool,
    /// Hint appended to the denial reason.
    pub hint: &'static str,
}

use Role::{Admin, ChiefManager, Manager, SuperAdmin};

/// The whole policy, one row per operation.
///
/// Deletion grants no role at all — not even super_admin. Only the creator
/// relationship opens it, and the engine separately enforces the 24h window.
pub const RULES: &[Rule] = &[
    Rule {
        op: Operation::CreateTask,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::CreateTaskBatch,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ChangeStatus,
        roles: &[ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: true,
        hint: " (only the responsible manager may change status)",
    },
    Rule {
        op: Operation::CancelTask,
        roles: &[ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: true,
        hint: " (cancellation requires cancellation rights)",
    },
    Rule {
        op: Operation::ChangePriority,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ChangeTitle,
        roles: &[Manager, ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ChangeDescription,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ChangeDueDate,
        roles: &[Manager, ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ChangeAssignees,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::SetResponsibleManager,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ToggleArchive,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::MarkImportant,
        roles: &[Admin, SuperAdmin],
        creator: false,
        assignee: false,
        responsible_manager: false,
        hint: " (importance is an admin flag)",
    },
    // Assignees work the task, so sub-entity edits are open to them.
    Rule {
        op: Operation::AddSubtask,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::ToggleSubtask,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::AddAttachment,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::AddWatcher,
        roles: &[Manager, ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::RemoveWatcher,
        roles: &[Manager, ChiefManager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::AddComment,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: " (commenting is for assignees and managers)",
    },
    // Only an assignee may reply; the engine additionally requires the parent
    // comment to be authored by admin/manager.
    Rule {
        op: Operation::ReplyToComment,
        roles: &[],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: " (only assignees may reply to comments)",
    },
    Rule {
        op: Operation::AddResponse,
        roles: &[Manager, Admin, SuperAdmin],
        creator: false,
        assignee: true,
        responsible_manager: false,
        hint: "",
    },
    Rule {
        op: Operation::DeleteTask,
        roles: &[],
        creator: true,
        assignee: false,
        responsible_manager: false,
        hint: " (only the creator may delete a task)",
    },
];

/// Check whether `role` with `rel` to the task may perform `op`.
///
/// Returns `Ok(())` when permitted, or `Err(PolicyDenial)` carrying the
/// human-readable reason when denied.
pub fn check(op: Operation, role: Role, rel: &Relationship) -> Result<(), PolicyDenial> {
    for rule in RULES {
        if rule.op != op {
            continue;
        }
        if rule.roles.contains(&role)
            || (rule.creator && rel.is_creator)
            || (rule.assignee && rel.is_assignee)
            || (rule.responsible_manager && rel.is_responsible_manager)
        {
            return Ok(());
        }
        return Err(PolicyDenial {
            role,
            operation: op,
            hint: rule.hint.to_string(),
        });
    }

    // Operation not in table (shouldn't happen) — deny.
    Err(PolicyDenial {
        role,
        operation: op,
        hint: String::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_rel() -> Relationship {
        Relationship::default()
    }

    #[test]
    fn manager_can_create_task() {
        assert!(check(Operation::CreateTask, Role::Manager, &no_rel()).is_ok());
    }

    #[test]
    fn member_cannot_create_task() {
        let denied = check(Operation::CreateTask, Role::Member, &no_rel());
        assert!(denied.is_err());
    }

    #[test]
    fn plain_manager_cannot_change_status() {
        let denied = check(Operation::ChangeStatus, Role::Manager, &no_rel());
        assert!(denied.is_err());
        let reason = denied.unwrap_err().to_string();
        assert!(reason.contains("responsible manager"), "reason: {reason}");
    }

    #[test]
    fn responsible_manager_can_change_status() {
        let rel = Relationship {
            is_responsible_manager: true,
            ..Default::default()
        };
        assert!(check(Operation::ChangeStatus, Role::Manager, &rel).is_ok());
    }

    #[test]
    fn chief_manager_can_change_status_without_relationship() {
        assert!(check(Operation::ChangeStatus, Role::ChiefManager, &no_rel()).is_ok());
    }

    #[test]
    fn chief_manager_can_edit_title_but_not_description() {
        assert!(check(Operation::ChangeTitle, Role::ChiefManager, &no_rel()).is_ok());
        assert!(check(Operation::ChangeDescription, Role::ChiefManager, &no_rel()).is_err());
    }

    #[test]
    fn mark_important_is_admin_only() {
        assert!(check(Operation::MarkImportant, Role::Admin, &no_rel()).is_ok());
        assert!(check(Operation::MarkImportant, Role::SuperAdmin, &no_rel()).is_ok());
        assert!(check(Operation::MarkImportant, Role::Manager, &no_rel()).is_err());
        assert!(check(Operation::MarkImportant, Role::ChiefManager, &no_rel()).is_err());
    }

    #[test]
    fn super_admin_cannot_delete_without_creator_relationship() {
        assert!(check(Operation::DeleteTask, Role::SuperAdmin, &no_rel()).is_err());
    }

    #[test]
    fn creator_may_delete_regardless_of_role() {
        let rel = Relationship {
            is_creator: true,
            ..Default::default()
        };
        assert!(check(Operation::DeleteTask, Role::Member, &rel).is_ok());
    }

    #[test]
    fn assignee_member_can_comment() {
        let rel = Relationship {
            is_assignee: true,
            ..Default::default()
        };
        assert!(check(Operation::AddComment, Role::Member, &rel).is_ok());
        assert!(check(Operation::AddComment, Role::Member, &no_rel()).is_err());
    }

    #[test]
    fn reply_is_assignee_only() {
        let rel = Relationship {
            is_assignee: true,
            ..Default::default()
        };
        assert!(check(Operation::ReplyToComment, Role::Member, &rel).is_ok());
        // Even an admin may not reply unless assigned.
        assert!(check(Operation::ReplyToComment, Role::Admin, &no_rel()).is_err());
    }

    #[test]
    fn unknown_role_denied_everything() {
        for rule in RULES {
            if rule.creator || rule.assignee || rule.responsible_manager {
                continue;
            }
            assert!(
                check(rule.op, Role::Unknown, &no_rel()).is_err(),
                "unknown role slipped through {}",
                rule.op
            );
        }
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [
            Role::Member,
            Role::Manager,
            Role::ChiefManager,
            Role::Admin,
            Role::SuperAdmin,
        ] {
            assert_eq!(Role::from_str(role.as_str()), role);
        }
        assert_eq!(Role::from_str("intern_xyz"), Role::Unknown);
    }
}
