//! Permission-matrix tests for the declarative policy table.
//!
//! One assertion per (operation, role, relationship) cell that the product
//! depends on. The table is the single source of truth for permissions, so
//! this file is deliberately exhaustive about the load-bearing rows.

use taskhub::policy::{check, Operation, Relationship, Role};

fn rel(creator: bool, assignee: bool, responsible: bool) -> Relationship {
    Relationship {
        is_creator: creator,
        is_assignee: assignee,
        is_responsible_manager: responsible,
    }
}

const NONE: Relationship = Relationship {
    is_creator: false,
    is_assignee: false,
    is_responsible_manager: false,
};

#[test]
fn create_matrix() {
    for op in [Operation::CreateTask, Operation::CreateTaskBatch] {
        assert!(check(op, Role::Manager, &NONE).is_ok());
        assert!(check(op, Role::Admin, &NONE).is_ok());
        assert!(check(op, Role::SuperAdmin, &NONE).is_ok());
        assert!(check(op, Role::ChiefManager, &NONE).is_err());
        assert!(check(op, Role::Member, &NONE).is_err());
    }
}

#[test]
fn status_matrix() {
    for op in [Operation::ChangeStatus, Operation::CancelTask] {
        assert!(check(op, Role::Admin, &NONE).is_ok());
        assert!(check(op, Role::SuperAdmin, &NONE).is_ok());
        assert!(check(op, Role::ChiefManager, &NONE).is_ok());
        // A plain manager is denied until they are the responsible manager.
        assert!(check(op, Role::Manager, &NONE).is_err());
        assert!(check(op, Role::Manager, &rel(false, false, true)).is_ok());
        // Relationship grants are role-independent.
        assert!(check(op, Role::Member, &rel(false, false, true)).is_ok());
        // Being creator or assignee does not help.
        assert!(check(op, Role::Manager, &rel(true, true, false)).is_err());
    }
}

#[test]
fn field_edit_matrix() {
    // priority/description: manager and up, but not chief_manager
    for op in [Operation::ChangePriority, Operation::ChangeDescription] {
        assert!(check(op, Role::Manager, &NONE).is_ok());
        assert!(check(op, Role::Admin, &NONE).is_ok());
        assert!(check(op, Role::SuperAdmin, &NONE).is_ok());
        assert!(check(op, Role::ChiefManager, &NONE).is_err());
        assert!(check(op, Role::Member, &NONE).is_err());
    }
    // title and due date additionally allow chief_manager
    for op in [Operation::ChangeTitle, Operation::ChangeDueDate] {
        assert!(check(op, Role::ChiefManager, &NONE).is_ok());
        assert!(check(op, Role::Manager, &NONE).is_ok());
        assert!(check(op, Role::Member, &NONE).is_err());
    }
}

#[test]
fn assignee_and_archive_matrix() {
    for op in [
        Operation::ChangeAssignees,
        Operation::SetResponsibleManager,
        Operation::ToggleArchive,
    ] {
        assert!(check(op, Role::Manager, &NONE).is_ok());
        assert!(check(op, Role::Admin, &NONE).is_ok());
        assert!(check(op, Role::SuperAdmin, &NONE).is_ok());
        assert!(check(op, Role::Member, &NONE).is_err());
        assert!(check(op, Role::ChiefManager, &NONE).is_err());
    }
}

#[test]
fn importance_matrix() {
    assert!(check(Operation::MarkImportant, Role::Admin, &NONE).is_ok());
    assert!(check(Operation::MarkImportant, Role::SuperAdmin, &NONE).is_ok());
    for role in [Role::Manager, Role::ChiefManager, Role::Member] {
        assert!(check(Operation::MarkImportant, role, &NONE).is_err());
    }
    // No relationship opens it either.
    assert!(check(Operation::MarkImportant, Role::Member, &rel(true, true, true)).is_err());
}

#[test]
fn deletion_matrix() {
    // Creator-only, regardless of role.
    assert!(check(Operation::DeleteTask, Role::Member, &rel(true, false, false)).is_ok());
    assert!(check(Operation::DeleteTask, Role::SuperAdmin, &NONE).is_err());
    assert!(check(Operation::DeleteTask, Role::Admin, &rel(false, true, true)).is_err());
    let denial = check(Operation::DeleteTask, Role::SuperAdmin, &NONE).unwrap_err();
    assert!(denial.to_string().contains("creator"), "{denial}");
}

#[test]
fn collaboration_matrix() {
    // Commenting: assignees of any role, or manager and up.
    assert!(check(Operation::AddComment, Role::Member, &rel(false, true, false)).is_ok());
    assert!(check(Operation::AddComment, Role::Manager, &NONE).is_ok());
    assert!(check(Operation::AddComment, Role::Member, &NONE).is_err());

    // Replying: assignees only — role is irrelevant.
    assert!(check(Operation::ReplyToComment, Role::Member, &rel(false, true, false)).is_ok());
    assert!(check(Operation::ReplyToComment, Role::SuperAdmin, &NONE).is_err());

    // Responses mirror commenting.
    assert!(check(Operation::AddResponse, Role::Member, &rel(false, true, false)).is_ok());
    assert!(check(Operation::AddResponse, Role::Manager, &NONE).is_ok());
    assert!(check(Operation::AddResponse, Role::Member, &NONE).is_err());
}

#[test]
fn sub_entity_matrix() {
    for op in [
        Operation::AddSubtask,
        Operation::ToggleSubtask,
        Operation::AddAttachment,
        Operation::AddWatcher,
        Operation::RemoveWatcher,
    ] {
        assert!(check(op, Role::Manager, &NONE).is_ok(), "{op} for manager");
        assert!(
            check(op, Role::Member, &rel(false, true, false)).is_ok(),
            "{op} for assignee"
        );
        assert!(check(op, Role::Member, &NONE).is_err(), "{op} for outsider");
    }
}

#[test]
fn denials_carry_readable_reasons() {
    let denial = check(Operation::ChangeStatus, Role::Manager, &NONE).unwrap_err();
    let reason = denial.to_string();
    assert!(reason.contains("manager"), "{reason}");
    assert!(reason.contains("change_status"), "{reason}");
}
