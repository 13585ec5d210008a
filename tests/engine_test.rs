//! Integration tests for the Task Mutation Engine.
//!
//! Tests cover:
//! 1. completed_at ⟺ done invariant in both directions
//! 2. Responsible-manager gate on status changes
//! 3. Creator-only, time-boxed deletion
//! 4. Assignee-diff fan-out (only newly added notified)
//! 5. Batch create assignee union + deduplicated fan-out
//! 6. Importance flag round trip + super_admin fan-out
//! 7. Archive round trip produces two activity entries
//! 8. Comment/reply/response permission and fan-out rules
//! 9. Optimistic version guard at the store level

use std::sync::Arc;

use tempfile::TempDir;

use taskhub::activity::audit::{AuditRecorder, Origin};
use taskhub::activity::{ActivityQueryParams, ActivityRecorder};
use taskhub::error::EngineError;
use taskhub::notify::{ChannelPolicy, NotificationDispatcher};
use taskhub::policy::Role;
use taskhub::queue::DeliveryQueue;
use taskhub::storage::Storage;
use taskhub::tasks::model::{BatchItem, NewTask, NewTaskBatch, TaskStatus};
use taskhub::tasks::{TaskEngine, TaskStore};
use taskhub::users::{UserDirectory, UserRow};

// ─── Fixture ──────────────────────────────────────────────────────────────────

struct TestCtx {
    _dir: TempDir,
    pool: sqlx::SqlitePool,
    engine: Arc<TaskEngine>,
    store: TaskStore,
    users: UserDirectory,
    queue: DeliveryQueue,
    activity: ActivityRecorder,
    audit: AuditRecorder,
}

/// In-app channel only, so every recipient maps to exactly one delivery job.
async fn setup() -> TestCtx {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path()).await.expect("storage");
    let pool = storage.pool();
    let users = UserDirectory::new(pool.clone());
    let queue = DeliveryQueue::new(pool.clone());
    let dispatcher = NotificationDispatcher::new(
        users.clone(),
        queue.clone(),
        ChannelPolicy {
            email_enabled: false,
            sms_enabled: false,
        },
    );
    TestCtx {
        engine: Arc::new(TaskEngine::from_pool(pool.clone(), dispatcher)),
        store: TaskStore::new(pool.clone()),
        users: users.clone(),
        queue,
        activity: ActivityRecorder::new(pool.clone()),
        audit: AuditRecorder::new(pool.clone()),
        pool,
        _dir: dir,
    }
}

async fn seed_user(ctx: &TestCtx, id: &str, name: &str, role: Role) -> UserRow {
    ctx.users
        .sync_user(id, name, Some(&format!("{id}@example.com")), None, role)
        .await
        .expect("sync user")
}

fn new_task(assignees: &[&str], rm: Option<&str>) -> NewTask {
    NewTask {
        workspace_id: "ws1".to_string(),
        title: "Ship the release".to_string(),
        description: "".to_string(),
        priority: None,
        due_date: None,
        assignees: assignees.iter().map(|s| s.to_string()).collect(),
        responsible_manager: rm.map(String::from),
    }
}

/// Recipient ids of all queued delivery jobs, sorted.
async fn queued_recipients(ctx: &TestCtx) -> Vec<String> {
    let jobs = ctx.queue.list_jobs(None, 500).await.expect("list jobs");
    let mut ids: Vec<String> = jobs.into_iter().map(|j| j.recipient).collect();
    ids.sort();
    ids
}

async fn drain_queue(ctx: &TestCtx) {
    while let Some(job) = ctx.queue.claim_next().await.expect("claim") {
        ctx.queue.complete(&job.id).await.expect("complete");
    }
    ctx.queue.clean(-1).await.expect("clean");
}

async fn backdate_task(ctx: &TestCtx, task_id: &str, secs: i64) {
    sqlx::query("UPDATE tasks SET created_at = created_at - ? WHERE id = ?")
        .bind(secs)
        .bind(task_id)
        .execute(&ctx.pool)
        .await
        .expect("backdate");
}

// ─── 1. completed_at invariant ───────────────────────────────────────────────

#[tokio::test]
async fn completed_at_tracks_done_both_directions() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], Some("m1")))
        .await
        .expect("create");
    assert!(task.task.completed_at.is_none());

    let done = ctx
        .engine
        .update_status(&manager, &task.task.id, TaskStatus::Done)
        .await
        .expect("to done");
    assert_eq!(done.task.status, "done");
    assert!(done.task.completed_at.is_some(), "done must stamp completed_at");

    let reopened = ctx
        .engine
        .update_status(&manager, &task.task.id, TaskStatus::InProgress)
        .await
        .expect("reopen");
    assert_eq!(reopened.task.status, "in_progress");
    assert!(
        reopened.task.completed_at.is_none(),
        "leaving done must clear completed_at"
    );
}

// ─── 2. responsible-manager gate ─────────────────────────────────────────────

#[tokio::test]
async fn plain_manager_denied_until_responsible() {
    let ctx = setup().await;
    let admin = seed_user(&ctx, "a1", "Ada", Role::Admin).await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&admin, new_task(&[], None))
        .await
        .expect("create");

    let denied = ctx
        .engine
        .update_status(&manager, &task.task.id, TaskStatus::InProgress)
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    ctx.engine
        .set_responsible_manager(&admin, &task.task.id, Some("m1".to_string()))
        .await
        .expect("set rm");

    let ok = ctx
        .engine
        .update_status(&manager, &task.task.id, TaskStatus::InProgress)
        .await;
    assert!(ok.is_ok(), "responsible manager must pass: {ok:?}");
}

#[tokio::test]
async fn cancellation_requires_cancellation_rights() {
    let ctx = setup().await;
    let admin = seed_user(&ctx, "a1", "Ada", Role::Admin).await;
    let chief = seed_user(&ctx, "c1", "Cho", Role::ChiefManager).await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&admin, new_task(&[], None))
        .await
        .expect("create");

    let denied = ctx
        .engine
        .update_status(&manager, &task.task.id, TaskStatus::Cancelled)
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    let ok = ctx
        .engine
        .update_status(&chief, &task.task.id, TaskStatus::Cancelled)
        .await;
    assert!(ok.is_ok());
}

// ─── 3. deletion window ──────────────────────────────────────────────────────

#[tokio::test]
async fn delete_inside_window_succeeds() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");
    // 23h59m old.
    backdate_task(&ctx, &task.task.id, 24 * 3600 - 60).await;

    ctx.engine
        .delete_task(&manager, &task.task.id, "created by mistake", &Origin::default())
        .await
        .expect("delete inside window");
    assert!(matches!(
        ctx.engine.get_task(&task.task.id).await,
        Err(EngineError::NotFound { .. })
    ));
}

#[tokio::test]
async fn delete_outside_window_reports_elapsed_hours() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");
    // 24h01m old.
    backdate_task(&ctx, &task.task.id, 24 * 3600 + 60).await;

    let denied = ctx
        .engine
        .delete_task(&manager, &task.task.id, "too late", &Origin::default())
        .await;
    match denied {
        Err(EngineError::TimeWindowExpired { elapsed_hours }) => {
            assert!(elapsed_hours >= 24, "elapsed {elapsed_hours}h");
        }
        other => panic!("expected TimeWindowExpired, got {other:?}"),
    }

    // The refusal must be audited as failed.
    let entries = ctx
        .audit
        .query(&Default::default())
        .await
        .expect("audit query");
    assert!(entries.iter().any(|e| e.status == "failed"));
}

#[tokio::test]
async fn delete_by_non_creator_rejected_even_for_super_admin() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let root = seed_user(&ctx, "s1", "Sam", Role::SuperAdmin).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");

    let denied = ctx
        .engine
        .delete_task(&root, &task.task.id, "cleanup", &Origin::default())
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
    assert!(ctx.engine.get_task(&task.task.id).await.is_ok(), "no partial delete");
}

// ─── 4. assignee-diff fan-out ────────────────────────────────────────────────

#[tokio::test]
async fn assignee_update_notifies_exactly_newly_added() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    for id in ["a", "b", "c", "d"] {
        seed_user(&ctx, id, &format!("User {id}"), Role::Member).await;
    }
    let task = ctx
        .engine
        .create_task(&manager, new_task(&["a", "b"], None))
        .await
        .expect("create");
    drain_queue(&ctx).await;

    ctx.engine
        .update_assignees(
            &manager,
            &task.task.id,
            vec!["b".to_string(), "c".to_string(), "d".to_string()],
        )
        .await
        .expect("update assignees");

    assert_eq!(
        queued_recipients(&ctx).await,
        vec!["c".to_string(), "d".to_string()],
        "only newly added assignees are notified"
    );
}

#[tokio::test]
async fn resaving_same_assignees_notifies_nobody() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    seed_user(&ctx, "a", "User a", Role::Member).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&["a"], None))
        .await
        .expect("create");
    drain_queue(&ctx).await;

    ctx.engine
        .update_assignees(&manager, &task.task.id, vec!["a".to_string()])
        .await
        .expect("noop update");
    assert!(queued_recipients(&ctx).await.is_empty());
}

// ─── 5. batch create ─────────────────────────────────────────────────────────

#[tokio::test]
async fn batch_create_unions_assignees_and_dedupes_fanout() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    for id in ["u1", "u2", "u3"] {
        seed_user(&ctx, id, &format!("User {id}"), Role::Member).await;
    }

    let batch = NewTaskBatch {
        workspace_id: "ws1".to_string(),
        title: "X".to_string(),
        priority: None,
        responsible_manager: None,
        main_assignees: vec!["u1".to_string()],
        items: vec![
            BatchItem {
                description: "first".to_string(),
                due_date: None,
                assignees: vec!["u2".to_string()],
            },
            BatchItem {
                description: "second".to_string(),
                due_date: None,
                assignees: vec!["u3".to_string()],
            },
            BatchItem {
                description: "third".to_string(),
                due_date: None,
                assignees: vec![],
            },
        ],
    };

    let tasks = ctx
        .engine
        .create_task_batch(&manager, batch)
        .await
        .expect("batch create");
    assert_eq!(tasks.len(), 3);

    let sets: Vec<Vec<&str>> = tasks
        .iter()
        .map(|t| t.assignees.iter().map(String::as_str).collect())
        .collect();
    assert_eq!(sets[0], vec!["u1", "u2"]);
    assert_eq!(sets[1], vec!["u1", "u3"]);
    assert_eq!(sets[2], vec!["u1"]);

    // Exactly one notification per unique recipient, referencing the first task.
    let jobs = ctx.queue.list_jobs(None, 100).await.expect("jobs");
    assert_eq!(
        queued_recipients(&ctx).await,
        vec!["u1".to_string(), "u2".to_string(), "u3".to_string()],
        "one job per unique recipient, u1 not notified three times"
    );
    for job in &jobs {
        assert_eq!(job.related_id, tasks[0].task.id);
    }
}

#[tokio::test]
async fn batch_of_one_is_rejected() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let batch = NewTaskBatch {
        workspace_id: "ws1".to_string(),
        title: "X".to_string(),
        priority: None,
        responsible_manager: None,
        main_assignees: vec![],
        items: vec![BatchItem {
            description: "only".to_string(),
            due_date: None,
            assignees: vec![],
        }],
    };
    let denied = ctx.engine.create_task_batch(&manager, batch).await;
    assert!(matches!(denied, Err(EngineError::Validation { .. })));
}

// ─── 6. importance flag ──────────────────────────────────────────────────────

#[tokio::test]
async fn importance_round_trip_and_super_admin_fanout() {
    let ctx = setup().await;
    let admin = seed_user(&ctx, "a1", "Ada", Role::Admin).await;
    seed_user(&ctx, "s1", "Sam", Role::SuperAdmin).await;
    seed_user(&ctx, "s2", "Sasha", Role::SuperAdmin).await;
    let task = ctx
        .engine
        .create_task(&admin, new_task(&[], None))
        .await
        .expect("create");
    drain_queue(&ctx).await;

    let marked = ctx
        .engine
        .toggle_important(&admin, &task.task.id, &Origin::default())
        .await
        .expect("mark");
    assert!(marked.task.is_important);
    assert_eq!(marked.task.marked_important_by.as_deref(), Some("a1"));
    assert!(marked.task.marked_important_at.is_some());
    assert_eq!(
        queued_recipients(&ctx).await,
        vec!["s1".to_string(), "s2".to_string()],
        "every super_admin notified"
    );
    drain_queue(&ctx).await;

    let unmarked = ctx
        .engine
        .toggle_important(&admin, &task.task.id, &Origin::default())
        .await
        .expect("unmark");
    assert!(!unmarked.task.is_important);
    assert!(unmarked.task.marked_important_by.is_none());
    assert!(unmarked.task.marked_important_at.is_none());
    assert!(
        queued_recipients(&ctx).await.is_empty(),
        "unmarking sends no notification"
    );
}

#[tokio::test]
async fn mark_important_denied_for_manager() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");
    let denied = ctx
        .engine
        .toggle_important(&manager, &task.task.id, &Origin::default())
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
}

// ─── 7. archive round trip ───────────────────────────────────────────────────

#[tokio::test]
async fn archive_round_trip_restores_flag_and_logs_twice() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");
    assert!(!task.task.is_archived);

    let archived = ctx
        .engine
        .toggle_archive(&manager, &task.task.id)
        .await
        .expect("archive");
    assert!(archived.task.is_archived);

    let restored = ctx
        .engine
        .toggle_archive(&manager, &task.task.id)
        .await
        .expect("unarchive");
    assert!(!restored.task.is_archived);

    let entries = ctx
        .activity
        .query(&ActivityQueryParams {
            resource_id: Some(task.task.id.clone()),
            ..Default::default()
        })
        .await
        .expect("activity");
    let archive_entries: Vec<_> = entries
        .iter()
        .filter(|e| e.action == "archived_task" || e.action == "unarchived_task")
        .collect();
    assert_eq!(archive_entries.len(), 2, "two rows, not one");
}

// ─── 8. comments / replies / responses ───────────────────────────────────────

#[tokio::test]
async fn comment_rules_and_mention_fanout() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let assignee = seed_user(&ctx, "a", "Alex", Role::Member).await;
    let outsider = seed_user(&ctx, "o", "Omar", Role::Member).await;
    seed_user(&ctx, "anna", "Annabelle", Role::Member).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&["a"], None))
        .await
        .expect("create");
    drain_queue(&ctx).await;

    // Outsider member may not comment.
    let denied = ctx
        .engine
        .add_comment(&outsider, &task.task.id, "hi", None)
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    // Empty comment without attachment is invalid; with attachment it is fine.
    let invalid = ctx.engine.add_comment(&assignee, &task.task.id, "  ", None).await;
    assert!(matches!(invalid, Err(EngineError::Validation { .. })));
    ctx.engine
        .add_comment(&assignee, &task.task.id, "", Some("https://files/x.png"))
        .await
        .expect("attachment-only comment");
    drain_queue(&ctx).await;

    // Mention by name fragment, case-insensitive substring.
    ctx.engine
        .add_comment(&assignee, &task.task.id, "ping @ann please", None)
        .await
        .expect("mention comment");
    let recipients = queued_recipients(&ctx).await;
    assert!(
        recipients.contains(&"anna".to_string()),
        "substring mention must resolve, got {recipients:?}"
    );
    assert!(
        !recipients.contains(&"a".to_string()),
        "author is excluded from comment fan-out"
    );
}

#[tokio::test]
async fn reply_only_for_assignees_to_manager_comments() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let assignee = seed_user(&ctx, "a", "Alex", Role::Member).await;
    let admin = seed_user(&ctx, "ad", "Ada", Role::Admin).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&["a"], None))
        .await
        .expect("create");

    let manager_comment = ctx
        .engine
        .add_comment(&manager, &task.task.id, "status?", None)
        .await
        .expect("manager comment");
    let assignee_comment = ctx
        .engine
        .add_comment(&assignee, &task.task.id, "working on it", None)
        .await
        .expect("assignee comment");

    // Assignee replying to a manager comment: allowed.
    ctx.engine
        .reply_to_comment(&assignee, &task.task.id, &manager_comment.id, "on it")
        .await
        .expect("reply to manager");

    // Assignee replying to a member-authored comment: rejected.
    let denied = ctx
        .engine
        .reply_to_comment(&assignee, &task.task.id, &assignee_comment.id, "self reply")
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));

    // Non-assignee admin may not reply at all.
    let denied = ctx
        .engine
        .reply_to_comment(&admin, &task.task.id, &manager_comment.id, "hello")
        .await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
}

#[tokio::test]
async fn responses_fan_out_to_manager_roles_only() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    seed_user(&ctx, "m2", "Mei", Role::Manager).await;
    seed_user(&ctx, "ad", "Ada", Role::Admin).await;
    let assignee = seed_user(&ctx, "a", "Alex", Role::Member).await;
    seed_user(&ctx, "b", "Bo", Role::Member).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&["a", "b"], None))
        .await
        .expect("create");
    drain_queue(&ctx).await;

    ctx.engine
        .add_response(&assignee, &task.task.id, "weekly summary")
        .await
        .expect("response");

    assert_eq!(
        queued_recipients(&ctx).await,
        vec!["ad".to_string(), "m1".to_string(), "m2".to_string()],
        "responses are manager-facing: assignees and creator's circle excluded"
    );
}

// ─── 9. optimistic version guard ─────────────────────────────────────────────

#[tokio::test]
async fn stale_version_write_is_refused() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");
    let row = ctx
        .store
        .get_task(&task.task.id)
        .await
        .expect("get")
        .expect("exists");

    // A concurrent writer bumps the version first.
    assert!(ctx
        .store
        .set_title(&row.id, row.version, "first writer")
        .await
        .expect("first write"));

    // The stale snapshot is refused and the row keeps the first write.
    assert!(!ctx
        .store
        .set_title(&row.id, row.version, "second writer")
        .await
        .expect("stale write"));
    let current = ctx
        .store
        .get_task(&row.id)
        .await
        .expect("get")
        .expect("exists");
    assert_eq!(current.title, "first writer");
    assert_eq!(current.version, row.version + 1);
}

#[tokio::test]
async fn engine_retries_through_stale_snapshots() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], None))
        .await
        .expect("create");

    // Interleave two engine edits; both must land because the engine
    // re-reads on conflict.
    ctx.engine
        .update_title(&manager, &task.task.id, "retitled")
        .await
        .expect("title");
    ctx.engine
        .update_priority(&manager, &task.task.id, "high")
        .await
        .expect("priority");

    let view = ctx.engine.get_task(&task.task.id).await.expect("view");
    assert_eq!(view.task.title, "retitled");
    assert_eq!(view.task.priority, "high");
    assert_eq!(view.task.version, 2);
}

// ─── Misc validation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn member_responsible_manager_rejected_at_write_time() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    seed_user(&ctx, "mem", "Momo", Role::Member).await;

    let denied = ctx
        .engine
        .create_task(&manager, new_task(&[], Some("mem")))
        .await;
    assert!(matches!(denied, Err(EngineError::Validation { .. })));
}

#[tokio::test]
async fn member_cannot_create_tasks() {
    let ctx = setup().await;
    let member = seed_user(&ctx, "mem", "Momo", Role::Member).await;
    let denied = ctx.engine.create_task(&member, new_task(&[], None)).await;
    assert!(matches!(denied, Err(EngineError::Forbidden { .. })));
}

#[tokio::test]
async fn status_change_notifies_watchers() {
    let ctx = setup().await;
    let admin = seed_user(&ctx, "a1", "Ada", Role::Admin).await;
    seed_user(&ctx, "w", "Wes", Role::Member).await;
    let task = ctx
        .engine
        .create_task(&admin, new_task(&[], None))
        .await
        .expect("create");
    ctx.engine
        .add_watcher(&admin, &task.task.id, "w")
        .await
        .expect("watch");
    drain_queue(&ctx).await;

    ctx.engine
        .update_status(&admin, &task.task.id, TaskStatus::InProgress)
        .await
        .expect("status");
    assert_eq!(queued_recipients(&ctx).await, vec!["w".to_string()]);
}

#[tokio::test]
async fn activity_queries_newest_first_by_resource() {
    let ctx = setup().await;
    let manager = seed_user(&ctx, "m1", "Mara", Role::Manager).await;
    let task = ctx
        .engine
        .create_task(&manager, new_task(&[], Some("m1")))
        .await
        .expect("create");
    ctx.engine
        .update_status(&manager, &task.task.id, TaskStatus::InProgress)
        .await
        .expect("status");
    ctx.engine
        .update_title(&manager, &task.task.id, "renamed")
        .await
        .expect("title");

    let entries = ctx
        .activity
        .query(&ActivityQueryParams {
            resource_id: Some(task.task.id.clone()),
            ..Default::default()
        })
        .await
        .expect("query");
    assert_eq!(entries.len(), 3);
    assert!(entries.windows(2).all(|w| w[0].ts >= w[1].ts), "newest first");
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    for expected in ["created_task", "updated_task_status", "updated_task_title"] {
        assert!(actions.contains(&expected), "missing {expected} in {actions:?}");
    }
}
