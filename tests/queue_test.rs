//! Integration tests for the delivery queue.
//!
//! Tests cover:
//! 1. Enqueue → claim → complete lifecycle
//! 2. Atomic claim ordering (FIFO) and delayed gating
//! 3. Failure bookkeeping: backoff reschedule, terminal failure
//! 4. Operator controls: pause/resume, retry, remove, clean
//! 5. Sender integration: in-app terminal store, failing sender path

use anyhow::anyhow;
use async_trait::async_trait;
use tempfile::TempDir;

use taskhub::notify::channel::{ChannelSender, InAppSender};
use taskhub::notify::NotificationFeed;
use taskhub::queue::{Channel, DeliveryQueue, NewJob, DEFAULT_MAX_ATTEMPTS};
use taskhub::storage::Storage;

async fn test_queue() -> (DeliveryQueue, sqlx::SqlitePool, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let storage = Storage::new(dir.path()).await.expect("storage");
    let pool = storage.pool();
    (DeliveryQueue::new(pool.clone()), pool, dir)
}

fn job_for(recipient: &str) -> NewJob {
    NewJob {
        channel: Channel::InApp,
        recipient: recipient.to_string(),
        recipient_address: recipient.to_string(),
        title: "Task update".to_string(),
        body: "something changed".to_string(),
        related_type: "task".to_string(),
        related_id: "t1".to_string(),
    }
}

// ─── 1. lifecycle ────────────────────────────────────────────────────────────

#[tokio::test]
async fn enqueue_claim_complete() {
    let (queue, _pool, _dir) = test_queue().await;
    let job = queue.enqueue(job_for("u1")).await.expect("enqueue");
    assert_eq!(job.status, "waiting");
    assert_eq!(job.attempts, 0);
    assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);

    let claimed = queue.claim_next().await.expect("claim").expect("some job");
    assert_eq!(claimed.id, job.id);
    assert_eq!(claimed.status, "active");

    // Claimed means gone from the runnable pool.
    assert!(queue.claim_next().await.expect("claim again").is_none());

    queue.complete(&claimed.id).await.expect("complete");
    let done = queue.get_job(&claimed.id).await.expect("get").expect("job");
    assert_eq!(done.status, "completed");
    assert!(done.completed_at.is_some());

    let stats = queue.stats().await.expect("stats");
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.waiting, 0);
}

// ─── 2. ordering / gating ────────────────────────────────────────────────────

#[tokio::test]
async fn claims_oldest_first() {
    let (queue, pool, _dir) = test_queue().await;
    let first = queue.enqueue(job_for("u1")).await.expect("enqueue");
    let second = queue.enqueue(job_for("u2")).await.expect("enqueue");
    // Force distinct created_at even within one second.
    sqlx::query("UPDATE delivery_jobs SET created_at = created_at - 5 WHERE id = ?")
        .bind(&first.id)
        .execute(&pool)
        .await
        .expect("backdate");

    let a = queue.claim_next().await.expect("claim").expect("job");
    let b = queue.claim_next().await.expect("claim").expect("job");
    assert_eq!(a.id, first.id);
    assert_eq!(b.id, second.id);
}

#[tokio::test]
async fn delayed_job_waits_for_not_before() {
    let (queue, pool, _dir) = test_queue().await;
    let job = queue.enqueue(job_for("u1")).await.expect("enqueue");
    sqlx::query("UPDATE delivery_jobs SET status = 'delayed', not_before = ? WHERE id = ?")
        .bind(taskhub::storage::now_ts() + 3600)
        .bind(&job.id)
        .execute(&pool)
        .await
        .expect("delay");

    assert!(queue.claim_next().await.expect("claim").is_none());

    sqlx::query("UPDATE delivery_jobs SET not_before = 0 WHERE id = ?")
        .bind(&job.id)
        .execute(&pool)
        .await
        .expect("ripen");
    assert!(queue.claim_next().await.expect("claim").is_some());
}

// ─── 3. failure bookkeeping ──────────────────────────────────────────────────

#[tokio::test]
async fn failure_reschedules_with_backoff_then_fails_terminally() {
    let (queue, pool, _dir) = test_queue().await;
    queue.enqueue(job_for("u1")).await.expect("enqueue");

    for attempt in 1..DEFAULT_MAX_ATTEMPTS {
        let job = queue.claim_next().await.expect("claim").expect("job");
        queue.record_failure(&job, "provider 500").await.expect("fail");
        let row = queue.get_job(&job.id).await.expect("get").expect("job");
        assert_eq!(row.status, "delayed", "attempt {attempt} reschedules");
        assert_eq!(row.attempts, attempt);
        assert!(
            row.not_before > taskhub::storage::now_ts(),
            "backoff pushes not_before into the future"
        );
        assert_eq!(row.last_error.as_deref(), Some("provider 500"));

        // Open the backoff gate so the next claim can happen immediately.
        sqlx::query("UPDATE delivery_jobs SET not_before = 0 WHERE id = ?")
            .bind(&job.id)
            .execute(&pool)
            .await
            .expect("ripen");
    }

    let job = queue.claim_next().await.expect("claim").expect("job");
    queue.record_failure(&job, "provider 500").await.expect("fail");
    let row = queue.get_job(&job.id).await.expect("get").expect("job");
    assert_eq!(row.status, "failed", "attempt budget exhausted");
    assert_eq!(row.attempts, DEFAULT_MAX_ATTEMPTS);

    // Terminal failure is not claimable.
    assert!(queue.claim_next().await.expect("claim").is_none());
}

// ─── 4. operator controls ────────────────────────────────────────────────────

#[tokio::test]
async fn pause_stops_claims_resume_drains() {
    let (queue, _pool, _dir) = test_queue().await;
    queue.enqueue(job_for("u1")).await.expect("enqueue");

    queue.pause().await.expect("pause");
    assert!(queue.stats().await.expect("stats").paused);
    assert!(
        queue.claim_next().await.expect("claim").is_none(),
        "paused queue claims nothing"
    );
    // The job is still there.
    assert_eq!(queue.stats().await.expect("stats").waiting, 1);

    queue.resume().await.expect("resume");
    assert!(queue.claim_next().await.expect("claim").is_some());
}

#[tokio::test]
async fn retry_resets_failed_jobs_only() {
    let (queue, pool, _dir) = test_queue().await;
    let job = queue.enqueue(job_for("u1")).await.expect("enqueue");

    assert!(
        !queue.retry_job(&job.id).await.expect("retry waiting"),
        "waiting job is not retryable"
    );

    sqlx::query("UPDATE delivery_jobs SET status = 'failed', attempts = 5, last_error = 'x' WHERE id = ?")
        .bind(&job.id)
        .execute(&pool)
        .await
        .expect("force fail");

    assert!(queue.retry_job(&job.id).await.expect("retry failed"));
    let row = queue.get_job(&job.id).await.expect("get").expect("job");
    assert_eq!(row.status, "waiting");
    assert_eq!(row.attempts, 0);
    assert!(row.last_error.is_none());
}

#[tokio::test]
async fn remove_only_touches_unstarted_jobs() {
    let (queue, pool, _dir) = test_queue().await;
    let waiting = queue.enqueue(job_for("u1")).await.expect("enqueue");
    let active = queue.enqueue(job_for("u2")).await.expect("enqueue");
    sqlx::query("UPDATE delivery_jobs SET status = 'active' WHERE id = ?")
        .bind(&active.id)
        .execute(&pool)
        .await
        .expect("activate");

    assert!(queue.remove_job(&waiting.id).await.expect("remove waiting"));
    assert!(
        !queue.remove_job(&active.id).await.expect("remove active"),
        "in-flight dispatch has no cancellation"
    );
}

#[tokio::test]
async fn clean_removes_old_terminal_jobs() {
    let (queue, pool, _dir) = test_queue().await;
    let done = queue.enqueue(job_for("u1")).await.expect("enqueue");
    let fresh = queue.enqueue(job_for("u2")).await.expect("enqueue");
    sqlx::query(
        "UPDATE delivery_jobs SET status = 'completed', updated_at = updated_at - 7200 WHERE id = ?",
    )
    .bind(&done.id)
    .execute(&pool)
    .await
    .expect("age");

    let removed = queue.clean(3600).await.expect("clean");
    assert_eq!(removed, 1);
    assert!(queue.get_job(&done.id).await.expect("get").is_none());
    assert!(
        queue.get_job(&fresh.id).await.expect("get").is_some(),
        "non-terminal jobs survive clean"
    );
}

// ─── 5. sender integration ───────────────────────────────────────────────────

#[tokio::test]
async fn in_app_sender_lands_in_feed() {
    let (queue, pool, _dir) = test_queue().await;
    queue.enqueue(job_for("u1")).await.expect("enqueue");

    let sender = InAppSender::new(pool.clone());
    let job = queue.claim_next().await.expect("claim").expect("job");
    sender.send(&job).await.expect("send");
    queue.complete(&job.id).await.expect("complete");

    let feed = NotificationFeed::new(pool);
    let notifications = feed.list("u1", 10).await.expect("list");
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].title, "Task update");
    assert!(!notifications[0].is_read);
    assert_eq!(feed.unread_count("u1").await.expect("unread"), 1);

    assert!(feed.mark_read(&notifications[0].id).await.expect("mark"));
    assert_eq!(feed.unread_count("u1").await.expect("unread"), 0);
}

struct FailingSender;

#[async_trait]
impl ChannelSender for FailingSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, _job: &taskhub::queue::DeliveryJobRow) -> anyhow::Result<()> {
        Err(anyhow!("smtp timeout"))
    }
}

#[tokio::test]
async fn failing_sender_feeds_failure_bookkeeping() {
    let (queue, _pool, _dir) = test_queue().await;
    queue
        .enqueue(NewJob {
            channel: Channel::Email,
            ..job_for("u1")
        })
        .await
        .expect("enqueue");

    let sender = FailingSender;
    let job = queue.claim_next().await.expect("claim").expect("job");
    let err = sender.send(&job).await.expect_err("sender fails");
    queue.record_failure(&job, &err.to_string()).await.expect("record");

    let row = queue.get_job(&job.id).await.expect("get").expect("job");
    assert_eq!(row.status, "delayed");
    assert_eq!(row.last_error.as_deref(), Some("smtp timeout"));
}
