// SPDX-License-Identifier: MIT
//! Durable at-least-once delivery queue.
//!
//! Every notification — in-app, email, and SMS alike — becomes one
//! `delivery_jobs` row per (recipient, channel). Worker loops (see
//! [`worker`]) claim jobs atomically, run the channel sender, and either
//! complete the job or reschedule it with exponential backoff until the
//! attempt budget runs out. Operators can pause the whole queue (no new
//! claims, nothing lost), resume it, retry failed jobs, remove jobs that have
//! not started, and clean old terminal jobs.

pub mod backoff;
pub mod worker;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::storage::now_ts;
use crate::tasks::model::new_id;

// ─── Job states ──────────────────────────────────────────────────────────────

pub const STATUS_WAITING: &str = "waiting";
pub const STATUS_ACTIVE: &str = "active";
pub const STATUS_COMPLETED: &str = "completed";
pub const STATUS_FAILED: &str = "failed";
pub const STATUS_DELAYED: &str = "delayed";

/// Default attempt budget per job.
pub const DEFAULT_MAX_ATTEMPTS: i64 = 5;

// ─── Types ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    InApp,
    Email,
    Sms,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::InApp => "in_app",
            Channel::Email => "email",
            Channel::Sms => "sms",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "in_app" => Some(Channel::InApp),
            "email" => Some(Channel::Email),
            "sms" => Some(Channel::Sms),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct DeliveryJobRow {
    pub id: String,
    pub channel: String,
    pub recipient: String,
    pub recipient_address: String,
    pub title: String,
    pub body: String,
    pub related_type: String,
    pub related_id: String,
    pub status: String,
    pub attempts: i64,
    pub max_attempts: i64,
    pub not_before: i64,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct NewJob {
    pub channel: Channel,
    pub recipient: String,
    pub recipient_address: String,
    pub title: String,
    pub body: String,
    pub related_type: String,
    pub related_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub paused: bool,
    pub waiting: i64,
    pub active: i64,
    pub completed: i64,
    pub failed: i64,
    pub delayed: i64,
}

// ─── Queue ───────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct DeliveryQueue {
    pool: SqlitePool,
    backoff: backoff::BackoffConfig,
}

impl DeliveryQueue {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            backoff: backoff::BackoffConfig::default(),
        }
    }

    pub fn with_backoff(pool: SqlitePool, backoff: backoff::BackoffConfig) -> Self {
        Self { pool, backoff }
    }

    // ─── Producer side ───────────────────────────────────────────────────────

    pub async fn enqueue(&self, job: NewJob) -> Result<DeliveryJobRow> {
        let id = new_id();
        let now = now_ts();
        sqlx::query(
            "INSERT INTO delivery_jobs
             (id, channel, recipient, recipient_address, title, body,
              related_type, related_id, status, max_attempts, not_before,
              created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, 'waiting', ?, 0, ?, ?)",
        )
        .bind(&id)
        .bind(job.channel.as_str())
        .bind(&job.recipient)
        .bind(&job.recipient_address)
        .bind(&job.title)
        .bind(&job.body)
        .bind(&job.related_type)
        .bind(&job.related_id)
        .bind(DEFAULT_MAX_ATTEMPTS)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.get_job(&id)
            .await?
            .ok_or_else(|| anyhow!("job not found after enqueue"))
    }

    pub async fn get_job(&self, id: &str) -> Result<Option<DeliveryJobRow>> {
        Ok(sqlx::query_as("SELECT * FROM delivery_jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    // ─── Consumer side ───────────────────────────────────────────────────────

    /// Atomically claim the oldest runnable job, or `None` if the queue is
    /// paused or empty. The single conditional UPDATE is the claim — two
    /// workers can never both get the same job.
    pub async fn claim_next(&self) -> Result<Option<DeliveryJobRow>> {
        if self.is_paused().await? {
            return Ok(None);
        }
        let now = now_ts();
        let row: Option<DeliveryJobRow> = sqlx::query_as(
            "UPDATE delivery_jobs
             SET status = 'active', updated_at = ?
             WHERE id = (
                 SELECT id FROM delivery_jobs
                 WHERE status IN ('waiting', 'delayed') AND not_before <= ?
                 ORDER BY created_at
                 LIMIT 1
             )
             RETURNING *",
        )
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn complete(&self, id: &str) -> Result<()> {
        let now = now_ts();
        sqlx::query(
            "UPDATE delivery_jobs
             SET status = 'completed', completed_at = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Record a failed attempt: reschedule with backoff while the budget
    /// lasts, otherwise mark the job failed for operator inspection.
    pub async fn record_failure(&self, job: &DeliveryJobRow, error: &str) -> Result<()> {
        let attempts = job.attempts + 1;
        let now = now_ts();
        if attempts >= job.max_attempts {
            sqlx::query(
                "UPDATE delivery_jobs
                 SET status = 'failed', attempts = ?, last_error = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(attempts)
            .bind(error)
            .bind(now)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        } else {
            let delay = backoff::next_backoff(job.attempts as u32, &self.backoff);
            sqlx::query(
                "UPDATE delivery_jobs
                 SET status = 'delayed', attempts = ?, last_error = ?, not_before = ?, updated_at = ?
                 WHERE id = ?",
            )
            .bind(attempts)
            .bind(error)
            .bind(now + delay.as_secs() as i64)
            .bind(now)
            .bind(&job.id)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    // ─── Operator controls ───────────────────────────────────────────────────

    pub async fn is_paused(&self) -> Result<bool> {
        let (paused,): (bool,) = sqlx::query_as("SELECT paused FROM queue_state WHERE id = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(paused)
    }

    pub async fn pause(&self) -> Result<()> {
        sqlx::query("UPDATE queue_state SET paused = 1 WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        sqlx::query("UPDATE queue_state SET paused = 0 WHERE id = 1")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Put a failed job back in line with a fresh attempt budget.
    pub async fn retry_job(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "UPDATE delivery_jobs
             SET status = 'waiting', attempts = 0, not_before = 0, last_error = NULL, updated_at = ?
             WHERE id = ? AND status = 'failed'",
        )
        .bind(now_ts())
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Remove a job that has not started (waiting or delayed). Active and
    /// terminal jobs are untouchable — dispatch has no cancellation.
    pub async fn remove_job(&self, id: &str) -> Result<bool> {
        let affected = sqlx::query(
            "DELETE FROM delivery_jobs WHERE id = ? AND status IN ('waiting', 'delayed')",
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected > 0)
    }

    /// Delete terminal jobs (completed/failed) older than `older_than_secs`.
    pub async fn clean(&self, older_than_secs: i64) -> Result<u64> {
        let cutoff = now_ts() - older_than_secs;
        let affected = sqlx::query(
            "DELETE FROM delivery_jobs
             WHERE status IN ('completed', 'failed') AND updated_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?
        .rows_affected();
        Ok(affected)
    }

    pub async fn stats(&self) -> Result<QueueStats> {
        let mut stats = QueueStats {
            paused: self.is_paused().await?,
            waiting: 0,
            active: 0,
            completed: 0,
            failed: 0,
            delayed: 0,
        };
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM delivery_jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        for (status, count) in rows {
            match status.as_str() {
                STATUS_WAITING => stats.waiting = count,
                STATUS_ACTIVE => stats.active = count,
                STATUS_COMPLETED => stats.completed = count,
                STATUS_FAILED => stats.failed = count,
                STATUS_DELAYED => stats.delayed = count,
                _ => {}
            }
        }
        Ok(stats)
    }

    pub async fn list_jobs(
        &self,
        status: Option<&str>,
        limit: i64,
    ) -> Result<Vec<DeliveryJobRow>> {
        let rows = if let Some(status) = status {
            sqlx::query_as(
                "SELECT * FROM delivery_jobs WHERE status = ? ORDER BY created_at DESC LIMIT ?",
            )
            .bind(status)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as("SELECT * FROM delivery_jobs ORDER BY created_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
        };
        Ok(rows)
    }
}
