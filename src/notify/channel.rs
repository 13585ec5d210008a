//! Channel senders — the pluggable delivery strategies behind the queue.
//!
//! One [`ChannelSender`] per channel. The in-app sender terminates locally in
//! the `notifications` table; email and SMS POST to provider HTTP APIs. All
//! three are invoked only by delivery workers, never by mutation handlers.

use anyhow::{anyhow, Context as _, Result};
use async_trait::async_trait;
use serde_json::json;
use sqlx::SqlitePool;

use crate::queue::{Channel, DeliveryJobRow};
use crate::storage::now_ts;
use crate::tasks::model::new_id;

#[async_trait]
pub trait ChannelSender: Send + Sync {
    fn channel(&self) -> Channel;
    async fn send(&self, job: &DeliveryJobRow) -> Result<()>;
}

// ─── In-app ──────────────────────────────────────────────────────────────────

/// Writes one `notifications` row per job; "delivery" is the insert itself.
pub struct InAppSender {
    pool: SqlitePool,
}

impl InAppSender {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelSender for InAppSender {
    fn channel(&self) -> Channel {
        Channel::InApp
    }

    async fn send(&self, job: &DeliveryJobRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO notifications
             (id, user_id, title, body, related_type, related_id, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(&job.recipient)
        .bind(&job.title)
        .bind(&job.body)
        .bind(&job.related_type)
        .bind(&job.related_id)
        .bind(now_ts())
        .execute(&self.pool)
        .await
        .context("insert notification")?;
        Ok(())
    }
}

// ─── Email ───────────────────────────────────────────────────────────────────

pub struct EmailSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    from_addr: String,
}

impl EmailSender {
    pub fn new(api_url: String, api_key: String, from_addr: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            from_addr,
        }
    }
}

#[async_trait]
impl ChannelSender for EmailSender {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn send(&self, job: &DeliveryJobRow) -> Result<()> {
        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.from_addr,
                "to": [job.recipient_address],
                "subject": job.title,
                "text": job.body,
            }))
            .send()
            .await
            .context("email provider request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("email provider returned {}", resp.status()));
        }
        Ok(())
    }
}

// ─── SMS ─────────────────────────────────────────────────────────────────────

pub struct SmsSender {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    sender_id: String,
}

impl SmsSender {
    pub fn new(api_url: String, api_key: String, sender_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_url,
            api_key,
            sender_id,
        }
    }
}

#[async_trait]
impl ChannelSender for SmsSender {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn send(&self, job: &DeliveryJobRow) -> Result<()> {
        let resp = self
            .http
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&json!({
                "from": self.sender_id,
                "to": job.recipient_address,
                "message": job.body,
            }))
            .send()
            .await
            .context("sms provider request")?;

        if !resp.status().is_success() {
            return Err(anyhow!("sms provider returned {}", resp.status()));
        }
        Ok(())
    }
}
