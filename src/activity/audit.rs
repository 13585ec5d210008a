// SPDX-License-Identifier: MIT
//! Strict audit trail for administrative actions.
//!
//! Unlike the activity log, audit writes are fallible and callers are
//! expected to record failed attempts (`status = failed` + error message),
//! not just successes. Actor fields are snapshotted at write time so an
//! entry stays accurate after the actor is renamed or deleted.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::storage::now_ts;
use crate::tasks::model::new_id;
use crate::users::UserRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    User,
    Task,
    Sms,
    Email,
    Queue,
    System,
    Auth,
}

impl AuditCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditCategory::User => "user",
            AuditCategory::Task => "task",
            AuditCategory::Sms => "sms",
            AuditCategory::Email => "email",
            AuditCategory::Queue => "queue",
            AuditCategory::System => "system",
            AuditCategory::Auth => "auth",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Success,
    Failed,
    Pending,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Success => "success",
            AuditStatus::Failed => "failed",
            AuditStatus::Pending => "pending",
        }
    }
}

/// Network/client origin of the administrative call.
#[derive(Debug, Clone, Default)]
pub struct Origin {
    pub addr: Option<String>,
    pub client: Option<String>,
}

/// One audit entry, pre-insert. Built by callers, written via
/// [`AuditRecorder::record`].
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub action: String,
    pub category: AuditCategory,
    pub target_type: String,
    pub target_id: String,
    pub target_name: String,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub previous_values: Option<serde_json::Value>,
    pub new_values: Option<serde_json::Value>,
    pub status: AuditStatus,
    pub error_message: Option<String>,
}

impl AuditEntry {
    pub fn new(action: &str, category: AuditCategory, target_type: &str, target_id: &str) -> Self {
        Self {
            action: action.to_string(),
            category,
            target_type: target_type.to_string(),
            target_id: target_id.to_string(),
            target_name: String::new(),
            description: String::new(),
            details: None,
            previous_values: None,
            new_values: None,
            status: AuditStatus::Success,
            error_message: None,
        }
    }

    pub fn target_name(mut self, name: &str) -> Self {
        self.target_name = name.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn values(
        mut self,
        previous: Option<serde_json::Value>,
        new: Option<serde_json::Value>,
    ) -> Self {
        self.previous_values = previous;
        self.new_values = new;
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn failed(mut self, error: &str) -> Self {
        self.status = AuditStatus::Failed;
        self.error_message = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct AuditRow {
    pub id: String,
    pub ts: i64,
    pub actor_id: String,
    pub actor_name: String,
    pub actor_email: String,
    pub actor_role: String,
    pub action: String,
    pub category: String,
    pub target_type: String,
    pub target_id: String,
    pub target_name: String,
    pub description: String,
    pub details: Option<String>,
    pub previous_values: Option<String>,
    pub new_values: Option<String>,
    pub origin_addr: Option<String>,
    pub origin_client: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQueryParams {
    pub category: Option<String>,
    pub target_id: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Clone)]
pub struct AuditRecorder {
    pool: SqlitePool,
}

impl AuditRecorder {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn record(
        &self,
        actor: &UserRow,
        origin: &Origin,
        entry: AuditEntry,
    ) -> Result<AuditRow> {
        let id = new_id();
        sqlx::query(
            "INSERT INTO audit_log
             (id, ts, actor_id, actor_name, actor_email, actor_role,
              action, category, target_type, target_id, target_name,
              description, details, previous_values, new_values,
              origin_addr, origin_client, status, error_message)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(now_ts())
        .bind(&actor.id)
        .bind(&actor.name)
        .bind(actor.email.as_deref().unwrap_or(""))
        .bind(&actor.role)
        .bind(&entry.action)
        .bind(entry.category.as_str())
        .bind(&entry.target_type)
        .bind(&entry.target_id)
        .bind(&entry.target_name)
        .bind(&entry.description)
        .bind(entry.details.map(|v| v.to_string()))
        .bind(entry.previous_values.map(|v| v.to_string()))
        .bind(entry.new_values.map(|v| v.to_string()))
        .bind(&origin.addr)
        .bind(&origin.client)
        .bind(entry.status.as_str())
        .bind(&entry.error_message)
        .execute(&self.pool)
        .await?;

        Ok(sqlx::query_as("SELECT * FROM audit_log WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await?)
    }

    /// Query entries newest-first with (page, limit) pagination.
    pub async fn query(&self, params: &AuditQueryParams) -> Result<Vec<AuditRow>> {
        let limit = params.limit.unwrap_or(50).min(200);
        let page = params.page.unwrap_or(1).max(1);
        let offset = (page - 1) * limit;

        let mut rows: Vec<AuditRow> =
            sqlx::query_as("SELECT * FROM audit_log ORDER BY ts DESC LIMIT ? OFFSET ?")
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await?;

        if let Some(ref category) = params.category {
            rows.retain(|r| &r.category == category);
        }
        if let Some(ref target_id) = params.target_id {
            rows.retain(|r| &r.target_id == target_id);
        }
        if let Some(ref status) = params.status {
            rows.retain(|r| &r.status == status);
        }
        Ok(rows)
    }
}
