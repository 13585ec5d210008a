// rest/routes/queue.rs — Delivery queue operator controls.
//
// Every mutating control here is an administrative action: it lands in the
// audit log with actor snapshot and origin, including denied attempts.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity::audit::{AuditCategory, AuditEntry};
use crate::policy::Role;
use crate::rest::{origin_from, resolve_actor, RestError};
use crate::users::UserRow;
use crate::AppContext;

fn internal(e: anyhow::Error) -> RestError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
}

/// Queue controls are reserved for admins. A refusal is itself audited.
async fn require_operator(
    ctx: &AppContext,
    headers: &HeaderMap,
    action: &str,
) -> Result<UserRow, RestError> {
    let actor = resolve_actor(ctx, headers).await?;
    if matches!(actor.role(), Role::Admin | Role::SuperAdmin) {
        return Ok(actor);
    }
    let entry = AuditEntry::new(action, AuditCategory::Queue, "queue", "delivery")
        .failed(&format!("role '{}' may not operate the queue", actor.role));
    let _ = ctx.audit.record(&actor, &origin_from(headers), entry).await;
    Err((
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "queue controls require an admin role" })),
    ))
}

pub async fn stats(State(ctx): State<Arc<AppContext>>) -> Result<Json<Value>, RestError> {
    let stats = ctx.queue.stats().await.map_err(internal)?;
    Ok(Json(json!({ "queue": stats })))
}

#[derive(Deserialize)]
pub struct ListJobsParams {
    pub status: Option<String>,
    pub limit: Option<i64>,
}

pub async fn list_jobs(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ListJobsParams>,
) -> Result<Json<Value>, RestError> {
    let jobs = ctx
        .queue
        .list_jobs(params.status.as_deref(), params.limit.unwrap_or(100))
        .await
        .map_err(internal)?;
    Ok(Json(json!({ "jobs": jobs })))
}

pub async fn pause(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = require_operator(&ctx, &headers, "queue_paused").await?;
    ctx.queue.pause().await.map_err(internal)?;

    let entry = AuditEntry::new("queue_paused", AuditCategory::Queue, "queue", "delivery")
        .description("paused delivery queue");
    let _ = ctx.audit.record(&actor, &origin_from(&headers), entry).await;
    Ok(Json(json!({ "paused": true })))
}

pub async fn resume(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = require_operator(&ctx, &headers, "queue_resumed").await?;
    ctx.queue.resume().await.map_err(internal)?;

    let entry = AuditEntry::new("queue_resumed", AuditCategory::Queue, "queue", "delivery")
        .description("resumed delivery queue");
    let _ = ctx.audit.record(&actor, &origin_from(&headers), entry).await;
    Ok(Json(json!({ "paused": false })))
}

pub async fn retry_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = require_operator(&ctx, &headers, "queue_job_retried").await?;
    let found = ctx.queue.retry_job(&id).await.map_err(internal)?;

    let entry = if found {
        AuditEntry::new("queue_job_retried", AuditCategory::Queue, "delivery_job", &id)
    } else {
        AuditEntry::new("queue_job_retried", AuditCategory::Queue, "delivery_job", &id)
            .failed("job not found or not in failed state")
    };
    let _ = ctx.audit.record(&actor, &origin_from(&headers), entry).await;

    if !found {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no failed job with that id" })),
        ));
    }
    Ok(Json(json!({ "retried": true })))
}

pub async fn remove_job(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = require_operator(&ctx, &headers, "queue_job_removed").await?;
    let found = ctx.queue.remove_job(&id).await.map_err(internal)?;

    let entry = if found {
        AuditEntry::new("queue_job_removed", AuditCategory::Queue, "delivery_job", &id)
    } else {
        AuditEntry::new("queue_job_removed", AuditCategory::Queue, "delivery_job", &id)
            .failed("job not found or already started")
    };
    let _ = ctx.audit.record(&actor, &origin_from(&headers), entry).await;

    if !found {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "no removable job with that id" })),
        ));
    }
    Ok(Json(json!({ "removed": true })))
}

#[derive(Deserialize)]
pub struct CleanRequest {
    /// Remove terminal jobs older than this many hours (default 24).
    pub older_than_hours: Option<i64>,
}

pub async fn clean(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<CleanRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = require_operator(&ctx, &headers, "queue_cleaned").await?;
    let hours = body.older_than_hours.unwrap_or(24).max(0);
    let removed = ctx.queue.clean(hours * 3600).await.map_err(internal)?;

    let entry = AuditEntry::new("queue_cleaned", AuditCategory::Queue, "queue", "delivery")
        .description(&format!("removed {removed} terminal jobs older than {hours}h"))
        .details(json!({ "removed": removed, "older_than_hours": hours }));
    let _ = ctx.audit.record(&actor, &origin_from(&headers), entry).await;

    Ok(Json(json!({ "removed": removed })))
}
