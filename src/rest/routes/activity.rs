// rest/routes/activity.rs — Activity and audit read surface.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::activity::audit::AuditQueryParams;
use crate::activity::ActivityQueryParams;
use crate::rest::RestError;
use crate::AppContext;

pub async fn query_activity(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<ActivityQueryParams>,
) -> Result<Json<Value>, RestError> {
    let entries = ctx.activity.query(&params).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(json!({
        "entries": entries,
        "page": params.page.unwrap_or(1),
        "limit": params.limit.unwrap_or(50),
    })))
}

pub async fn query_audit(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<Value>, RestError> {
    let entries = ctx.audit.query(&params).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    Ok(Json(json!({
        "entries": entries,
        "page": params.page.unwrap_or(1),
        "limit": params.limit.unwrap_or(50),
    })))
}
