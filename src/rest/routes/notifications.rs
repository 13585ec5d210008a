// rest/routes/notifications.rs — In-app notification feed.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::RestError;
use crate::AppContext;

#[derive(Deserialize)]
pub struct FeedParams {
    pub user_id: String,
    pub limit: Option<i64>,
}

pub async fn list_notifications(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<FeedParams>,
) -> Result<Json<Value>, RestError> {
    let internal = |e: anyhow::Error| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    };
    let notifications = ctx
        .feed
        .list(&params.user_id, params.limit.unwrap_or(50))
        .await
        .map_err(internal)?;
    let unread = ctx.feed.unread_count(&params.user_id).await.map_err(internal)?;
    Ok(Json(json!({
        "notifications": notifications,
        "unread": unread,
    })))
}

pub async fn mark_read(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RestError> {
    let found = ctx.feed.mark_read(&id).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )
    })?;
    if !found {
        return Err((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "notification not found" })),
        ));
    }
    Ok(Json(json!({ "read": true })))
}
