// rest/routes/comments.rs — Comment, reply, and response routes.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::{resolve_actor, RestError};
use crate::AppContext;

#[derive(Deserialize)]
pub struct AddCommentRequest {
    #[serde(default)]
    pub body: String,
    pub attachment_url: Option<String>,
}

pub async fn add_comment(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddCommentRequest>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let comment = ctx
        .engine
        .add_comment(&actor, &id, &body.body, body.attachment_url.as_deref())
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "comment": comment }))))
}

#[derive(Deserialize)]
pub struct ReplyRequest {
    pub body: String,
}

pub async fn reply_to_comment(
    State(ctx): State<Arc<AppContext>>,
    Path((id, comment_id)): Path<(String, String)>,
    headers: HeaderMap,
    Json(body): Json<ReplyRequest>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let comment = ctx
        .engine
        .reply_to_comment(&actor, &id, &comment_id, &body.body)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "comment": comment }))))
}

#[derive(Deserialize)]
pub struct AddResponseRequest {
    pub body: String,
}

pub async fn add_response(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddResponseRequest>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let response = ctx
        .engine
        .add_response(&actor, &id, &body.body)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "response": response }))))
}
