// rest/routes/tasks.rs — Task mutation and read routes.

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::rest::{origin_from, resolve_actor, RestError};
use crate::tasks::model::{NewTask, NewTaskBatch, TaskListParams, TaskStatus};
use crate::AppContext;

pub async fn list_tasks(
    State(ctx): State<Arc<AppContext>>,
    Query(params): Query<TaskListParams>,
) -> Result<Json<Value>, RestError> {
    let tasks = ctx
        .engine
        .list_tasks(&params)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "tasks": tasks })))
}

pub async fn get_task(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
) -> Result<Json<Value>, RestError> {
    let task = ctx
        .engine
        .get_task(&id)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

pub async fn create_task(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<NewTask>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .create_task(&actor, body)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "task": task }))))
}

pub async fn create_task_batch(
    State(ctx): State<Arc<AppContext>>,
    headers: HeaderMap,
    Json(body): Json<NewTaskBatch>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let tasks = ctx
        .engine
        .create_task_batch(&actor, body)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "tasks": tasks }))))
}

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_status(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateStatusRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let Some(status) = TaskStatus::from_str(&body.status) else {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown status '{}'", body.status) })),
        ));
    };
    let task = ctx
        .engine
        .update_status(&actor, &id, status)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: String,
}

pub async fn update_priority(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdatePriorityRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .update_priority(&actor, &id, &body.priority)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct UpdateTitleRequest {
    pub title: String,
}

pub async fn update_title(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateTitleRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .update_title(&actor, &id, &body.title)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct UpdateDescriptionRequest {
    pub description: String,
}

pub async fn update_description(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateDescriptionRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .update_description(&actor, &id, &body.description)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct UpdateDueDateRequest {
    pub due_date: Option<i64>,
}

pub async fn update_due_date(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateDueDateRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .update_due_date(&actor, &id, body.due_date)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct UpdateAssigneesRequest {
    pub assignees: Vec<String>,
}

pub async fn update_assignees(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<UpdateAssigneesRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .update_assignees(&actor, &id, body.assignees)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct SetResponsibleManagerRequest {
    pub responsible_manager: Option<String>,
}

pub async fn set_responsible_manager(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<SetResponsibleManagerRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .set_responsible_manager(&actor, &id, body.responsible_manager)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

pub async fn toggle_archive(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .toggle_archive(&actor, &id)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

pub async fn toggle_important(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let origin = origin_from(&headers);
    let task = ctx
        .engine
        .toggle_important(&actor, &id, &origin)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct AddSubtaskRequest {
    pub title: String,
}

pub async fn add_subtask(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddSubtaskRequest>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let subtask = ctx
        .engine
        .add_subtask(&actor, &id, &body.title)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "subtask": subtask }))))
}

pub async fn toggle_subtask(
    State(ctx): State<Arc<AppContext>>,
    Path((id, subtask_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let subtask = ctx
        .engine
        .toggle_subtask(&actor, &id, &subtask_id)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "subtask": subtask })))
}

#[derive(Deserialize)]
pub struct AddAttachmentRequest {
    pub file_name: String,
    pub file_url: String,
    #[serde(default)]
    pub file_type: String,
    #[serde(default)]
    pub file_size: i64,
}

pub async fn add_attachment(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddAttachmentRequest>,
) -> Result<(StatusCode, Json<Value>), RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let attachment = ctx
        .engine
        .add_attachment(
            &actor,
            &id,
            &body.file_name,
            &body.file_url,
            &body.file_type,
            body.file_size,
        )
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok((StatusCode::CREATED, Json(json!({ "attachment": attachment }))))
}

#[derive(Deserialize)]
pub struct AddWatcherRequest {
    pub user_id: String,
}

pub async fn add_watcher(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<AddWatcherRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .add_watcher(&actor, &id, &body.user_id)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

pub async fn remove_watcher(
    State(ctx): State<Arc<AppContext>>,
    Path((id, user_id)): Path<(String, String)>,
    headers: HeaderMap,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let task = ctx
        .engine
        .remove_watcher(&actor, &id, &user_id)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "task": task })))
}

#[derive(Deserialize)]
pub struct DeleteTaskRequest {
    pub reason: String,
}

pub async fn delete_task(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<DeleteTaskRequest>,
) -> Result<Json<Value>, RestError> {
    let actor = resolve_actor(&ctx, &headers).await?;
    let origin = origin_from(&headers);
    ctx.engine
        .delete_task(&actor, &id, &body.reason, &origin)
        .await
        .map_err(|e| e.into_response_parts())?;
    Ok(Json(json!({ "deleted": true, "id": id })))
}
