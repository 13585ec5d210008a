// rest/mod.rs — Public REST API server.
//
// Axum HTTP server bridging the task mutation engine, the activity/audit
// read surface, and the delivery-queue operator controls.
//
// Endpoints:
//   POST   /api/v1/tasks                       create task
//   POST   /api/v1/tasks/batch                 batch create (N >= 2)
//   GET    /api/v1/tasks                       list
//   GET    /api/v1/tasks/{id}                  populated task
//   PATCH  /api/v1/tasks/{id}/status           + priority/title/description/
//   ...                                          due-date/assignees/responsible-manager
//   POST   /api/v1/tasks/{id}/archive          toggle
//   POST   /api/v1/tasks/{id}/important        toggle
//   POST   /api/v1/tasks/{id}/subtasks         + PATCH {subtask_id}
//   POST   /api/v1/tasks/{id}/attachments
//   POST   /api/v1/tasks/{id}/watchers         + DELETE {user_id}
//   POST   /api/v1/tasks/{id}/comments         + replies
//   POST   /api/v1/tasks/{id}/responses
//   DELETE /api/v1/tasks/{id}
//   GET    /api/v1/activity                    newest-first, paged
//   GET    /api/v1/audit                       newest-first, paged
//   GET    /api/v1/notifications               + POST {id}/read
//   GET    /api/v1/queue/stats                 + pause/resume/retry/remove/clean
//   PUT    /api/v1/users/{id}                  directory sync
//   GET    /api/v1/health

pub mod routes;

use anyhow::Result;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{delete, get, patch, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::activity::audit::Origin;
use crate::users::UserRow;
use crate::AppContext;

pub async fn start_rest_server(ctx: Arc<AppContext>) -> Result<()> {
    let bind = format!(
        "{}:{}",
        ctx.config.server.bind_address, ctx.config.server.port
    );
    let addr: SocketAddr = bind.parse()?;

    let router = build_router(ctx);

    info!("REST API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}

pub fn build_router(ctx: Arc<AppContext>) -> Router {
    Router::new()
        // Health (no actor required)
        .route("/api/v1/health", get(routes::health::health))
        // Tasks
        .route(
            "/api/v1/tasks",
            get(routes::tasks::list_tasks).post(routes::tasks::create_task),
        )
        .route("/api/v1/tasks/batch", post(routes::tasks::create_task_batch))
        .route(
            "/api/v1/tasks/{id}",
            get(routes::tasks::get_task).delete(routes::tasks::delete_task),
        )
        .route("/api/v1/tasks/{id}/status", patch(routes::tasks::update_status))
        .route("/api/v1/tasks/{id}/priority", patch(routes::tasks::update_priority))
        .route("/api/v1/tasks/{id}/title", patch(routes::tasks::update_title))
        .route(
            "/api/v1/tasks/{id}/description",
            patch(routes::tasks::update_description),
        )
        .route("/api/v1/tasks/{id}/due-date", patch(routes::tasks::update_due_date))
        .route(
            "/api/v1/tasks/{id}/assignees",
            patch(routes::tasks::update_assignees),
        )
        .route(
            "/api/v1/tasks/{id}/responsible-manager",
            patch(routes::tasks::set_responsible_manager),
        )
        .route("/api/v1/tasks/{id}/archive", post(routes::tasks::toggle_archive))
        .route(
            "/api/v1/tasks/{id}/important",
            post(routes::tasks::toggle_important),
        )
        .route("/api/v1/tasks/{id}/subtasks", post(routes::tasks::add_subtask))
        .route(
            "/api/v1/tasks/{id}/subtasks/{subtask_id}",
            patch(routes::tasks::toggle_subtask),
        )
        .route(
            "/api/v1/tasks/{id}/attachments",
            post(routes::tasks::add_attachment),
        )
        .route("/api/v1/tasks/{id}/watchers", post(routes::tasks::add_watcher))
        .route(
            "/api/v1/tasks/{id}/watchers/{user_id}",
            delete(routes::tasks::remove_watcher),
        )
        // Comments / responses
        .route(
            "/api/v1/tasks/{id}/comments",
            post(routes::comments::add_comment),
        )
        .route(
            "/api/v1/tasks/{id}/comments/{comment_id}/replies",
            post(routes::comments::reply_to_comment),
        )
        .route(
            "/api/v1/tasks/{id}/responses",
            post(routes::comments::add_response),
        )
        // Activity / audit
        .route("/api/v1/activity", get(routes::activity::query_activity))
        .route("/api/v1/audit", get(routes::activity::query_audit))
        // In-app notification feed
        .route(
            "/api/v1/notifications",
            get(routes::notifications::list_notifications),
        )
        .route(
            "/api/v1/notifications/{id}/read",
            post(routes::notifications::mark_read),
        )
        // Delivery queue operator controls
        .route("/api/v1/queue/stats", get(routes::queue::stats))
        .route("/api/v1/queue/jobs", get(routes::queue::list_jobs))
        .route("/api/v1/queue/pause", post(routes::queue::pause))
        .route("/api/v1/queue/resume", post(routes::queue::resume))
        .route("/api/v1/queue/jobs/{id}/retry", post(routes::queue::retry_job))
        .route("/api/v1/queue/jobs/{id}", delete(routes::queue::remove_job))
        .route("/api/v1/queue/clean", post(routes::queue::clean))
        // User directory sync
        .route("/api/v1/users/{id}", put(routes::users::sync_user))
        .layer(CorsLayer::permissive())
        .with_state(ctx)
}

// ─── Shared handler helpers ──────────────────────────────────────────────────

pub type RestError = (StatusCode, Json<Value>);

/// Resolve the authenticated actor from the `x-actor-id` header.
/// Authentication itself happens upstream; an unknown or missing id is a 403.
pub async fn resolve_actor(ctx: &AppContext, headers: &HeaderMap) -> Result<UserRow, RestError> {
    let Some(actor_id) = headers.get("x-actor-id").and_then(|v| v.to_str().ok()) else {
        return Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": "missing x-actor-id header" })),
        ));
    };
    match ctx.users.get(actor_id).await {
        Ok(Some(user)) => Ok(user),
        Ok(None) => Err((
            StatusCode::FORBIDDEN,
            Json(json!({ "error": format!("unknown actor '{actor_id}'") })),
        )),
        Err(e) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": e.to_string() })),
        )),
    }
}

/// Capture caller origin metadata for audit entries.
pub fn origin_from(headers: &HeaderMap) -> Origin {
    Origin {
        addr: headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        client: headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(String::from),
    }
}
