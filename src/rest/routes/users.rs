// rest/routes/users.rs — User directory sync endpoint.
//
// The identity service pushes user records here; the core never creates
// users on its own.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::policy::Role;
use crate::rest::RestError;
use crate::AppContext;

#[derive(Deserialize)]
pub struct SyncUserRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: String,
}

pub async fn sync_user(
    State(ctx): State<Arc<AppContext>>,
    Path(id): Path<String>,
    Json(body): Json<SyncUserRequest>,
) -> Result<Json<Value>, RestError> {
    let role = Role::from_str(&body.role);
    if role == Role::Unknown {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": format!("unknown role '{}'", body.role) })),
        ));
    }
    let user = ctx
        .users
        .sync_user(
            &id,
            &body.name,
            body.email.as_deref(),
            body.phone.as_deref(),
            role,
        )
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
        })?;
    Ok(Json(json!({ "user": user })))
}
