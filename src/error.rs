//! Error taxonomy for the mutation engine.
//!
//! `NotFound`/`Forbidden`/`Validation`/`TimeWindowExpired` abort a mutation
//! before any state change. `Conflict` means the optimistic version retry
//! budget ran out. Notification delivery failures are NOT represented here —
//! they are absorbed at the dispatch boundary and only surface through the
//! delivery queue and audit log.

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("forbidden: {reason}")]
    Forbidden { reason: String },

    #[error("validation failed: {reason}")]
    Validation { reason: String },

    /// Deletion attempted outside the 24h creator window.
    #[error("delete window expired: {elapsed_hours}h since creation")]
    TimeWindowExpired { elapsed_hours: i64 },

    /// Optimistic version check failed on every retry.
    #[error("concurrent modification of task {id}")]
    Conflict { id: String },

    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl EngineError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        Self::Forbidden {
            reason: reason.into(),
        }
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// HTTP response mapping used by the REST layer.
    pub fn into_response_parts(self) -> (StatusCode, Json<Value>) {
        match self {
            EngineError::NotFound { kind, id } => (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": format!("{kind} not found: {id}") })),
            ),
            EngineError::Forbidden { reason } => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": reason })))
            }
            EngineError::Validation { reason } => {
                (StatusCode::BAD_REQUEST, Json(json!({ "error": reason })))
            }
            EngineError::TimeWindowExpired { elapsed_hours } => (
                StatusCode::FORBIDDEN,
                Json(json!({
                    "error": "task can only be deleted within 24 hours of creation",
                    "code": "DELETE_TIME_EXPIRED",
                    "elapsed_hours": elapsed_hours,
                })),
            ),
            EngineError::Conflict { id } => (
                StatusCode::CONFLICT,
                Json(json!({ "error": format!("task {id} was modified concurrently, retry") })),
            ),
            EngineError::Storage(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            ),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
