use crate::AppContext;
use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

/// Liveness plus a glance at the delivery backlog — enough for a probe to
/// tell "up" from "up but drowning".
pub async fn health(State(ctx): State<Arc<AppContext>>) -> Json<Value> {
    let uptime = ctx.started_at.elapsed().as_secs();
    let delivery = match ctx.queue.stats().await {
        Ok(stats) => json!({
            "paused": stats.paused,
            "backlog": stats.waiting + stats.delayed,
            "failed": stats.failed,
        }),
        Err(_) => json!({ "unavailable": true }),
    };
    Json(json!({
        "status": "ok",
        "uptime_secs": uptime,
        "version": env!("CARGO_PKG_VERSION"),
        "delivery": delivery,
    }))
}
