//! Demo application router the firewall fronts.

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn router() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
}

async fn index() -> &'static str {
    "rampart"
}

async fn status() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
