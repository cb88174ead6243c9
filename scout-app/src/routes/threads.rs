use crate::server::AppState;
use axum::extract::Path;
use axum::routing::get;
use axum::{Extension, Json};
use std::sync::Arc;

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/chat/threads", get(list_threads))
        .route("/api/v1/chat/threads/{id}", get(get_thread))
}

#[tracing::instrument(level = "debug", skip_all)]
async fn list_threads(Extension(state): Extension<Arc<AppState>>) -> Json<serde_json::Value> {
    match state.store.list_threads() {
        Ok(threads) => Json(serde_json::json!({ "status": "ok", "threads": threads })),
        Err(e) => Json(serde_json::json!({ "status": "error", "error": e.to_string() })),
    }
}

#[tracing::instrument(level = "debug", skip_all)]
async fn get_thread(
    Extension(state): Extension<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    match state.store.load(&id) {
        Ok(Some(record)) => Json(serde_json::json!({
            "status": "ok",
            "thread_id": record.thread_id,
            "user_id": record.user_id,
            "messages": record.messages,
            "interrupt": record.interrupt,
        })),
        Ok(None) => Json(serde_json::json!({ "status": "not_found" })),
        Err(e) => Json(serde_json::json!({ "status": "error", "error": e.to_string() })),
    }
}
