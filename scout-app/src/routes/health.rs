use axum::Json;
use axum::routing::get;

pub fn router() -> axum::Router {
    axum::Router::new().route("/api/v1/health", get(health))
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}
