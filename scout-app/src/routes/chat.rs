use crate::orchestrator::{TurnError, TurnOutcome};
use crate::server::AppState;
use axum::routing::post;
use axum::{Extension, Json};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
struct StartTurnRequest {
    #[serde(default)]
    thread_id: Option<String>,
    user_id: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApprovalRequest {
    thread_id: String,
    /// `"yes"` approves; anything else declines.
    decision: String,
}

pub fn router() -> axum::Router {
    axum::Router::new()
        .route("/api/v1/chat/turns", post(start_turn))
        .route("/api/v1/chat/approvals", post(resume_turn))
}

#[tracing::instrument(level = "info", skip_all)]
async fn start_turn(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<StartTurnRequest>,
) -> Json<serde_json::Value> {
    if req.text.trim().is_empty() {
        return Json(serde_json::json!({ "status": "error", "error": "text must not be empty" }));
    }
    let thread_id = req
        .thread_id
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let outcome = state
        .orchestrator
        .start_turn(&thread_id, &req.user_id, &req.text)
        .await;
    Json(outcome_body(&thread_id, outcome))
}

#[tracing::instrument(level = "info", skip_all)]
async fn resume_turn(
    Extension(state): Extension<Arc<AppState>>,
    Json(req): Json<ApprovalRequest>,
) -> Json<serde_json::Value> {
    let outcome = state
        .orchestrator
        .resume_turn(&req.thread_id, &req.decision)
        .await;
    Json(outcome_body(&req.thread_id, outcome))
}

fn outcome_body(
    thread_id: &str,
    outcome: Result<TurnOutcome, TurnError>,
) -> serde_json::Value {
    match outcome {
        Ok(TurnOutcome::Completed { text }) => serde_json::json!({
            "status": "ok",
            "thread_id": thread_id,
            "state": "completed",
            "text": text,
        }),
        Ok(TurnOutcome::Paused { prompt }) => serde_json::json!({
            "status": "ok",
            "thread_id": thread_id,
            "state": "paused",
            "prompt": prompt,
        }),
        Err(e) => serde_json::json!({
            "status": "error",
            "thread_id": thread_id,
            "error": e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completed_outcome_maps_to_ok_body() {
        let body = outcome_body(
            "t1",
            Ok(TurnOutcome::Completed {
                text: "hello".to_string(),
            }),
        );
        assert_eq!(body["status"], "ok");
        assert_eq!(body["state"], "completed");
        assert_eq!(body["text"], "hello");
    }

    #[test]
    fn paused_outcome_carries_the_prompt() {
        let body = outcome_body(
            "t1",
            Ok(TurnOutcome::Paused {
                prompt: "Approve charge of 6.0?".to_string(),
            }),
        );
        assert_eq!(body["state"], "paused");
        assert_eq!(body["prompt"], "Approve charge of 6.0?");
    }

    #[test]
    fn errors_map_to_a_distinct_error_body() {
        let body = outcome_body("t1", Err(TurnError::NoPendingInterrupt("t1".to_string())));
        assert_eq!(body["status"], "error");
        assert!(
            body["error"]
                .as_str()
                .expect("error text")
                .contains("no pending approval")
        );
    }
}
