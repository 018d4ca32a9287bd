//! JSON API for the conversational agent. One route takes a chat message and
//! returns the reply plus availability metadata; the other reads back recent
//! turns for a session.
//!
//! Everything except infrastructure failures answers 200: a bad phone or a
//! missing master is a chat reply, not an HTTP error.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use zapys_agent::{AgentResponse, AgentRuntime};
use zapys_core::domain::conversation::{AiMeta, Indicator, Turn};
use zapys_core::domain::BusinessId;
use zapys_core::errors::{AgentError, InterfaceOutcome};

const DEFAULT_SESSION: &str = "default";
const DEFAULT_HISTORY_LIMIT: i64 = 20;

#[derive(Clone)]
pub struct AgentState {
    runtime: Arc<AgentRuntime>,
}

pub fn router(runtime: Arc<AgentRuntime>) -> Router {
    Router::new()
        .route("/api/agent/message", post(post_message))
        .route("/api/agent/history", get(get_history))
        .with_state(AgentState { runtime })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRequest {
    pub business_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
    pub action: String,
    pub data: Value,
    pub ai: AiView,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiView {
    pub has_key: bool,
    pub indicator: Indicator,
    pub used_ai: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<AiMeta> for AiView {
    fn from(meta: AiMeta) -> Self {
        Self {
            has_key: meta.has_key,
            indicator: meta.indicator,
            used_ai: meta.used_ai,
            reason: meta.reason,
        }
    }
}

impl MessageResponse {
    fn from_agent(response: AgentResponse) -> Self {
        Self {
            success: true,
            message: response.message,
            action: response.action,
            data: response.data,
            ai: AiView::from(response.ai),
        }
    }
}

async fn post_message(
    State(state): State<AgentState>,
    Json(request): Json<MessageRequest>,
) -> (StatusCode, Json<MessageResponse>) {
    let business_id = BusinessId(request.business_id);
    let session_id = request.session_id.unwrap_or_else(|| DEFAULT_SESSION.to_string());

    match state.runtime.handle_message(&business_id, &session_id, &request.message).await {
        Ok(response) => (StatusCode::OK, Json(MessageResponse::from_agent(response))),
        Err(error) => failure_response(&business_id, error),
    }
}

fn failure_response(
    business_id: &BusinessId,
    error: AgentError,
) -> (StatusCode, Json<MessageResponse>) {
    match error.interface_outcome() {
        InterfaceOutcome::ChatReply => {
            // Raw upstream reasons stay in logs, never in the reply text.
            let message = match &error {
                AgentError::Upstream(_) => error.user_message().to_string(),
                _ => error.to_string(),
            };
            (
                StatusCode::OK,
                Json(MessageResponse {
                    success: true,
                    message,
                    action: "reply".to_string(),
                    data: Value::Null,
                    ai: AiView::from(AiMeta::offline("error")),
                }),
            )
        }
        InterfaceOutcome::ServiceUnavailable => {
            warn!(
                event_name = "api.agent.infrastructure_failure",
                business_id = %business_id.0,
                error = %error,
                "agent request failed on infrastructure"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(MessageResponse {
                    success: false,
                    message: error.user_message().to_string(),
                    action: "reply".to_string(),
                    data: Value::Null,
                    ai: AiView::from(AiMeta::offline("infrastructure")),
                }),
            )
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryQuery {
    pub business_id: String,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub success: bool,
    pub messages: Vec<TurnView>,
    /// Availability metadata from the most recent assistant turn, so the UI
    /// can restore the status dot without a new message round-trip.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai: Option<AiView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnView {
    pub role: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl TurnView {
    fn from_turn(turn: Turn) -> Self {
        Self {
            role: turn.role.as_str(),
            message: turn.message,
            action: turn.metadata.decision_action,
            timestamp: turn.metadata.timestamp,
        }
    }
}

async fn get_history(
    State(state): State<AgentState>,
    Query(query): Query<HistoryQuery>,
) -> (StatusCode, Json<HistoryResponse>) {
    let business_id = BusinessId(query.business_id);
    let session_id = query.session_id.unwrap_or_else(|| DEFAULT_SESSION.to_string());
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, 100);

    match state.runtime.history(&business_id, &session_id, limit).await {
        Ok(turns) => {
            let ai = turns
                .iter()
                .rev()
                .find_map(|turn| turn.metadata.ai.clone())
                .map(AiView::from);
            (
                StatusCode::OK,
                Json(HistoryResponse {
                    success: true,
                    messages: turns.into_iter().map(TurnView::from_turn).collect(),
                    ai,
                }),
            )
        }
        Err(error) => {
            warn!(
                event_name = "api.agent.history_failure",
                business_id = %business_id.0,
                error = %error,
                "history request failed"
            );
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(HistoryResponse { success: false, messages: Vec::new(), ai: None }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use tower::util::ServiceExt;

    use zapys_agent::{AgentRuntime, AgentStore};
    use zapys_core::config::AppConfig;

    use super::router;

    fn test_router() -> axum::Router {
        let runtime =
            AgentRuntime::from_config(&AppConfig::default(), AgentStore::in_memory());
        router(Arc::new(runtime))
    }

    async fn body_json(response: axum::response::Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        serde_json::from_slice(&bytes).expect("json body")
    }

    fn message_request(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/agent/message")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn message_route_executes_commands_and_reports_ai_state() {
        let app = test_router();

        let response = app
            .oneshot(message_request(json!({
                "businessId": "salon-1",
                "message": "master: Олена"
            })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["success"], json!(true));
        assert_eq!(payload["message"], json!("Готово, майстра додано."));
        assert_eq!(payload["action"], json!("create_master"));
        // Default config has no provider, so the indicator stays red.
        assert_eq!(payload["ai"]["hasKey"], json!(false));
        assert_eq!(payload["ai"]["indicator"], json!("red"));
        assert_eq!(payload["ai"]["usedAi"], json!(false));
    }

    #[tokio::test]
    async fn history_route_returns_persisted_turns_in_order() {
        let app = test_router();

        app.clone()
            .oneshot(message_request(json!({
                "businessId": "salon-1",
                "sessionId": "s7",
                "message": "master: Олена"
            })))
            .await
            .expect("response");

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/agent/history?businessId=salon-1&sessionId=s7")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        let messages = payload["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0]["role"], json!("user"));
        assert_eq!(messages[0]["message"], json!("master: Олена"));
        assert_eq!(messages[1]["role"], json!("assistant"));
        assert_eq!(messages[1]["action"], json!("create_master"));
        assert_eq!(payload["ai"]["indicator"], json!("red"));
    }

    #[tokio::test]
    async fn unknown_session_history_is_empty_but_successful() {
        let app = test_router();

        let response = app
            .oneshot(
                Request::builder()
                    .method("GET")
                    .uri("/api/agent/history?businessId=salon-1")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = body_json(response).await;
        assert_eq!(payload["success"], json!(true));
        assert_eq!(payload["messages"].as_array().expect("messages").len(), 0);
    }
}
