//! Inbound webhook — the single HTTP surface of the engine.
//!
//! The upstream mail classifier posts one `{event, decision}` pair per
//! inbound email; the response reports the terminal outcome. There is no
//! queue in front of this: processing happens within the request.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::engine::{Outcome, TrafficEngine};
use crate::event::{InboundEvent, Route, RoutingDecision};

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<TrafficEngine>,
}

/// One classified inbound email, as posted by the upstream classifier.
#[derive(Debug, Deserialize)]
pub struct InboundRequest {
    pub event: InboundEvent,
    pub decision: RoutingDecision,
}

/// Outcome report returned to the caller.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundReport {
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route: Option<Route>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Outcome> for InboundReport {
    fn from(outcome: Outcome) -> Self {
        let label = outcome.label();
        match outcome {
            Outcome::Duplicate => Self {
                outcome: label,
                route: None,
                record_id: None,
                error: None,
            },
            Outcome::Completed { route, record_id }
            | Outcome::NotBuilt { route, record_id }
            | Outcome::ClarifyPending { route, record_id } => Self {
                outcome: label,
                route: Some(route),
                record_id,
                error: None,
            },
            Outcome::Failed {
                route,
                record_id,
                error,
            } => Self {
                outcome: label,
                route: Some(route),
                record_id,
                error: Some(error),
            },
            Outcome::UnknownRoute { route } => Self {
                outcome: label,
                route: Some(route),
                record_id: None,
                error: None,
            },
        }
    }
}

/// Build the webhook router.
pub fn router(engine: Arc<TrafficEngine>) -> Router {
    Router::new()
        .route("/inbound", post(handle_inbound))
        .route("/healthz", get(healthz))
        .layer(CorsLayer::permissive())
        .with_state(AppState { engine })
}

/// POST /inbound
///
/// Runs one event through the engine. Incoherent decisions (clarify
/// without a kind, or a kind without clarify) are rejected before any
/// side effect.
async fn handle_inbound(
    State(state): State<AppState>,
    Json(request): Json<InboundRequest>,
) -> impl IntoResponse {
    if !request.decision.is_coherent() {
        warn!(
            route = %request.decision.route,
            "Rejecting incoherent routing decision"
        );
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({
                "error": "clarify route and clarify kind must be set together"
            })),
        )
            .into_response();
    }

    let outcome = state
        .engine
        .process(&request.event, &request.decision)
        .await;
    (StatusCode::OK, Json(InboundReport::from(outcome))).into_response()
}

/// GET /healthz
async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

#[cfg(test)]
mod tests {
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::config::{StoreConfig, WorkerEndpoints};
    use crate::dispatch::{HttpWorkerTransport, WorkerDispatcher, WorkerTransport};
    use crate::notify::Notifier;
    use crate::notify::chat::{ChatSink, HttpChatSink};
    use crate::notify::mail::{HttpMailSink, MailSink};
    use crate::registry::RouteRegistry;
    use crate::store::{RecordStore, RestStore};
    use std::time::Duration;

    /// Engine wired with unconfigured sinks and a tokenless store: every
    /// surface degrades to a logged no-op, so requests never leave the
    /// process.
    fn offline_app() -> Router {
        let hub = "https://hub.example.com";
        let store = Arc::new(RestStore::new(StoreConfig::default(), hub));
        let mail = Arc::new(HttpMailSink::new(None, Duration::from_secs(1)));
        let chat = Arc::new(HttpChatSink::new(None, Duration::from_secs(1)));
        let notifier = Arc::new(Notifier::new(
            mail as Arc<dyn MailSink>,
            chat as Arc<dyn ChatSink>,
            hub,
        ));
        let registry = Arc::new(RouteRegistry::with_endpoints(&WorkerEndpoints::default()));
        let transport = Arc::new(HttpWorkerTransport::new(Duration::from_secs(1)));
        let dispatcher = WorkerDispatcher::new(
            registry.clone(),
            transport as Arc<dyn WorkerTransport>,
            notifier.clone(),
        );
        let engine = TrafficEngine::new(
            store as Arc<dyn RecordStore>,
            dispatcher,
            notifier,
            registry,
        );
        router(Arc::new(engine))
    }

    fn inbound_body(route: &str, clarify_kind: Option<&str>) -> Value {
        json!({
            "event": {
                "messageId": "M1",
                "conversationId": "C1",
                "senderEmail": "anna@client.example",
                "senderName": "Anna Reid",
                "subjectLine": "Files for LAB 055",
                "receivedAt": "2026-08-21T09:00:00Z",
                "bodyText": "Attached."
            },
            "decision": {
                "route": route,
                "clarifyKind": clarify_kind,
                "jobNumber": "LAB 055",
                "possibleJobs": [],
                "clientCode": "LAB",
                "reply": null
            }
        })
    }

    async fn post_inbound(app: Router, body: Value) -> (StatusCode, Value) {
        let request = Request::builder()
            .method("POST")
            .uri("/inbound")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), 64 * 1024).await.unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn healthz_responds_ok() {
        let app = offline_app();
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn incoherent_decision_is_rejected_before_processing() {
        let app = offline_app();
        let (status, body) = post_inbound(app, inbound_body("clarify", None)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(body["error"].as_str().unwrap().contains("clarify"));
    }

    #[tokio::test]
    async fn clarify_request_reports_pending() {
        let app = offline_app();
        let (status, body) = post_inbound(app, inbound_body("clarify", Some("no_idea"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "clarify_pending");
        assert_eq!(body["route"], "clarify");
    }

    #[tokio::test]
    async fn not_built_route_reports_not_built() {
        let app = offline_app();
        let (status, body) = post_inbound(app, inbound_body("triage", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "not_built");
    }

    #[tokio::test]
    async fn unconfigured_worker_route_reports_failed() {
        let app = offline_app();
        let (status, body) = post_inbound(app, inbound_body("file", None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], "failed");
        assert!(body["error"].as_str().unwrap().contains("no endpoint"));
    }
}
