//! Worker dispatcher — resolves a route through the registry and performs
//! the call, exactly once, with no retry.
//!
//! Two sink kinds sit behind live routes: a worker HTTP endpoint, or the
//! notifier's mail path for routes that communicate only by sending an
//! email. The choice is registry metadata, never string-matching at the
//! call site.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::event::{ClarifyKind, Route, WorkerPayload};
use crate::notify::Notifier;
use crate::registry::{Lifecycle, RouteRegistry, SinkKind};

/// Registry status echoed in every dispatch result. Callers must branch on
/// this, not only on `success`: a `not_built` result is "successful" but no
/// real work happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Live,
    Testing,
    NotBuilt,
    Unknown,
}

impl DispatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchStatus::Live => "live",
            DispatchStatus::Testing => "testing",
            DispatchStatus::NotBuilt => "not_built",
            DispatchStatus::Unknown => "unknown",
        }
    }
}

impl From<Lifecycle> for DispatchStatus {
    fn from(lifecycle: Lifecycle) -> Self {
        match lifecycle {
            Lifecycle::Live => DispatchStatus::Live,
            Lifecycle::Testing => DispatchStatus::Testing,
            Lifecycle::NotBuilt => DispatchStatus::NotBuilt,
        }
    }
}

/// Outcome of one dispatch attempt. Terminal either way — the engine never
/// re-dispatches.
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub success: bool,
    pub status: DispatchStatus,
    pub body: Option<Value>,
    pub error: Option<String>,
}

impl DispatchResult {
    fn ok(status: DispatchStatus, body: Option<Value>) -> Self {
        Self {
            success: true,
            status,
            body,
            error: None,
        }
    }

    fn failed(status: DispatchStatus, error: impl Into<String>) -> Self {
        Self {
            success: false,
            status,
            body: None,
            error: Some(error.into()),
        }
    }
}

// ── Transport seam ──────────────────────────────────────────────────

/// HTTP call to a worker endpoint. Separated out so tests can record
/// calls instead of hitting the network.
#[async_trait]
pub trait WorkerTransport: Send + Sync {
    async fn call(&self, endpoint: &str, payload: &WorkerPayload) -> Result<Value, DispatchError>;
}

/// reqwest-backed transport. 2xx bodies parse as structured success
/// payloads; non-2xx is failure with the raw body as error detail.
pub struct HttpWorkerTransport {
    client: reqwest::Client,
}

impl HttpWorkerTransport {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build worker HTTP client");
        Self { client }
    }
}

#[async_trait]
impl WorkerTransport for HttpWorkerTransport {
    async fn call(&self, endpoint: &str, payload: &WorkerPayload) -> Result<Value, DispatchError> {
        let response = self
            .client
            .post(endpoint)
            .json(payload)
            .send()
            .await
            .map_err(|e| DispatchError::Http {
                route: payload.route,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DispatchError::Endpoint {
                route: payload.route,
                status: status.as_u16(),
                body,
            });
        }

        // Workers may reply with an empty body; treat that as success.
        Ok(response.json().await.unwrap_or(Value::Null))
    }
}

// ── Dispatcher ──────────────────────────────────────────────────────

pub struct WorkerDispatcher {
    registry: Arc<RouteRegistry>,
    transport: Arc<dyn WorkerTransport>,
    notifier: Arc<Notifier>,
}

impl WorkerDispatcher {
    pub fn new(
        registry: Arc<RouteRegistry>,
        transport: Arc<dyn WorkerTransport>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            registry,
            transport,
            notifier,
        }
    }

    /// Resolve the registry entry for the payload's route and perform the
    /// call (or synthesize a response for not-built routes).
    pub async fn dispatch(&self, payload: &WorkerPayload) -> DispatchResult {
        let route = payload.route;
        let Some(entry) = self.registry.entry(route) else {
            warn!(%route, "No registry entry for route");
            return DispatchResult::failed(DispatchStatus::Unknown, "no registry entry");
        };

        if entry.lifecycle == Lifecycle::NotBuilt {
            // No network I/O: succeed so the engine can run its flow, while
            // the status tells it no real work happened.
            info!(%route, "Route not built; synthesizing response");
            return DispatchResult::ok(
                DispatchStatus::NotBuilt,
                Some(json!({ "echo": payload })),
            );
        }

        if entry.lifecycle == Lifecycle::Testing {
            info!(%route, "Dispatching to route under test");
        }
        let status = DispatchStatus::from(entry.lifecycle);

        match entry.sink {
            SinkKind::Mail => self.dispatch_mail(payload, status).await,
            SinkKind::Worker => {
                let Some(endpoint) = entry.endpoint.as_deref() else {
                    return DispatchResult::failed(
                        status,
                        DispatchError::NoEndpoint { route }.to_string(),
                    );
                };
                match self.transport.call(endpoint, payload).await {
                    Ok(body) => DispatchResult::ok(status, Some(body)),
                    Err(e) => {
                        warn!(%route, error = %e, "Worker call failed");
                        DispatchResult::failed(status, e.to_string())
                    }
                }
            }
        }
    }

    /// Mail-kind routes: the "work" is sending an email.
    async fn dispatch_mail(&self, payload: &WorkerPayload, status: DispatchStatus) -> DispatchResult {
        let result = match payload.route {
            Route::Clarify => {
                let kind = payload.clarify_kind.unwrap_or(ClarifyKind::NoIdea);
                self.notifier
                    .send_clarify(payload, kind, &payload.possible_jobs)
                    .await
            }
            Route::Confirm => {
                self.notifier
                    .send_clarify(payload, ClarifyKind::Confirm, &payload.possible_jobs)
                    .await
            }
            Route::Answer => {
                let message = payload.reply.as_deref().unwrap_or("Noted, thanks.");
                self.notifier.send_answer(payload, message).await
            }
            Route::Wip | Route::Tracker => {
                self.notifier
                    .send_redirect(payload, payload.route, payload.client_name.as_deref())
                    .await
            }
            other => {
                warn!(route = %other, "Route registered as mail-kind but has no mail handler");
                return DispatchResult::failed(status, "no mail handler for route");
            }
        };

        match result {
            Ok(receipt) => DispatchResult::ok(status, Some(json!({ "delivered": receipt.delivered() }))),
            Err(e) => DispatchResult::failed(status, e.to_string()),
        }
    }
}
