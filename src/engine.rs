//! Traffic engine — the state machine that takes one inbound event from
//! dedup through dispatch to its outbound notification.
//!
//! Per-event states: `new → deduped-skip`, or `new → [clarify-resolved →]
//! dispatched → completed | failed`. Terminal states are never revisited
//! and there is no automatic re-dispatch.
//!
//! Error policy (the engine decides, not its helpers): store reads fail
//! open — losing dedup protection is preferred over losing the event;
//! store writes are best-effort and logged; dispatch failures are terminal
//! and surfaced to the sender; notification failures are logged only.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::dispatch::{DispatchResult, DispatchStatus, WorkerDispatcher};
use crate::event::{ClarifyKind, InboundEvent, Route, RoutingDecision, WorkerPayload};
use crate::notify::{Notifier, action_label};
use crate::registry::RouteRegistry;
use crate::store::{NewTrafficRecord, Project, RecordStore, TrafficStatus};

/// Terminal outcome of processing one inbound event.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Redelivery of an already-processed message; dropped silently.
    Duplicate,
    Completed {
        route: Route,
        record_id: Option<String>,
    },
    /// The route's worker is not built yet; the sender got a notice
    /// instead of a normal confirmation.
    NotBuilt {
        route: Route,
        record_id: Option<String>,
    },
    /// A clarification was sent; the record stays pending until the
    /// sender replies.
    ClarifyPending {
        route: Route,
        record_id: Option<String>,
    },
    Failed {
        route: Route,
        record_id: Option<String>,
        error: String,
    },
    /// The routing decision named a route absent from the registry.
    /// Terminal, logged, no notification.
    UnknownRoute { route: Route },
}

impl Outcome {
    /// Short label for logging and the webhook response.
    pub fn label(&self) -> &'static str {
        match self {
            Outcome::Duplicate => "duplicate",
            Outcome::Completed { .. } => "completed",
            Outcome::NotBuilt { .. } => "not_built",
            Outcome::ClarifyPending { .. } => "clarify_pending",
            Outcome::Failed { .. } => "failed",
            Outcome::UnknownRoute { .. } => "unknown_route",
        }
    }
}

pub struct TrafficEngine {
    store: Arc<dyn RecordStore>,
    dispatcher: WorkerDispatcher,
    notifier: Arc<Notifier>,
    registry: Arc<RouteRegistry>,
}

impl TrafficEngine {
    pub fn new(
        store: Arc<dyn RecordStore>,
        dispatcher: WorkerDispatcher,
        notifier: Arc<Notifier>,
        registry: Arc<RouteRegistry>,
    ) -> Self {
        Self {
            store,
            dispatcher,
            notifier,
            registry,
        }
    }

    /// Run one event through the full chain. Never fails the process:
    /// every path converges on a terminal [`Outcome`].
    pub async fn process(&self, event: &InboundEvent, decision: &RoutingDecision) -> Outcome {
        info!(
            message_id = %event.message_id,
            conversation_id = %event.conversation_id,
            route = %decision.route,
            "Processing inbound event"
        );

        // Dedup check. Read failures fail open.
        match self.store.find_by_message_id(&event.message_id).await {
            Ok(Some(existing)) => {
                info!(
                    message_id = %event.message_id,
                    record_id = %existing.record_id,
                    "Duplicate delivery; dropping silently"
                );
                return Outcome::Duplicate;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Dedup lookup failed; proceeding without protection"),
        }

        // Pending clarification for this thread. This reply supersedes it:
        // the new decision wins and the old record is closed out.
        match self.store.find_pending_clarify(&event.conversation_id).await {
            Ok(Some(pending)) => {
                info!(
                    record_id = %pending.record_id,
                    "Reply resolves a pending clarification"
                );
                if let Err(e) = self
                    .store
                    .update_traffic_status(&pending.record_id, TrafficStatus::Superseded)
                    .await
                {
                    warn!(error = %e, "Could not mark clarification superseded");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Pending-clarify lookup failed; proceeding"),
        }

        let mut payload = WorkerPayload::new(event, decision);
        self.hydrate_candidates(&mut payload).await;
        if matches!(payload.route, Route::Wip | Route::Tracker) {
            self.hydrate_client_name(&mut payload).await;
        }

        // Log the pending record before dispatch. A failed write loses
        // dedup protection for this event but does not stop it.
        let record = NewTrafficRecord {
            message_id: payload.message_id.clone(),
            conversation_id: payload.conversation_id.clone(),
            route: payload.route,
            status: TrafficStatus::Pending,
            job_number: payload.job_number.clone(),
            client_code: payload.client_code.clone(),
            sender_email: payload.sender_email.clone(),
            subject_line: payload.subject_line.clone(),
        };
        let record_id = match self.store.create_traffic_record(&record).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "Traffic log write failed; continuing without it");
                None
            }
        };

        let result = self.dispatcher.dispatch(&payload).await;
        self.settle(&payload, record_id, result).await
    }

    /// Apply the dispatch result: one status transition, one class of
    /// outbound notification.
    async fn settle(
        &self,
        payload: &WorkerPayload,
        record_id: Option<String>,
        result: DispatchResult,
    ) -> Outcome {
        let route = payload.route;

        if result.success {
            if result.status == DispatchStatus::NotBuilt {
                self.mark(record_id.as_deref(), TrafficStatus::Completed).await;
                if let Err(e) = self.notifier.send_not_built(payload).await {
                    warn!(error = %e, "Not-built notice failed");
                }
                return Outcome::NotBuilt { route, record_id };
            }

            if route == Route::Clarify {
                // The clarification mail went out; the record stays pending
                // until the sender's reply closes the loop.
                return Outcome::ClarifyPending { route, record_id };
            }

            self.mark(record_id.as_deref(), TrafficStatus::Completed).await;
            if !self.registry.self_notifies(route) {
                self.confirm_and_post(payload).await;
            }
            return Outcome::Completed { route, record_id };
        }

        if result.status == DispatchStatus::Unknown {
            error!(%route, "Routing decision names an unregistered route");
            self.mark(record_id.as_deref(), TrafficStatus::Failed).await;
            return Outcome::UnknownRoute { route };
        }

        let error_text = result
            .error
            .unwrap_or_else(|| "dispatch failed".to_string());
        self.mark(record_id.as_deref(), TrafficStatus::Failed).await;
        if !self.registry.self_notifies(route)
            && let Err(e) = self
                .notifier
                .send_failure(payload, None, None, &error_text)
                .await
        {
            warn!(error = %e, "Failure notification failed");
        }
        Outcome::Failed {
            route,
            record_id,
            error: error_text,
        }
    }

    /// A candidate-list clarification with no candidates attached gets
    /// them from the hub's active-jobs view. Fail-open: an empty list
    /// still renders as a valid (if bare) clarification mail.
    async fn hydrate_candidates(&self, payload: &mut WorkerPayload) {
        let wants_candidates = payload.route == Route::Confirm
            || (payload.route == Route::Clarify
                && payload.clarify_kind == Some(ClarifyKind::Confirm));
        if !wants_candidates || !payload.possible_jobs.is_empty() {
            return;
        }
        let Some(code) = payload.client_code.as_deref() else {
            return;
        };
        match self.store.active_jobs(code).await {
            Ok(jobs) => payload.possible_jobs = jobs,
            Err(e) => warn!(client = code, error = %e, "Active-jobs lookup failed"),
        }
    }

    /// Redirect copy names the client; the display name is resolved here
    /// so the mail path needs no store access. Fail-open: without a name
    /// the copy falls back to the client code.
    async fn hydrate_client_name(&self, payload: &mut WorkerPayload) {
        if payload.client_name.is_some() {
            return;
        }
        let Some(code) = payload.client_code.as_deref() else {
            return;
        };
        match self.store.find_client_name(code).await {
            Ok(name) => payload.client_name = name,
            Err(e) => warn!(client = code, error = %e, "Client name lookup failed"),
        }
    }

    /// Best-effort status transition.
    async fn mark(&self, record_id: Option<&str>, status: TrafficStatus) {
        if let Some(id) = record_id
            && let Err(e) = self.store.update_traffic_status(id, status).await
        {
            warn!(record_id = id, status = status.as_str(), error = %e, "Traffic status update failed");
        }
    }

    /// Confirmation mail plus a team-channel summary, both best-effort.
    /// Project context is hydrated for richer copy; lookups fail open.
    async fn confirm_and_post(&self, payload: &WorkerPayload) {
        let project: Option<Project> = match payload.job_number.as_deref() {
            Some(job) => self.store.find_project(job).await.unwrap_or_else(|e| {
                warn!(error = %e, "Project lookup failed");
                None
            }),
            None => None,
        };

        // The hub is the fallback source for the display name when the
        // project row is missing or incomplete.
        let job_name = match &project {
            Some(p) if !p.job_name.is_empty() => Some(p.job_name.clone()),
            _ => match payload.job_number.as_deref() {
                Some(job) => self
                    .store
                    .job_by_number(job)
                    .await
                    .unwrap_or(None)
                    .map(|j| j.job_name),
                None => None,
            },
        };

        let client_code = payload
            .client_code
            .clone()
            .or_else(|| project.as_ref().and_then(|p| p.client_code.clone()));

        let client_name = match &project {
            Some(p) if p.client_name.is_some() => p.client_name.clone(),
            _ => match client_code.as_deref() {
                Some(code) => self.store.find_client_name(code).await.unwrap_or(None),
                None => None,
            },
        };

        if let Err(e) = self
            .notifier
            .send_confirmation(payload, job_name.as_deref(), client_name.as_deref())
            .await
        {
            warn!(error = %e, "Confirmation failed");
        }

        let Some(project) = project else { return };
        let team_id = match client_code.as_deref() {
            Some(code) => self.store.find_team_id(code).await.unwrap_or(None),
            None => None,
        };

        let message = format!("{} for {}.", action_label(payload.route), project.job_number);
        match self
            .notifier
            .post_to_channel(
                team_id.as_deref(),
                project.channel_id.as_deref(),
                None,
                &message,
                Some(&project.job_number),
                Some(&payload.body_text),
            )
            .await
        {
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Channel summary post failed"),
        }
    }
}
