//! Shared types for inbound events and routing decisions.
//!
//! The classifier that turns raw email text into a `RoutingDecision` lives
//! outside this service; everything here is the structured contract between
//! that classifier, the engine, and the workers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Inbound event ───────────────────────────────────────────────────

/// One physical email (or chat message) as delivered by the mail system.
///
/// `message_id` is assigned by the source mail system and never repeats
/// unless the same physical message is redelivered — it is the dedup key.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    pub message_id: String,
    /// Groups a reply thread.
    pub conversation_id: String,
    pub sender_email: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub subject_line: String,
    pub received_at: DateTime<Utc>,
    pub body_text: String,
}

// ── Route ───────────────────────────────────────────────────────────

/// The named destination/workflow an event is dispatched to.
///
/// Closed enumeration: adding a route is a compile-time-checked change,
/// and the dispatch site matches exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    File,
    Update,
    Triage,
    Incoming,
    Wip,
    Todo,
    Tracker,
    WorkToClient,
    Feedback,
    Clarify,
    Confirm,
    Answer,
}

impl Route {
    /// Every route, for registry construction and exhaustiveness checks.
    pub const ALL: [Route; 12] = [
        Route::File,
        Route::Update,
        Route::Triage,
        Route::Incoming,
        Route::Wip,
        Route::Todo,
        Route::Tracker,
        Route::WorkToClient,
        Route::Feedback,
        Route::Clarify,
        Route::Confirm,
        Route::Answer,
    ];

    /// Wire name (kebab-case, matches serde).
    pub fn as_str(&self) -> &'static str {
        match self {
            Route::File => "file",
            Route::Update => "update",
            Route::Triage => "triage",
            Route::Incoming => "incoming",
            Route::Wip => "wip",
            Route::Todo => "todo",
            Route::Tracker => "tracker",
            Route::WorkToClient => "work-to-client",
            Route::Feedback => "feedback",
            Route::Clarify => "clarify",
            Route::Confirm => "confirm",
            Route::Answer => "answer",
        }
    }
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Route {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Route::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown route: '{s}'"))
    }
}

// ── Clarify kind ────────────────────────────────────────────────────

/// Which clarification message to send. Selected by the classifier,
/// never re-derived downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClarifyKind {
    /// One or more candidate jobs — ask which one.
    Confirm,
    /// No usable signal at all.
    NoIdea,
    /// A job number was given but does not exist.
    JobNotFound,
}

impl ClarifyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClarifyKind::Confirm => "confirm",
            ClarifyKind::NoIdea => "no_idea",
            ClarifyKind::JobNotFound => "job_not_found",
        }
    }
}

// ── Job summary ─────────────────────────────────────────────────────

/// Read-only job projection used for clarification cards and
/// confirmation copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSummary {
    pub job_number: String,
    pub job_name: String,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub update_due: Option<String>,
    #[serde(default)]
    pub with_client: bool,
    #[serde(default)]
    pub record_id: String,
}

// ── Routing decision ────────────────────────────────────────────────

/// Output of the external classifier, input to the engine.
///
/// Invariant: `clarify_kind` is set iff `route == Clarify` — checked by
/// [`RoutingDecision::is_coherent`] at the webhook boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    pub route: Route,
    #[serde(default)]
    pub clarify_kind: Option<ClarifyKind>,
    #[serde(default)]
    pub job_number: Option<String>,
    /// Ordered candidate jobs when the request was ambiguous.
    #[serde(default)]
    pub possible_jobs: Vec<JobSummary>,
    #[serde(default)]
    pub client_code: Option<String>,
    /// Answer body for the `answer` route, written by the classifier.
    #[serde(default)]
    pub reply: Option<String>,
}

impl RoutingDecision {
    /// `clarify_kind` must be present exactly when the route is `clarify`.
    pub fn is_coherent(&self) -> bool {
        (self.route == Route::Clarify) == self.clarify_kind.is_some()
    }
}

// ── Worker payload ──────────────────────────────────────────────────

/// Universal payload posted to every worker endpoint.
///
/// Carries all fields any worker needs; each worker reads what it wants.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerPayload {
    pub route: Route,
    pub message_id: String,
    pub conversation_id: String,
    pub sender_email: String,
    #[serde(default)]
    pub sender_name: Option<String>,
    pub subject_line: String,
    pub body_text: String,
    pub received_at: DateTime<Utc>,
    #[serde(default)]
    pub job_number: Option<String>,
    #[serde(default)]
    pub client_code: Option<String>,
    /// Display name for `client_code`, resolved by the engine when the
    /// outbound copy needs it. The classifier never sets this.
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub clarify_kind: Option<ClarifyKind>,
    #[serde(default)]
    pub possible_jobs: Vec<JobSummary>,
    #[serde(default)]
    pub reply: Option<String>,
}

impl WorkerPayload {
    /// Merge an event and its routing decision into the universal payload.
    pub fn new(event: &InboundEvent, decision: &RoutingDecision) -> Self {
        Self {
            route: decision.route,
            message_id: event.message_id.clone(),
            conversation_id: event.conversation_id.clone(),
            sender_email: event.sender_email.clone(),
            sender_name: event.sender_name.clone(),
            subject_line: event.subject_line.clone(),
            body_text: event.body_text.clone(),
            received_at: event.received_at,
            job_number: decision.job_number.as_deref().map(normalize_job_number),
            client_code: decision.client_code.clone(),
            client_name: None,
            clarify_kind: decision.clarify_kind,
            possible_jobs: decision.possible_jobs.clone(),
            reply: decision.reply.clone(),
        }
    }
}

/// Normalize a job number to its canonical form: underscores become
/// spaces, uppercased ("lab_055" → "LAB 055").
pub fn normalize_job_number(raw: &str) -> String {
    raw.trim().replace('_', " ").to_uppercase()
}
