//! Record store — typed access to the remote tabular store.
//!
//! Pure CRUD and filtered lookup; no business logic. Every lookup uses an
//! exact-match filter on one identifying field, and the first returned
//! record is authoritative when the store holds more than one.

pub mod rest;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::event::{JobSummary, Route};

pub use rest::RestStore;

// ── Traffic records ─────────────────────────────────────────────────

/// Processing state of one logged inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrafficStatus {
    /// Created before the worker is called.
    Pending,
    Completed,
    Failed,
    /// A pending clarification answered by a later reply in the thread.
    Superseded,
}

impl TrafficStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrafficStatus::Pending => "pending",
            TrafficStatus::Completed => "completed",
            TrafficStatus::Failed => "failed",
            TrafficStatus::Superseded => "superseded",
        }
    }
}

/// Persisted log/state entry, one per processed inbound event.
///
/// Created and mutated exclusively by the engine; read by the dedup and
/// pending-clarify lookups.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrafficRecord {
    pub record_id: String,
    pub message_id: String,
    pub conversation_id: String,
    pub route: Route,
    pub status: TrafficStatus,
    #[serde(default)]
    pub job_number: Option<String>,
    #[serde(default)]
    pub client_code: Option<String>,
    pub sender_email: String,
    pub subject_line: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new traffic record; the store assigns `record_id` and the
/// client stamps `created_at`.
#[derive(Debug, Clone)]
pub struct NewTrafficRecord {
    pub message_id: String,
    pub conversation_id: String,
    pub route: Route,
    pub status: TrafficStatus,
    pub job_number: Option<String>,
    pub client_code: Option<String>,
    pub sender_email: String,
    pub subject_line: String,
}

// ── Projects ────────────────────────────────────────────────────────

/// Project row, read for routing context (channel ids, display names).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub record_id: String,
    pub job_number: String,
    pub job_name: String,
    #[serde(default)]
    pub client_name: Option<String>,
    #[serde(default)]
    pub client_code: Option<String>,
    #[serde(default)]
    pub stage: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub with_client: bool,
    /// Team-channel id for chat posts, when the project has one.
    #[serde(default)]
    pub channel_id: Option<String>,
}

// ── Store contract ──────────────────────────────────────────────────

/// Backend-agnostic record store. Side effects are network calls only:
/// no local caching, no retries — a transient failure surfaces as an error
/// and the caller decides fail-open vs fail-closed.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Dedup lookup by the mail system's message id.
    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError>;

    /// Pending clarification for a conversation: `status = pending` and
    /// `route = clarify`, scoped to the given conversation id.
    async fn find_pending_clarify(
        &self,
        conversation_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError>;

    /// Create a traffic record; returns the store-assigned record id.
    async fn create_traffic_record(
        &self,
        record: &NewTrafficRecord,
    ) -> Result<String, StoreError>;

    /// Move a traffic record to a new status.
    async fn update_traffic_status(
        &self,
        record_id: &str,
        status: TrafficStatus,
    ) -> Result<(), StoreError>;

    /// Project lookup by job number.
    async fn find_project(&self, job_number: &str) -> Result<Option<Project>, StoreError>;

    /// Team id for a client code, from the clients table.
    async fn find_team_id(&self, client_code: &str) -> Result<Option<String>, StoreError>;

    /// Display name for a client code.
    async fn find_client_name(&self, client_code: &str) -> Result<Option<String>, StoreError>;

    /// Active jobs for a client, from the hub job API. Used to hydrate
    /// clarification candidate lists.
    async fn active_jobs(&self, client_code: &str) -> Result<Vec<JobSummary>, StoreError>;

    /// One job by number, from the hub job API.
    async fn job_by_number(&self, job_number: &str) -> Result<Option<JobSummary>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn traffic_status_wire_names() {
        assert_eq!(
            serde_json::to_string(&TrafficStatus::Pending).unwrap(),
            "\"pending\""
        );
        assert_eq!(
            serde_json::to_string(&TrafficStatus::Superseded).unwrap(),
            "\"superseded\""
        );
        assert_eq!(TrafficStatus::Failed.as_str(), "failed");
    }

    #[test]
    fn traffic_record_round_trips() {
        let record = TrafficRecord {
            record_id: "rec123".into(),
            message_id: "M1".into(),
            conversation_id: "C1".into(),
            route: Route::Clarify,
            status: TrafficStatus::Pending,
            job_number: Some("LAB 055".into()),
            client_code: Some("LAB".into()),
            sender_email: "anna@client.example".into(),
            subject_line: "Which job?".into(),
            created_at: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["route"], "clarify");
        assert_eq!(json["status"], "pending");
        let back: TrafficRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.record_id, "rec123");
        assert_eq!(back.status, TrafficStatus::Pending);
    }
}
