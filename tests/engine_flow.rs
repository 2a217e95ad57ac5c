//! End-to-end flows through the public engine API, with in-memory fakes
//! standing in for the store, workers, and notification sinks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};

use traffic_engine::config::WorkerEndpoints;
use traffic_engine::dispatch::{WorkerDispatcher, WorkerTransport};
use traffic_engine::engine::{Outcome, TrafficEngine};
use traffic_engine::error::{DispatchError, NotifyError, StoreError};
use traffic_engine::event::{
    ClarifyKind, InboundEvent, JobSummary, Route, RoutingDecision, WorkerPayload,
};
use traffic_engine::notify::chat::{ChannelPost, ChatSink};
use traffic_engine::notify::mail::{MailSink, OutboundEmail};
use traffic_engine::notify::{Notifier, SinkReceipt};
use traffic_engine::registry::RouteRegistry;
use traffic_engine::store::{
    NewTrafficRecord, Project, RecordStore, TrafficRecord, TrafficStatus,
};

// ── In-memory fakes ─────────────────────────────────────────────────────

/// Store fake that behaves like the real one: records created here are
/// found by later dedup and pending-clarify lookups.
#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<TrafficRecord>>,
    projects: Mutex<HashMap<String, Project>>,
    fail_create: bool,
}

impl MemoryStore {
    fn with_project(self, project: Project) -> Self {
        self.projects
            .lock()
            .unwrap()
            .insert(project.job_number.clone(), project);
        self
    }

    fn record(&self, record_id: &str) -> Option<TrafficRecord> {
        self.records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.record_id == record_id)
            .cloned()
    }

    fn count(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.message_id == message_id)
            .cloned())
    }

    async fn find_pending_clarify(
        &self,
        conversation_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .find(|r| {
                r.conversation_id == conversation_id
                    && r.route == Route::Clarify
                    && r.status == TrafficStatus::Pending
            })
            .cloned())
    }

    async fn create_traffic_record(
        &self,
        record: &NewTrafficRecord,
    ) -> Result<String, StoreError> {
        if self.fail_create {
            return Err(StoreError::Rejected {
                table: "Traffic".to_string(),
                status: 503,
                body: "service unavailable".to_string(),
            });
        }
        let mut records = self.records.lock().unwrap();
        let record_id = format!("rec-{}", records.len() + 1);
        records.push(TrafficRecord {
            record_id: record_id.clone(),
            message_id: record.message_id.clone(),
            conversation_id: record.conversation_id.clone(),
            route: record.route,
            status: record.status,
            job_number: record.job_number.clone(),
            client_code: record.client_code.clone(),
            sender_email: record.sender_email.clone(),
            subject_line: record.subject_line.clone(),
            created_at: Utc::now(),
        });
        Ok(record_id)
    }

    async fn update_traffic_status(
        &self,
        record_id: &str,
        status: TrafficStatus,
    ) -> Result<(), StoreError> {
        let mut records = self.records.lock().unwrap();
        match records.iter_mut().find(|r| r.record_id == record_id) {
            Some(record) => {
                record.status = status;
                Ok(())
            }
            None => Err(StoreError::Write {
                table: "Traffic".to_string(),
                reason: format!("no record {record_id}"),
            }),
        }
    }

    async fn find_project(&self, job_number: &str) -> Result<Option<Project>, StoreError> {
        Ok(self.projects.lock().unwrap().get(job_number).cloned())
    }

    async fn find_team_id(&self, _client_code: &str) -> Result<Option<String>, StoreError> {
        Ok(Some("team-1".to_string()))
    }

    async fn find_client_name(&self, _client_code: &str) -> Result<Option<String>, StoreError> {
        Ok(Some("Labfresh".to_string()))
    }

    async fn active_jobs(&self, _client_code: &str) -> Result<Vec<JobSummary>, StoreError> {
        Ok(vec![])
    }

    async fn job_by_number(&self, _job_number: &str) -> Result<Option<JobSummary>, StoreError> {
        Ok(None)
    }
}

#[derive(Default)]
struct RecordingTransport {
    calls: Mutex<Vec<(String, Route)>>,
    fail_with: Option<String>,
}

#[async_trait]
impl WorkerTransport for RecordingTransport {
    async fn call(&self, endpoint: &str, payload: &WorkerPayload) -> Result<Value, DispatchError> {
        self.calls
            .lock()
            .unwrap()
            .push((endpoint.to_string(), payload.route));
        match &self.fail_with {
            Some(body) => Err(DispatchError::Endpoint {
                route: payload.route,
                status: 500,
                body: body.clone(),
            }),
            None => Ok(json!({ "ok": true })),
        }
    }
}

#[derive(Default)]
struct RecordingMail {
    sent: Mutex<Vec<OutboundEmail>>,
}

#[async_trait]
impl MailSink for RecordingMail {
    async fn send(&self, mail: &OutboundEmail) -> Result<SinkReceipt, NotifyError> {
        self.sent.lock().unwrap().push(mail.clone());
        Ok(SinkReceipt::Delivered { status: 200 })
    }
}

#[derive(Default)]
struct RecordingChat {
    posted: Mutex<Vec<ChannelPost>>,
}

#[async_trait]
impl ChatSink for RecordingChat {
    async fn post(&self, post: &ChannelPost) -> Result<SinkReceipt, NotifyError> {
        self.posted.lock().unwrap().push(post.clone());
        Ok(SinkReceipt::Delivered { status: 200 })
    }
}

// ── Harness ─────────────────────────────────────────────────────────────

struct Harness {
    store: Arc<MemoryStore>,
    mail: Arc<RecordingMail>,
    chat: Arc<RecordingChat>,
    transport: Arc<RecordingTransport>,
    engine: TrafficEngine,
}

fn harness(store: MemoryStore, transport: RecordingTransport) -> Harness {
    let store = Arc::new(store);
    let mail = Arc::new(RecordingMail::default());
    let chat = Arc::new(RecordingChat::default());
    let transport = Arc::new(transport);

    let registry = Arc::new(RouteRegistry::with_endpoints(&WorkerEndpoints {
        file: Some("https://workers.example.com/file".into()),
        update: Some("https://workers.example.com/update".into()),
        feedback: None,
        work_to_client: None,
    }));
    let notifier = Arc::new(Notifier::new(
        mail.clone() as Arc<dyn MailSink>,
        chat.clone() as Arc<dyn ChatSink>,
        "https://hub.example.com",
    ));
    let dispatcher = WorkerDispatcher::new(
        registry.clone(),
        transport.clone() as Arc<dyn WorkerTransport>,
        notifier.clone(),
    );
    let engine = TrafficEngine::new(
        store.clone() as Arc<dyn RecordStore>,
        dispatcher,
        notifier,
        registry,
    );

    Harness {
        store,
        mail,
        chat,
        transport,
        engine,
    }
}

fn lab_project() -> Project {
    Project {
        record_id: "prj-1".to_string(),
        job_number: "LAB 055".to_string(),
        job_name: "Packaging refresh".to_string(),
        client_name: Some("Labfresh".to_string()),
        client_code: Some("LAB".to_string()),
        stage: "In design".to_string(),
        status: "Active".to_string(),
        with_client: false,
        channel_id: Some("channel-1".to_string()),
    }
}

fn event(message_id: &str, conversation_id: &str) -> InboundEvent {
    InboundEvent {
        message_id: message_id.to_string(),
        conversation_id: conversation_id.to_string(),
        sender_email: "anna@client.example".to_string(),
        sender_name: Some("Anna Reid".to_string()),
        subject_line: "Files for LAB 055".to_string(),
        received_at: Utc::now(),
        body_text: "Latest artwork attached, please file.".to_string(),
    }
}

fn decision(route: Route) -> RoutingDecision {
    RoutingDecision {
        route,
        clarify_kind: None,
        job_number: Some("LAB 055".to_string()),
        possible_jobs: vec![],
        client_code: Some("LAB".to_string()),
        reply: None,
    }
}

// ── Scenarios ───────────────────────────────────────────────────────────

#[tokio::test]
async fn file_request_completes_with_one_confirmation() {
    let h = harness(
        MemoryStore::default().with_project(lab_project()),
        RecordingTransport::default(),
    );

    let outcome = h.engine.process(&event("M1", "C1"), &decision(Route::File)).await;
    let Outcome::Completed { route, record_id } = outcome else {
        panic!("expected Completed");
    };
    assert_eq!(route, Route::File);

    // One worker call to the file endpoint.
    let calls = h.transport.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "https://workers.example.com/file");

    // Record ends up completed.
    let record = h.store.record(record_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.status, TrafficStatus::Completed);
    assert_eq!(record.message_id, "M1");

    // Exactly one confirmation mail, with the hydrated job name.
    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.starts_with("Re:"));
    assert!(sent[0].body.contains("Packaging refresh"));

    // And one channel summary on the project's channel.
    let posted = h.chat.posted.lock().unwrap();
    assert_eq!(posted.len(), 1);
    assert_eq!(posted[0].channel_id, "channel-1");
    assert!(posted[0].message.contains("Files filed"));
    assert!(posted[0].message.contains("Latest artwork attached"));
}

#[tokio::test]
async fn redelivery_of_processed_message_changes_nothing() {
    let h = harness(
        MemoryStore::default().with_project(lab_project()),
        RecordingTransport::default(),
    );

    let first = h.engine.process(&event("M1", "C1"), &decision(Route::File)).await;
    assert!(matches!(first, Outcome::Completed { .. }));

    let second = h.engine.process(&event("M1", "C1"), &decision(Route::File)).await;
    assert_eq!(second, Outcome::Duplicate);

    assert_eq!(h.store.count(), 1);
    assert_eq!(h.transport.calls.lock().unwrap().len(), 1);
    assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
    assert_eq!(h.chat.posted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn not_built_route_notices_without_calling_a_worker() {
    let h = harness(MemoryStore::default(), RecordingTransport::default());

    let outcome = h.engine.process(&event("M2", "C2"), &decision(Route::Todo)).await;
    let Outcome::NotBuilt { record_id, .. } = outcome else {
        panic!("expected NotBuilt");
    };

    // No worker traffic; record closed out as completed.
    assert!(h.transport.calls.lock().unwrap().is_empty());
    let record = h.store.record(record_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.status, TrafficStatus::Completed);

    // The sender hears the feature is not available yet.
    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("coming soon") || sent[0].body.contains("Coming Soon"));
}

#[tokio::test]
async fn clarify_leaves_the_record_pending() {
    let h = harness(MemoryStore::default(), RecordingTransport::default());

    let mut d = decision(Route::Clarify);
    d.clarify_kind = Some(ClarifyKind::JobNotFound);
    d.job_number = Some("LAB 999".to_string());

    let outcome = h.engine.process(&event("M3", "C3"), &d).await;
    let Outcome::ClarifyPending { record_id, .. } = outcome else {
        panic!("expected ClarifyPending");
    };

    // One clarification mail naming the missing job.
    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("LAB 999"));

    // The record stays pending until the sender replies.
    let record = h.store.record(record_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.status, TrafficStatus::Pending);
    assert!(h.transport.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn reply_to_clarification_supersedes_it() {
    let h = harness(
        MemoryStore::default().with_project(lab_project()),
        RecordingTransport::default(),
    );

    let mut clarify = decision(Route::Clarify);
    clarify.clarify_kind = Some(ClarifyKind::NoIdea);
    clarify.job_number = None;
    let first = h.engine.process(&event("M4", "C4"), &clarify).await;
    let Outcome::ClarifyPending { record_id, .. } = first else {
        panic!("expected ClarifyPending");
    };
    let clarify_id = record_id.unwrap();

    // The sender replies in the same thread and the classifier now has
    // enough to route for real.
    let second = h.engine.process(&event("M5", "C4"), &decision(Route::File)).await;
    assert!(matches!(second, Outcome::Completed { .. }));

    let old = h.store.record(&clarify_id).unwrap();
    assert_eq!(old.status, TrafficStatus::Superseded);
}

#[tokio::test]
async fn worker_error_fails_the_record_and_tells_the_sender() {
    let h = harness(
        MemoryStore::default(),
        RecordingTransport {
            fail_with: Some("folder quota exceeded".to_string()),
            ..Default::default()
        },
    );

    let outcome = h.engine.process(&event("M6", "C6"), &decision(Route::File)).await;
    let Outcome::Failed {
        record_id, error, ..
    } = outcome
    else {
        panic!("expected Failed");
    };
    assert!(error.contains("folder quota exceeded"));

    let record = h.store.record(record_id.as_deref().unwrap()).unwrap();
    assert_eq!(record.status, TrafficStatus::Failed);

    // The failure mail carries the raw error text.
    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.starts_with("Did not compute"));
    assert!(sent[0].body.contains("folder quota exceeded"));
}

#[tokio::test]
async fn failed_record_write_does_not_stop_the_event() {
    let store = MemoryStore {
        fail_create: true,
        ..Default::default()
    }
    .with_project(lab_project());
    let h = harness(store, RecordingTransport::default());

    let outcome = h.engine.process(&event("M8", "C8"), &decision(Route::File)).await;
    let Outcome::Completed { record_id, .. } = outcome else {
        panic!("expected Completed");
    };

    // No record to reference, but the event still went all the way
    // through: worker called, confirmation and summary sent.
    assert!(record_id.is_none());
    assert_eq!(h.store.count(), 0);
    assert_eq!(h.transport.calls.lock().unwrap().len(), 1);
    assert_eq!(h.mail.sent.lock().unwrap().len(), 1);
    assert_eq!(h.chat.posted.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn self_notifying_route_sends_its_own_mail_only() {
    let h = harness(MemoryStore::default(), RecordingTransport::default());

    let mut d = decision(Route::Wip);
    d.job_number = None;
    let outcome = h.engine.process(&event("M7", "C7"), &d).await;
    assert!(matches!(outcome, Outcome::Completed { .. }));

    // The redirect itself, and nothing stacked on top of it. The link
    // text carries the client's display name, not the raw code.
    let sent = h.mail.sent.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("Open Labfresh WIP"));
    assert!(sent[0].body.contains("?client=LAB&view=wip"));
    assert!(h.chat.posted.lock().unwrap().is_empty());
}
