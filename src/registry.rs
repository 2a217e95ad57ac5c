//! Static route registry — route name to endpoint, lifecycle, and sink kind.
//!
//! Built once at startup from configuration and never mutated at runtime.
//! Tests inject their own registry instead of touching global state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::config::WorkerEndpoints;
use crate::event::Route;

/// Whether a route's backing worker is live, under test, or not yet built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    Live,
    Testing,
    NotBuilt,
}

/// What kind of sink sits behind a route.
///
/// `Mail` routes communicate solely by sending an email (clarify, confirm,
/// answer, redirects) — the dispatcher hands them to the notifier instead
/// of posting to a worker endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkKind {
    Worker,
    Mail,
}

/// One registry entry.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub endpoint: Option<String>,
    pub lifecycle: Lifecycle,
    pub sink: SinkKind,
    /// Routes that send their own email suppress the generic
    /// confirmation/failure notification to avoid double-messaging.
    pub self_notifies: bool,
}

impl RouteEntry {
    fn worker(endpoint: Option<String>, lifecycle: Lifecycle) -> Self {
        Self {
            endpoint,
            lifecycle,
            sink: SinkKind::Worker,
            self_notifies: false,
        }
    }

    fn mail() -> Self {
        Self {
            endpoint: None,
            lifecycle: Lifecycle::Live,
            sink: SinkKind::Mail,
            self_notifies: true,
        }
    }
}

/// The route table. An explicit value injected at construction — no
/// global mutable state.
#[derive(Debug, Clone)]
pub struct RouteRegistry {
    entries: HashMap<Route, RouteEntry>,
}

impl RouteRegistry {
    pub fn new(entries: HashMap<Route, RouteEntry>) -> Self {
        Self { entries }
    }

    /// Production table: file/update workers are live, feedback and
    /// work-to-client are under test, the navigational routes are not
    /// built yet, and the conversational routes are mail-only.
    pub fn with_endpoints(workers: &WorkerEndpoints) -> Self {
        let mut entries = HashMap::new();
        for route in Route::ALL {
            let entry = match route {
                Route::File => RouteEntry::worker(workers.file.clone(), Lifecycle::Live),
                Route::Update => RouteEntry::worker(workers.update.clone(), Lifecycle::Live),
                Route::Feedback => {
                    RouteEntry::worker(workers.feedback.clone(), Lifecycle::Testing)
                }
                Route::WorkToClient => {
                    RouteEntry::worker(workers.work_to_client.clone(), Lifecycle::Testing)
                }
                Route::Triage | Route::Incoming | Route::Todo => {
                    RouteEntry::worker(None, Lifecycle::NotBuilt)
                }
                Route::Wip
                | Route::Tracker
                | Route::Clarify
                | Route::Confirm
                | Route::Answer => RouteEntry::mail(),
            };
            entries.insert(route, entry);
        }
        Self { entries }
    }

    pub fn entry(&self, route: Route) -> Option<&RouteEntry> {
        self.entries.get(&route)
    }

    /// Does this route send its own email? Unknown routes don't notify
    /// either way.
    pub fn self_notifies(&self, route: Route) -> bool {
        self.entries.get(&route).is_some_and(|e| e.self_notifies)
    }
}
