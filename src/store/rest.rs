//! REST implementation of [`RecordStore`].
//!
//! Traffic, project, and client rows live in a remote tabular store
//! (filter-formula queries, flat field maps); job summaries come from the
//! hub API, which is the single source of truth for job data.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::event::{JobSummary, Route, normalize_job_number};
use crate::store::{NewTrafficRecord, Project, RecordStore, TrafficRecord, TrafficStatus};

const TRAFFIC_TABLE: &str = "Traffic";
const PROJECTS_TABLE: &str = "Projects";
const CLIENTS_TABLE: &str = "Clients";

/// HTTP-backed record store.
pub struct RestStore {
    http: reqwest::Client,
    cfg: StoreConfig,
    hub_url: String,
}

impl RestStore {
    pub fn new(cfg: StoreConfig, hub_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .expect("Failed to build store HTTP client");
        Self {
            http,
            cfg,
            hub_url: hub_url.into(),
        }
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/{}/{}", self.cfg.base_url, self.cfg.base_id, table)
    }

    fn token(&self) -> Option<String> {
        self.cfg
            .api_token
            .as_ref()
            .map(|t| t.expose_secret().to_string())
    }

    /// Run a filter-formula query and return the first matching record.
    /// The store may hold more than one row per key; the first returned
    /// record is authoritative.
    async fn first_match(
        &self,
        table: &str,
        formula: &str,
    ) -> Result<Option<Value>, StoreError> {
        let Some(token) = self.token() else {
            debug!(table, "Store token not configured; lookup reports not-found");
            return Ok(None);
        };

        let response = self
            .http
            .get(self.table_url(table))
            .bearer_auth(token)
            .query(&[("filterByFormula", formula), ("maxRecords", "1")])
            .send()
            .await
            .map_err(|e| StoreError::Read {
                table: table.to_string(),
                reason: e.to_string(),
            })?;

        if !response.status().is_success() {
            return Err(StoreError::Read {
                table: table.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let body: Value = response.json().await.map_err(|e| StoreError::Malformed {
            table: table.to_string(),
            reason: e.to_string(),
        })?;

        Ok(body
            .get("records")
            .and_then(Value::as_array)
            .and_then(|records| records.first())
            .cloned())
    }
}

#[async_trait]
impl RecordStore for RestStore {
    async fn find_by_message_id(
        &self,
        message_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError> {
        let formula = exact_filter("messageId", message_id);
        match self.first_match(TRAFFIC_TABLE, &formula).await? {
            Some(record) => Ok(Some(parse_traffic(&record)?)),
            None => Ok(None),
        }
    }

    async fn find_pending_clarify(
        &self,
        conversation_id: &str,
    ) -> Result<Option<TrafficRecord>, StoreError> {
        let formula = pending_clarify_filter(conversation_id);
        match self.first_match(TRAFFIC_TABLE, &formula).await? {
            Some(record) => Ok(Some(parse_traffic(&record)?)),
            None => Ok(None),
        }
    }

    async fn create_traffic_record(
        &self,
        record: &NewTrafficRecord,
    ) -> Result<String, StoreError> {
        let Some(token) = self.token() else {
            return Err(StoreError::Write {
                table: TRAFFIC_TABLE.to_string(),
                reason: "store token not configured".to_string(),
            });
        };

        let body = json!({ "fields": traffic_fields(record, Utc::now()) });
        let response = self
            .http
            .post(self.table_url(TRAFFIC_TABLE))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Write {
                table: TRAFFIC_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                table: TRAFFIC_TABLE.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let created: Value = response.json().await.map_err(|e| StoreError::Malformed {
            table: TRAFFIC_TABLE.to_string(),
            reason: e.to_string(),
        })?;
        created
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| StoreError::Malformed {
                table: TRAFFIC_TABLE.to_string(),
                reason: "create response missing record id".to_string(),
            })
    }

    async fn update_traffic_status(
        &self,
        record_id: &str,
        status: TrafficStatus,
    ) -> Result<(), StoreError> {
        let Some(token) = self.token() else {
            return Err(StoreError::Write {
                table: TRAFFIC_TABLE.to_string(),
                reason: "store token not configured".to_string(),
            });
        };

        let url = format!("{}/{}", self.table_url(TRAFFIC_TABLE), record_id);
        let body = json!({ "fields": { "status": status.as_str() } });
        let response = self
            .http
            .patch(url)
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| StoreError::Write {
                table: TRAFFIC_TABLE.to_string(),
                reason: e.to_string(),
            })?;

        let http_status = response.status();
        if !http_status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Rejected {
                table: TRAFFIC_TABLE.to_string(),
                status: http_status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    async fn find_project(&self, job_number: &str) -> Result<Option<Project>, StoreError> {
        let canonical = normalize_job_number(job_number);
        let formula = exact_filter("Job Number", &canonical);
        let Some(record) = self.first_match(PROJECTS_TABLE, &formula).await? else {
            return Ok(None);
        };

        let fields = record.get("fields").cloned().unwrap_or_else(|| json!({}));
        let record_id = record
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        // Client code falls back to the job number prefix ("LAB 055" → "LAB").
        let client_code = field_str(&fields, "Client Code")
            .or_else(|| canonical.split_whitespace().next().map(str::to_string));

        Ok(Some(Project {
            record_id,
            job_number: field_str(&fields, "Job Number").unwrap_or(canonical),
            job_name: field_str(&fields, "Project Name").unwrap_or_default(),
            client_name: field_str(&fields, "Client"),
            client_code,
            stage: field_str(&fields, "Stage").unwrap_or_default(),
            status: field_str(&fields, "Status").unwrap_or_default(),
            with_client: fields
                .get("With Client?")
                .and_then(Value::as_bool)
                .unwrap_or(false),
            channel_id: field_str(&fields, "Channel ID"),
        }))
    }

    async fn find_team_id(&self, client_code: &str) -> Result<Option<String>, StoreError> {
        let formula = exact_filter("Client Code", client_code);
        Ok(self
            .first_match(CLIENTS_TABLE, &formula)
            .await?
            .and_then(|record| {
                record
                    .get("fields")
                    .and_then(|f| field_str(f, "Team ID"))
            }))
    }

    async fn find_client_name(&self, client_code: &str) -> Result<Option<String>, StoreError> {
        let formula = exact_filter("Client Code", client_code);
        Ok(self
            .first_match(CLIENTS_TABLE, &formula)
            .await?
            .and_then(|record| {
                record
                    .get("fields")
                    .and_then(|f| field_str(f, "Client Name"))
            }))
    }

    async fn active_jobs(&self, client_code: &str) -> Result<Vec<JobSummary>, StoreError> {
        let url = format!(
            "{}/api/jobs/all?status=active&client={}",
            self.hub_url, client_code
        );
        let response = self.http.get(url).send().await.map_err(|e| StoreError::Read {
            table: "hub:jobs".to_string(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(StoreError::Read {
                table: "hub:jobs".to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json().await.map_err(|e| StoreError::Malformed {
            table: "hub:jobs".to_string(),
            reason: e.to_string(),
        })
    }

    async fn job_by_number(&self, job_number: &str) -> Result<Option<JobSummary>, StoreError> {
        let canonical = normalize_job_number(job_number);
        let url = format!("{}/api/job/{}", self.hub_url, encode_job_number(&canonical));
        let response = self.http.get(url).send().await.map_err(|e| StoreError::Read {
            table: "hub:job".to_string(),
            reason: e.to_string(),
        })?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(StoreError::Read {
                table: "hub:job".to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        response.json().await.map_err(|e| StoreError::Malformed {
            table: "hub:job".to_string(),
            reason: e.to_string(),
        })
    }
}

// ── Formula and field helpers ───────────────────────────────────────

/// Exact-match filter formula on a single field.
fn exact_filter(field: &str, value: &str) -> String {
    format!("{{{field}}}='{}'", escape_formula_value(value))
}

/// Pending clarification: status and route constrained alongside the
/// conversation id so completed/failed records are never returned.
fn pending_clarify_filter(conversation_id: &str) -> String {
    format!(
        "AND({{conversationId}}='{}', {{status}}='pending', {{route}}='clarify')",
        escape_formula_value(conversation_id)
    )
}

/// Single quotes would terminate the formula literal.
fn escape_formula_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn encode_job_number(canonical: &str) -> String {
    canonical.replace(' ', "%20")
}

fn field_str(fields: &Value, key: &str) -> Option<String> {
    match fields.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        // Linked fields come back as a list; take the first entry.
        Value::Array(items) => items
            .iter()
            .find_map(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

/// Flat field map for a traffic create.
fn traffic_fields(record: &NewTrafficRecord, created_at: DateTime<Utc>) -> Value {
    json!({
        "messageId": record.message_id,
        "conversationId": record.conversation_id,
        "route": record.route.as_str(),
        "status": record.status.as_str(),
        "jobNumber": record.job_number.clone().unwrap_or_default(),
        "clientCode": record.client_code.clone().unwrap_or_default(),
        "senderEmail": record.sender_email,
        "subjectLine": record.subject_line,
        "createdAt": created_at.to_rfc3339(),
    })
}

/// Traffic row fields as stored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrafficFields {
    #[serde(default)]
    message_id: String,
    #[serde(default)]
    conversation_id: String,
    route: Route,
    status: TrafficStatus,
    #[serde(default)]
    job_number: Option<String>,
    #[serde(default)]
    client_code: Option<String>,
    #[serde(default)]
    sender_email: String,
    #[serde(default)]
    subject_line: String,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
}

fn parse_traffic(record: &Value) -> Result<TrafficRecord, StoreError> {
    let record_id = record
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let fields = record.get("fields").cloned().unwrap_or_else(|| json!({}));
    let fields: TrafficFields =
        serde_json::from_value(fields).map_err(|e| StoreError::Malformed {
            table: TRAFFIC_TABLE.to_string(),
            reason: e.to_string(),
        })?;

    Ok(TrafficRecord {
        record_id,
        message_id: fields.message_id,
        conversation_id: fields.conversation_id,
        route: fields.route,
        status: fields.status,
        job_number: fields.job_number.filter(|j| !j.is_empty()),
        client_code: fields.client_code.filter(|c| !c.is_empty()),
        sender_email: fields.sender_email,
        subject_line: fields.subject_line,
        created_at: fields.created_at.unwrap_or_else(Utc::now),
    })
}
