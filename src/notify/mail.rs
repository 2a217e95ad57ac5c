//! Mail sink — the direct-message channel, delivered by the external
//! mail-send service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::event::WorkerPayload;
use crate::notify::SinkReceipt;

/// Quoted original-message block the mail service renders as a trail
/// under the reply.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyTrail {
    pub from: String,
    pub from_email: String,
    pub sent: String,
    pub subject: String,
    pub body: String,
}

impl ReplyTrail {
    pub fn from_payload(payload: &WorkerPayload) -> Self {
        Self {
            from: payload.sender_name.clone().unwrap_or_default(),
            from_email: payload.sender_email.clone(),
            sent: payload.received_at.to_rfc3339(),
            subject: payload.subject_line.clone(),
            body: payload.body_text.clone(),
        }
    }
}

/// One outbound email, as posted to the mail-send service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<ReplyTrail>,
}

/// Mail delivery seam. The HTTP implementation posts to the configured
/// service; tests substitute a recording double.
#[async_trait]
pub trait MailSink: Send + Sync {
    async fn send(&self, mail: &OutboundEmail) -> Result<SinkReceipt, NotifyError>;
}

/// HTTP mail sink. An unset URL degrades every send to a `WouldSend`
/// receipt describing the payload, so the rest of the flow keeps working.
pub struct HttpMailSink {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpMailSink {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build mail sink HTTP client");
        Self { client, url }
    }
}

#[async_trait]
impl MailSink for HttpMailSink {
    async fn send(&self, mail: &OutboundEmail) -> Result<SinkReceipt, NotifyError> {
        let Some(url) = self.url.as_deref() else {
            warn!(to = %mail.to, "Mail sink not configured; reporting would-send");
            return Ok(SinkReceipt::WouldSend {
                payload: serde_json::to_value(mail).unwrap_or_default(),
            });
        };

        let response = self
            .client
            .post(url)
            .json(mail)
            .send()
            .await
            .map_err(|e| NotifyError::Http {
                sink: "mail",
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        // 200 = accepted immediately, 202 = accepted for async delivery.
        // Every other code, 2xx included, is a rejection.
        if matches!(status, 200 | 202) {
            info!(to = %mail.to, status, "Mail delivered");
            Ok(SinkReceipt::Delivered { status })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Delivery {
                sink: "mail",
                status,
                body,
            })
        }
    }
}
