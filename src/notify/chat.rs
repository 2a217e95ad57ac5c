//! Chat sink — team-channel posts, delivered by the external chat service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::NotifyError;
use crate::notify::SinkReceipt;

/// One channel post, as posted to the chat service.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelPost {
    pub team_id: String,
    pub channel_id: String,
    pub subject: String,
    pub message: String,
    pub job_number: String,
}

/// Chat delivery seam.
#[async_trait]
pub trait ChatSink: Send + Sync {
    async fn post(&self, post: &ChannelPost) -> Result<SinkReceipt, NotifyError>;
}

/// HTTP chat sink; unset URL degrades to `WouldSend` like the mail sink.
pub struct HttpChatSink {
    client: reqwest::Client,
    url: Option<String>,
}

impl HttpChatSink {
    pub fn new(url: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build chat sink HTTP client");
        Self { client, url }
    }
}

#[async_trait]
impl ChatSink for HttpChatSink {
    async fn post(&self, post: &ChannelPost) -> Result<SinkReceipt, NotifyError> {
        let Some(url) = self.url.as_deref() else {
            warn!(job = %post.job_number, "Chat sink not configured; reporting would-send");
            return Ok(SinkReceipt::WouldSend {
                payload: serde_json::to_value(post).unwrap_or_default(),
            });
        };

        let response = self
            .client
            .post(url)
            .json(post)
            .send()
            .await
            .map_err(|e| NotifyError::Http {
                sink: "chat",
                reason: e.to_string(),
            })?;

        let status = response.status().as_u16();
        if matches!(status, 200 | 202) {
            info!(channel = %post.channel_id, status, "Channel post delivered");
            Ok(SinkReceipt::Delivered { status })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotifyError::Delivery {
                sink: "chat",
                status,
                body,
            })
        }
    }
}
