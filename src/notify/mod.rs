//! Notification dispatcher — builds and sends outbound notifications.
//!
//! Owns templating and per-channel payload shape. Four notification kinds
//! go over the mail channel (confirmation, failure, clarification, answer),
//! plus redirects and "not built yet" notices; `post_to_channel` covers
//! team-channel delivery.

pub mod chat;
pub mod mail;
pub mod templates;

use std::sync::Arc;

use tracing::info;

use crate::error::NotifyError;
use crate::event::{ClarifyKind, JobSummary, Route, WorkerPayload};
use chat::{ChannelPost, ChatSink};
use mail::{MailSink, OutboundEmail, ReplyTrail};

/// Channel-post context blocks are truncated to keep posts readable.
const CHAT_CONTEXT_MAX: usize = 500;

/// What happened to a sink delivery.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkReceipt {
    Delivered { status: u16 },
    /// Sink not configured — the payload that would have been sent.
    WouldSend { payload: serde_json::Value },
    /// Delivery intentionally not attempted.
    Skipped { reason: String },
}

impl SinkReceipt {
    pub fn delivered(&self) -> bool {
        matches!(self, SinkReceipt::Delivered { .. })
    }
}

/// Builds notification payloads and hands them to the sinks.
pub struct Notifier {
    mail: Arc<dyn MailSink>,
    chat: Arc<dyn ChatSink>,
    hub_url: String,
}

impl Notifier {
    pub fn new(mail: Arc<dyn MailSink>, chat: Arc<dyn ChatSink>, hub_url: impl Into<String>) -> Self {
        Self {
            mail,
            chat,
            hub_url: hub_url.into(),
        }
    }

    // ── Mail notifications ──────────────────────────────────────────

    /// Confirmation after a successful worker action.
    pub async fn send_confirmation(
        &self,
        payload: &WorkerPayload,
        job_name: Option<&str>,
        client_name: Option<&str>,
    ) -> Result<SinkReceipt, NotifyError> {
        let friendly = action_label(payload.route);
        let subtitle = match payload.route {
            Route::File => "Filed to job folder",
            Route::Update => "Status updated",
            Route::Triage => "New job created",
            Route::Feedback => "Feedback recorded",
            Route::WorkToClient => "Delivery logged",
            _ => "Completed",
        };
        let title = box_title(payload.job_number.as_deref(), job_name, client_name, "Done");

        let content = format!(
            "{}\n<p style=\"margin: 0 0 20px 0;\">All sorted. {friendly}.</p>\n\n{}\n\n{}",
            templates::greeting(payload.sender_name.as_deref()),
            templates::success_box(&title, subtitle),
            templates::signature(),
        );

        info!(route = %payload.route, to = %payload.sender_email, "Sending confirmation");
        self.send_wrapped(payload, reply_subject(payload, "Traffic - Done"), &content)
            .await
    }

    /// Failure notification carrying the raw error text.
    pub async fn send_failure(
        &self,
        payload: &WorkerPayload,
        job_name: Option<&str>,
        client_name: Option<&str>,
        error_text: &str,
    ) -> Result<SinkReceipt, NotifyError> {
        let subtitle = match payload.route {
            Route::File => "Couldn't file attachments",
            Route::Update => "Couldn't update job",
            Route::Triage => "Couldn't create job",
            Route::Feedback => "Couldn't log feedback",
            Route::WorkToClient => "Couldn't log delivery",
            _ => "Something went wrong",
        };
        let title = box_title(payload.job_number.as_deref(), job_name, client_name, "Error");

        let content = format!(
            "{}\n<p style=\"margin: 0 0 20px 0;\">Sorry, I got in a muddle over that one.</p>\n\n{}\n\n{}\n\n{}",
            templates::greeting(payload.sender_name.as_deref()),
            templates::failure_box(&title, subtitle),
            templates::error_block(error_text),
            templates::signature(),
        );

        let subject = if payload.subject_line.is_empty() {
            "Did not compute".to_string()
        } else {
            format!("Did not compute: {}", payload.subject_line)
        };

        info!(route = %payload.route, to = %payload.sender_email, "Sending failure notification");
        self.send_wrapped(payload, subject, &content).await
    }

    /// Clarification request. The kind is selected by the routing decision,
    /// never re-derived here.
    pub async fn send_clarify(
        &self,
        payload: &WorkerPayload,
        kind: ClarifyKind,
        jobs: &[JobSummary],
    ) -> Result<SinkReceipt, NotifyError> {
        let greeting = templates::greeting(payload.sender_name.as_deref());
        let content = match kind {
            ClarifyKind::Confirm => format!(
                "{greeting}\n<p style=\"margin: 0 0 20px 0;\">I'm not totally sure which job you mean. Do any of these look right?</p>\n{}\n<p style=\"margin: 0 0 24px 0;\">Just reply with a job number and I'll get on with it.</p>\n{}",
                templates::job_cards(jobs, &self.hub_url),
                templates::signature(),
            ),
            ClarifyKind::JobNotFound => format!(
                "{greeting}\n<p style=\"margin: 0 0 20px 0;\">Sorry, I can't find job <strong>{}</strong> right now.</p>\n<p style=\"margin: 0 0 24px 0;\">Please check the job number and try again, or reply \"Incoming\" if it's a new job.</p>\n{}",
                templates::escape_html(payload.job_number.as_deref().unwrap_or("?")),
                templates::signature(),
            ),
            ClarifyKind::NoIdea => format!(
                "{greeting}\n<p style=\"margin: 0 0 20px 0;\">Throw me a bone, I have no idea what you're after.</p>\n<p style=\"margin: 0 0 24px 0;\">Let me know which client or project... bonus points for a job number.</p>\n{}",
                templates::signature(),
            ),
        };

        info!(
            kind = kind.as_str(),
            to = %payload.sender_email,
            "Sending clarification"
        );
        self.send_wrapped(payload, reply_subject(payload, "Traffic"), &content)
            .await
    }

    /// Direct answer to a question, body written by the classifier.
    pub async fn send_answer(
        &self,
        payload: &WorkerPayload,
        message: &str,
    ) -> Result<SinkReceipt, NotifyError> {
        let content = format!(
            "{}\n<p style=\"margin: 0 0 20px 0;\">{message}</p>\n{}",
            templates::greeting(payload.sender_name.as_deref()),
            templates::signature(),
        );

        info!(to = %payload.sender_email, "Sending answer");
        self.send_wrapped(payload, reply_subject(payload, "Traffic"), &content)
            .await
    }

    /// Redirect to the WIP or Tracker hub view.
    pub async fn send_redirect(
        &self,
        payload: &WorkerPayload,
        route: Route,
        client_name: Option<&str>,
    ) -> Result<SinkReceipt, NotifyError> {
        let view = if route == Route::Tracker { "tracker" } else { "wip" };
        let link = match payload.client_code.as_deref() {
            Some(code) => format!("{}/?client={code}&view={view}", self.hub_url),
            None => format!("{}/?view={view}", self.hub_url),
        };

        let display_name = client_name
            .map(str::to_string)
            .or_else(|| payload.client_code.clone())
            .unwrap_or_default();
        let (message, link_text) = if view == "tracker" {
            (
                "Gosh, that's getting into more detail than I'm good at. You should find everything you need in the Tracker.",
                if display_name.is_empty() {
                    "Open Tracker →".to_string()
                } else {
                    format!("Open Tracker for {display_name} →")
                },
            )
        } else {
            (
                "That's getting into the detail more than I'm good at. You should find everything you need in the WIP.",
                if display_name.is_empty() {
                    "Open WIP →".to_string()
                } else {
                    format!("Open {display_name} WIP →")
                },
            )
        };

        let content = format!(
            "{}\n<p style=\"margin: 0 0 20px 0;\">{message}</p>\n{}\n{}",
            templates::greeting(payload.sender_name.as_deref()),
            templates::hub_link(&link, &link_text),
            templates::signature(),
        );

        info!(view, to = %payload.sender_email, "Sending redirect");
        self.send_wrapped(payload, reply_subject(payload, "Traffic"), &content)
            .await
    }

    /// "Not built yet" notice for routes whose worker doesn't exist.
    pub async fn send_not_built(&self, payload: &WorkerPayload) -> Result<SinkReceipt, NotifyError> {
        let message = match payload.route {
            Route::Triage => "Triage isn't ready yet. Watch this space.".to_string(),
            Route::Todo => format!(
                "To-do lists coming soon. Check the WIP for now. <a href=\"{}/?view=wip\">Open WIP →</a>",
                self.hub_url
            ),
            Route::Incoming => "Not set up for new jobs yet. Better to email a human.".to_string(),
            other => format!(
                "Sorry, we're still working on <strong>{other}</strong>. Hoping to have it up and running soon."
            ),
        };

        let content = format!(
            "{}\n<p style=\"margin: 0 0 20px 0;\">{message}</p>\n{}",
            templates::greeting(payload.sender_name.as_deref()),
            templates::signature(),
        );

        info!(route = %payload.route, to = %payload.sender_email, "Sending not-built notice");
        self.send_wrapped(payload, reply_subject(payload, "Traffic - Coming Soon"), &content)
            .await
    }

    async fn send_wrapped(
        &self,
        payload: &WorkerPayload,
        subject: String,
        content: &str,
    ) -> Result<SinkReceipt, NotifyError> {
        let mail = OutboundEmail {
            to: payload.sender_email.clone(),
            subject,
            body: templates::wrap_body(content),
            reply_to: Some(ReplyTrail::from_payload(payload)),
        };
        self.mail.send(&mail).await
    }

    // ── Channel posts ───────────────────────────────────────────────

    /// Post a summary to a team channel.
    ///
    /// Skipped entirely — not attempted — when either identifier is
    /// missing; that is a normal outcome, not an error.
    pub async fn post_to_channel(
        &self,
        team_id: Option<&str>,
        channel_id: Option<&str>,
        subject: Option<&str>,
        message: &str,
        job_number: Option<&str>,
        context: Option<&str>,
    ) -> Result<SinkReceipt, NotifyError> {
        let (Some(team_id), Some(channel_id)) = (team_id, channel_id) else {
            info!(
                job = job_number.unwrap_or("-"),
                "Channel post skipped: missing team or channel id"
            );
            return Ok(SinkReceipt::Skipped {
                reason: "missing teamId or channelId".to_string(),
            });
        };

        let subject = match (subject, job_number) {
            (Some(s), _) => s.to_string(),
            (None, Some(job)) => format!("Update: {job}"),
            (None, None) => String::new(),
        };

        let mut full_message = message.to_string();
        if let Some(context) = context {
            let snippet: String = context.chars().take(CHAT_CONTEXT_MAX).collect();
            let ellipsis = if context.chars().count() > CHAT_CONTEXT_MAX {
                "..."
            } else {
                ""
            };
            full_message = format!("{message}\n\n---\n**Context:**\n>{snippet}{ellipsis}");
        }

        let post = ChannelPost {
            team_id: team_id.to_string(),
            channel_id: channel_id.to_string(),
            subject,
            message: full_message,
            job_number: job_number.unwrap_or_default().to_string(),
        };
        self.chat.post(&post).await
    }
}

/// Past-tense action line for a completed route, shared by confirmation
/// mails and channel summaries.
pub fn action_label(route: Route) -> &'static str {
    match route {
        Route::File => "Files filed",
        Route::Update => "Job updated",
        Route::Triage => "Job triaged",
        Route::Feedback => "Feedback logged",
        Route::WorkToClient => "Work sent to client logged",
        _ => "Request completed",
    }
}

fn reply_subject(payload: &WorkerPayload, fallback: &str) -> String {
    if payload.subject_line.is_empty() {
        fallback.to_string()
    } else {
        format!("Re: {}", payload.subject_line)
    }
}

fn box_title(
    job_number: Option<&str>,
    job_name: Option<&str>,
    client_name: Option<&str>,
    fallback: &str,
) -> String {
    match (job_number, job_name, client_name) {
        (Some(number), Some(name), _) => format!("{number} | {name}"),
        (Some(number), None, _) => number.to_string(),
        (None, _, Some(client)) => client.to_string(),
        _ => fallback.to_string(),
    }
}
