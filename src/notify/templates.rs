//! HTML rendering for outbound mail bodies.
//!
//! Pure functions from structured content to markup. The mail-send service
//! renders whatever it is given; these helpers keep the styling in one place.

use crate::event::JobSummary;

/// Candidate-job cards are capped so clarification mails stay scannable.
pub const MAX_JOB_CARDS: usize = 5;

const ACCENT: &str = "#2563eb";

/// First name from a display name, with a friendly fallback.
pub fn first_name(sender_name: Option<&str>) -> String {
    sender_name
        .and_then(|name| name.split_whitespace().next())
        .map(|first| first.trim_matches(['"', '\'', '[', ']', '(', ')']))
        .filter(|first| !first.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "there".to_string())
}

/// Minimal HTML escape for user-supplied text interpolated into markup.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Shared outer wrapper: base typography plus the footer rule.
pub fn wrap_body(content: &str) -> String {
    format!(
        r#"<div style="font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; font-size: 15px; line-height: 1.6; color: #333;">
{content}
<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-top: 32px; border-top: 1px solid #eee; padding-top: 16px;">
  <tr>
    <td style="vertical-align: middle; font-size: 12px; color: #999;">
      There's a robot on traffic, but humans in the loop.
    </td>
  </tr>
</table>
</div>"#
    )
}

/// Opening greeting line.
pub fn greeting(sender_name: Option<&str>) -> String {
    format!(
        r#"<p style="margin: 0 0 20px 0;">Hey {},</p>"#,
        first_name(sender_name)
    )
}

/// Closing signature line.
pub fn signature() -> &'static str {
    r#"<p style="margin: 0;">Traffic</p>"#
}

/// Green detail box with a tick.
pub fn success_box(title: &str, subtitle: &str) -> String {
    detail_box(title, subtitle, "#f0fdf4", "#22c55e", "✓")
}

/// Red detail box with a cross.
pub fn failure_box(title: &str, subtitle: &str) -> String {
    detail_box(title, subtitle, "#fef2f2", "#ef4444", "✕")
}

fn detail_box(title: &str, subtitle: &str, bg: &str, edge: &str, mark: &str) -> String {
    format!(
        r#"<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-bottom: 20px;">
  <tr>
    <td style="background: {bg}; border-radius: 8px; padding: 16px; border-left: 4px solid {edge};">
      <table cellpadding="0" cellspacing="0" border="0" width="100%">
        <tr>
          <td width="28" style="vertical-align: top; padding-right: 12px;">
            <div style="width: 24px; height: 24px; background: {edge}; border-radius: 50%; text-align: center; line-height: 24px;">
              <span style="color: white; font-size: 14px;">{mark}</span>
            </div>
          </td>
          <td style="vertical-align: top;">
            <div style="font-weight: 600; color: #333; margin-bottom: 2px;">{title}</div>
            <div style="font-size: 13px; color: #666;">{subtitle}</div>
          </td>
        </tr>
      </table>
    </td>
  </tr>
</table>"#
    )
}

/// Preformatted block for raw error text, escaped.
pub fn error_block(error_text: &str) -> String {
    format!(
        r#"<p style="margin: 0 0 8px 0; font-size: 13px; color: #666;">Here's the raw error, in case it helps:</p>
<pre style="background: #f5f5f5; padding: 12px; border-radius: 6px; font-size: 12px; overflow-x: auto; color: #666; margin: 0 0 24px 0;">{}</pre>"#,
        escape_html(error_text)
    )
}

/// Styled hub link.
pub fn hub_link(href: &str, text: &str) -> String {
    format!(
        r#"<p style="margin: 0 0 24px 0;"><a href="{href}" style="color: {ACCENT}; text-decoration: none; font-weight: 500;">{text}</a></p>"#
    )
}

/// Candidate-job cards with hub deep links, capped at [`MAX_JOB_CARDS`].
pub fn job_cards(jobs: &[JobSummary], hub_url: &str) -> String {
    if jobs.is_empty() {
        return "<p><em>No active jobs found</em></p>".to_string();
    }

    jobs.iter()
        .take(MAX_JOB_CARDS)
        .map(|job| {
            let link = format!(
                "{hub_url}/?job={}&action=edit",
                job.job_number.replace(' ', "")
            );
            let status_text = if job.with_client {
                "With client".to_string()
            } else {
                job.stage.clone()
            };
            let due = job.update_due.as_deref().unwrap_or("TBC");
            format!(
                r#"<table cellpadding="0" cellspacing="0" border="0" width="100%" style="margin-bottom:12px;">
  <tr>
    <td style="background:#f5f5f5; border-radius:8px; padding:16px; border-left:4px solid {ACCENT};">
      <a href="{link}" style="text-decoration:none; color:inherit; display:block;">
        <table cellpadding="0" cellspacing="0" border="0" width="100%">
          <tr>
            <td style="font-size:16px; font-weight:600; color:#1a1a1a; padding-bottom:4px;">
              {} | {}
            </td>
          </tr>
          <tr>
            <td style="font-size:13px; color:#666;">
              {status_text} | Due {due}
            </td>
          </tr>
        </table>
      </a>
    </td>
  </tr>
</table>"#,
                escape_html(&job.job_number),
                escape_html(&job.job_name),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}
