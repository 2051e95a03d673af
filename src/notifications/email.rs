//! Rendering of build notification emails.
//!
//! A message is a `multipart/alternative` document with a plain text part
//! followed by an HTML part. Both parts are rendered from the same
//! [`RenderContext`] so they always show the same values, and the output is
//! byte-for-byte reproducible for a given event, configuration and date.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lettre::message::{
    header::{ContentType, HeaderName, HeaderValue},
    Mailbox, Message, MultiPart, SinglePart,
};
use sha2::{Digest, Sha256};
use std::fmt::Write;

use crate::config::Config;
use crate::error::RenderError;
use crate::event::{BuildEvent, MetadataField};
use crate::utils::{format_duration, html_escape};

/// Layout for the Date header and displayed timestamps,
/// e.g. "Sat, 11 Dec 2021 14:42:31 -0500"
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S %z";

/// Shown in the subject when a build has neither trigger name nor ID
const UNKNOWN_TRIGGER: &str = "[unknown]";

/// Display fields shared by the text and HTML parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderContext {
    pub build_id: String,
    pub log_url: String,
    pub trigger_id: String,
    /// Trigger name, falling back to the trigger ID
    pub trigger: String,
    /// Link for the trigger row, empty when none is configured
    pub trigger_url: String,
    pub status: String,
    pub repo: String,
    pub commit: String,
    pub branch: String,
    pub start: String,
    pub end: String,
    pub duration: String,
    pub subject: String,
}

impl RenderContext {
    pub fn new(cfg: &Config, event: &BuildEvent) -> Self {
        let carrier = cfg.metadata_carrier;
        let tz = cfg.email.time_zone;
        let trigger_name = one_line(&event.field(carrier, MetadataField::TriggerName, ""));
        let trigger = if trigger_name.is_empty() {
            one_line(&event.trigger_id)
        } else {
            trigger_name
        };
        let status = one_line(&event.status.to_string());
        let subject = format!(
            "[{}] {} {} (build {})",
            one_line(&event.project_id),
            if trigger.is_empty() {
                UNKNOWN_TRIGGER
            } else {
                trigger.as_str()
            },
            status,
            one_line(event.short_id()),
        );

        let trigger_url = match &cfg.email.trigger_url {
            Some(prefix) if !event.trigger_id.is_empty() => {
                one_line(&format!("{}{}", prefix, event.trigger_id))
            }
            _ => String::new(),
        };

        Self {
            build_id: one_line(&event.id),
            log_url: one_line(&event.log_url),
            trigger_id: event.trigger_id.clone(),
            trigger,
            trigger_url,
            status,
            repo: one_line(&event.field(carrier, MetadataField::Repo, "")),
            commit: one_line(&event.field(carrier, MetadataField::Commit, "")),
            branch: one_line(&event.field(carrier, MetadataField::Branch, "")),
            start: format_time(event.start_or_epoch(), tz),
            end: format_time(event.finish_or_epoch(), tz),
            duration: format_duration(event.duration()),
            subject,
        }
    }

    /// Optional rows, in display order, that are present for this build
    fn optional_rows(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            ("Repo", self.repo.as_str()),
            ("Commit", self.commit.as_str()),
            ("Branch", self.branch.as_str()),
        ]
        .into_iter()
        .filter(|(_, v)| !v.is_empty())
    }
}

/// Render a notification email for `event`, dated now.
pub fn render_email(cfg: &Config, event: &BuildEvent) -> Result<Vec<u8>, RenderError> {
    render_email_at(cfg, event, Utc::now())
}

/// Render a notification email for `event` with the given Date header.
pub fn render_email_at(
    cfg: &Config,
    event: &BuildEvent,
    date: DateTime<Utc>,
) -> Result<Vec<u8>, RenderError> {
    let from = cfg.email.from.as_ref().ok_or(RenderError::MissingFrom)?;
    let ctx = RenderContext::new(cfg, event);
    let text = render_text(&ctx)?;
    let html = render_html(&ctx)?;
    let boundary = boundary_for(&text, &html);
    let message_id = format!(
        "<{}@{}>",
        message_id_for(&boundary, &ctx.build_id, date),
        from.email.domain()
    );

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(ctx.subject.as_str())
        .message_id(Some(message_id));
    for rcpt in &cfg.email.recipients {
        builder = builder.to(Mailbox::new(None, rcpt.email.clone()));
    }
    let mut message = builder.multipart(
        MultiPart::alternative()
            .boundary(boundary)
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_PLAIN)
                    .body(text),
            )
            .singlepart(
                SinglePart::builder()
                    .header(ContentType::TEXT_HTML)
                    .body(html),
            ),
    )?;

    // The builder stamps the current time in UTC; show the given date in the
    // configured zone instead.
    message.headers_mut().insert_raw(HeaderValue::new(
        HeaderName::new_from_ascii_str("Date"),
        format_time(date, cfg.email.time_zone),
    ));

    Ok(message.formatted())
}

fn render_text(ctx: &RenderContext) -> Result<String, RenderError> {
    let mut lines = vec![format!("Build:     {}", ctx.build_id)];
    if !ctx.trigger_id.is_empty() {
        lines.push(format!("Trigger:   {}", ctx.trigger));
    }
    lines.push(format!("Status:    {}", ctx.status));
    for (label, value) in ctx.optional_rows() {
        lines.push(format!("{:<11}{}", format!("{}:", label), value));
    }
    lines.push(format!("Start:     {}", ctx.start));
    lines.push(format!("End:       {} ({})", ctx.end, ctx.duration));
    if !ctx.log_url.is_empty() {
        lines.push(format!("Log:       {}", ctx.log_url));
    }
    Ok(lines.join("\r\n"))
}

fn render_html(ctx: &RenderContext) -> Result<String, RenderError> {
    let err = |source| RenderError::Write {
        part: "html",
        source,
    };
    let mut out = String::from(HTML_HEAD);
    let mut row = |label: &str, value: &str| {
        write!(
            out,
            "  <tr><td class=\"left\">{}</td><td>{}</td></tr>\r\n",
            label, value
        )
    };

    let build = if ctx.log_url.is_empty() {
        html_escape(&ctx.build_id)
    } else {
        format!(
            "<a href=\"{}\">{}</a>",
            html_escape(&ctx.log_url),
            html_escape(&ctx.build_id)
        )
    };
    row("Build", &build).map_err(err)?;
    if !ctx.trigger_id.is_empty() {
        let trigger = if ctx.trigger_url.is_empty() {
            html_escape(&ctx.trigger)
        } else {
            format!(
                "<a href=\"{}\">{}</a>",
                html_escape(&ctx.trigger_url),
                html_escape(&ctx.trigger)
            )
        };
        row("Trigger", &trigger).map_err(err)?;
    }
    row("Status", &html_escape(&ctx.status)).map_err(err)?;
    for (label, value) in ctx.optional_rows() {
        row(label, &html_escape(value)).map_err(err)?;
    }
    row("Start", &html_escape(&ctx.start)).map_err(err)?;
    row(
        "End",
        &format!("{} ({})", html_escape(&ctx.end), html_escape(&ctx.duration)),
    )
    .map_err(err)?;
    out.push_str(HTML_TAIL);
    Ok(out)
}

// Inline styles only; many mail clients drop external or complex CSS.
const HTML_HEAD: &str = "<!DOCTYPE html>\r
<html>\r
<head>\r
<meta charset=\"utf-8\">\r
<style>\r
body {\r
  font-family: Arial, Helvetica, sans-serif;\r
}\r
table {\r
  border-spacing: 0;\r
}\r
td.left {\r
  font-weight: bold;\r
  padding-right: 1em;\r
}\r
</style>\r
</head>\r
<body>\r
<table>\r
";

const HTML_TAIL: &str = "</table>\r
</body>\r
</html>";

fn format_time(t: DateTime<Utc>, tz: Tz) -> String {
    t.with_timezone(&tz).format(DATE_FORMAT).to_string()
}

/// Multipart boundary derived from the part contents.
///
/// Hex digits of a digest over both bodies can't collide with a line of
/// either body in practice, and keep the message reproducible.
fn boundary_for(text: &str, html: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update([0u8]);
    hasher.update(html.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..30])
}

fn message_id_for(boundary: &str, build_id: &str, date: DateTime<Utc>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(boundary.as_bytes());
    hasher.update(build_id.as_bytes());
    hasher.update(date.timestamp_micros().to_be_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Values are shown on a single line of the text part
fn one_line(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
