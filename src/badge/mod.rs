//! Status badge and report rendering.
//!
//! Badges are small SVG images keyed by trigger, and reports are minimal HTML
//! pages published next to them. Both depend only on the build event so they
//! can be regenerated without any email configuration. Reports are served from
//! a publicly readable location, so they show nothing beyond the
//! status and timing.

use std::fmt::Write;

use crate::error::RenderError;
use crate::event::{BuildEvent, BuildStatus};
use crate::utils::{format_duration, html_escape};

/// Total badge width in pixels
pub const BADGE_WIDTH: u32 = 90;

/// Badge height in pixels
pub const BADGE_HEIGHT: u32 = 20;

/// Timestamp layout used in reports, always rendered in UTC
const REPORT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// How one half of a badge is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BadgeStyle {
    pub text: &'static str,
    /// Text color as "#rgb" or "#rrggbb"
    pub fg: &'static str,
    /// Background color as "#rgb" or "#rrggbb"
    pub bg: &'static str,
    pub width: u32,
}

impl BadgeStyle {
    fn center(&self) -> u32 {
        self.width / 2
    }
}

/// Left half of every badge. Its width is whatever the status half leaves.
const LABEL: BadgeStyle = BadgeStyle {
    text: "build",
    fg: "#fff",
    bg: "#555",
    width: 0,
};

/// Right half of the badge for each status that gets one.
///
/// Statuses missing here never produce badge updates.
const STATUS_STYLES: [(BuildStatus, BadgeStyle); 4] = [
    (
        BuildStatus::Success,
        BadgeStyle {
            text: "success",
            fg: "#fff",
            bg: "#2da44e",
            width: 52,
        },
    ),
    (
        BuildStatus::Failure,
        BadgeStyle {
            text: "failure",
            fg: "#fff",
            bg: "#c62828",
            width: 52,
        },
    ),
    (
        BuildStatus::InternalError,
        BadgeStyle {
            text: "error",
            fg: "#000",
            bg: "#ffeb3b",
            width: 52,
        },
    ),
    (
        BuildStatus::Timeout,
        BadgeStyle {
            text: "timeout",
            fg: "#fff",
            bg: "#333",
            width: 52,
        },
    ),
];

/// Style for the status half of a badge, if `status` gets a badge at all
pub fn status_style(status: &BuildStatus) -> Option<BadgeStyle> {
    STATUS_STYLES
        .iter()
        .find(|(s, _)| s == status)
        .map(|(_, style)| *style)
}

/// Render an SVG badge describing `event`'s status
pub fn render_badge(event: &BuildEvent) -> Result<String, RenderError> {
    let right = status_style(&event.status)
        .ok_or_else(|| RenderError::NoBadgeStyle(event.status.to_string()))?;
    let left = BadgeStyle {
        width: BADGE_WIDTH - right.width,
        ..LABEL
    };

    Ok(format!(
        r##"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}">
  <title>{left_text}: {right_text}</title>
  <g font-family="DejaVu Sans,Verdana,Geneva,sans-serif" text-anchor="middle" font-size="10">
    <rect width="{w}" height="{h}" rx="3" fill="{left_bg}" />
    <text x="{left_center}" y="14" fill="{left_fg}">{left_text}</text>
    <g transform="translate({left_width},0)">
      <rect width="{right_width}" height="{h}" rx="3" fill="{right_bg}" />
      <path d="M0 0h4v{h}h-4z" fill="{right_bg}" />
      <text x="{right_center}" y="14" fill="{right_fg}">{right_text}</text>
    </g>
  </g>
</svg>
"##,
        w = BADGE_WIDTH,
        h = BADGE_HEIGHT,
        left_text = left.text,
        left_fg = left.fg,
        left_bg = left.bg,
        left_center = left.center(),
        left_width = left.width,
        right_text = right.text,
        right_fg = right.fg,
        right_bg = right.bg,
        right_center = right.center(),
        right_width = right.width,
    ))
}

/// Render a minimal HTML report for `event`.
///
/// Only the status, start and end times and duration are included. Any
/// status renders, including ones without a badge style.
pub fn render_report(event: &BuildEvent) -> Result<String, RenderError> {
    let status = html_escape(event.status.as_str());
    let color = status_style(&event.status)
        .map(|s| s.bg)
        .unwrap_or(LABEL.bg);
    let start = event.start_or_epoch().format(REPORT_TIME_FORMAT);
    let end = event.finish_or_epoch().format(REPORT_TIME_FORMAT);
    let duration = format_duration(event.duration());

    let mut out = String::new();
    let err = |source| RenderError::Write {
        part: "report",
        source,
    };
    out.push_str(REPORT_HEAD);
    writeln!(
        out,
        r#"  <tr><td class="left">Status</td><td><span class="status" style="background-color: {color}">{status}</span></td></tr>"#
    )
    .map_err(err)?;
    writeln!(out, r#"  <tr><td class="left">Start</td><td>{start}</td></tr>"#).map_err(err)?;
    writeln!(out, r#"  <tr><td class="left">End</td><td>{end}</td></tr>"#).map_err(err)?;
    writeln!(out, r#"  <tr><td class="left">Duration</td><td>{duration}</td></tr>"#)
        .map_err(err)?;
    out.push_str(REPORT_TAIL);
    Ok(out)
}

const REPORT_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Build status</title>
<style>
body {
  font-family: Arial, Helvetica, sans-serif;
}
table {
  border-spacing: 0;
}
td {
  padding: 0.2em 0;
}
td.left {
  font-weight: bold;
  padding-right: 1em;
}
span.status {
  border-radius: 3px;
  color: #fff;
  padding: 0.1em 0.4em;
}
</style>
</head>
<body>
<table>
"#;

const REPORT_TAIL: &str = "</table>
</body>
</html>
";
