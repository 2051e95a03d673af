//! Small formatting helpers shared by the email and badge renderers.

use std::fmt::Write;
use std::time::Duration;

const SECS_PER_MINUTE: u64 = 60;
const SECS_PER_HOUR: u64 = 60 * SECS_PER_MINUTE;

/// Format a duration as e.g. "4h23m5s", "2m4s", or "14s".
///
/// Units with a zero value are omitted, except that a zero duration renders
/// as "0s". Sub-second precision is dropped.
pub fn format_duration(d: Duration) -> String {
    let mut secs = d.as_secs();
    let mut out = String::new();

    if secs >= SECS_PER_HOUR {
        let _ = write!(out, "{}h", secs / SECS_PER_HOUR);
        secs %= SECS_PER_HOUR;
    }
    if secs >= SECS_PER_MINUTE {
        let _ = write!(out, "{}m", secs / SECS_PER_MINUTE);
        secs %= SECS_PER_MINUTE;
    }
    if secs > 0 || out.is_empty() {
        let _ = write!(out, "{}s", secs);
    }
    out
}

/// Escape HTML special characters
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
