//! Build event model.
//!
//! A [`BuildEvent`] is the decoded payload of a single build status message.
//! Every field is optional on the wire; missing fields default to empty values
//! and unknown fields are ignored.

mod metadata;

pub use metadata::{Metadata, MetadataCarrier, MetadataField};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Build status as reported by the build service
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum BuildStatus {
    #[default]
    StatusUnknown,
    Pending,
    Queued,
    Working,
    Success,
    Failure,
    InternalError,
    Timeout,
    Cancelled,
    Expired,
    /// A status this crate doesn't know about, passed through untouched
    Other(String),
}

impl BuildStatus {
    /// All statuses with a known canonical name
    pub const KNOWN: [BuildStatus; 10] = [
        Self::StatusUnknown,
        Self::Pending,
        Self::Queued,
        Self::Working,
        Self::Success,
        Self::Failure,
        Self::InternalError,
        Self::Timeout,
        Self::Cancelled,
        Self::Expired,
    ];

    /// Canonical string form, e.g. "INTERNAL_ERROR"
    pub fn as_str(&self) -> &str {
        match self {
            Self::StatusUnknown => "STATUS_UNKNOWN",
            Self::Pending => "PENDING",
            Self::Queued => "QUEUED",
            Self::Working => "WORKING",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::InternalError => "INTERNAL_ERROR",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Expired => "EXPIRED",
            Self::Other(s) => s,
        }
    }

    /// Whether this is one of the named statuses rather than a pass-through value
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for BuildStatus {
    fn from(s: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|known| known.as_str() == s)
            .cloned()
            .unwrap_or_else(|| Self::Other(s.to_string()))
    }
}

impl From<String> for BuildStatus {
    fn from(s: String) -> Self {
        s.as_str().into()
    }
}

impl From<BuildStatus> for String {
    fn from(status: BuildStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A single build lifecycle event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildEvent {
    pub id: String,
    pub project_id: String,
    /// Empty when the build wasn't started by a trigger
    #[serde(rename = "buildTriggerId", alias = "triggerId")]
    pub trigger_id: String,
    pub status: BuildStatus,
    pub log_url: String,
    pub start_time: Option<DateTime<Utc>>,
    #[serde(alias = "endTime")]
    pub finish_time: Option<DateTime<Utc>>,
    /// Tags of the form "name-value"
    pub tags: Vec<String>,
    pub substitutions: BTreeMap<String, String>,
}

impl BuildEvent {
    /// Parse an event from its JSON payload
    pub fn from_json(data: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(data)
    }

    /// View this event's annotations through the given carrier
    pub fn metadata(&self, carrier: MetadataCarrier) -> Metadata<'_> {
        match carrier {
            MetadataCarrier::Substitutions => Metadata::Substitutions(&self.substitutions),
            MetadataCarrier::Tags => Metadata::Tags(&self.tags),
        }
    }

    /// Look up a logical metadata field, returning `default` if it's absent
    pub fn field(&self, carrier: MetadataCarrier, field: MetadataField, default: &str) -> String {
        self.metadata(carrier).lookup(field.key(carrier), default)
    }

    /// Start time, or the Unix epoch if the event doesn't carry one
    pub fn start_or_epoch(&self) -> DateTime<Utc> {
        self.start_time.unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Finish time, or the Unix epoch if the event doesn't carry one
    pub fn finish_or_epoch(&self) -> DateTime<Utc> {
        self.finish_time.unwrap_or(DateTime::UNIX_EPOCH)
    }

    /// Time between start and finish.
    ///
    /// Missing timestamps count as the epoch and a finish before the start
    /// yields zero, so this is best-effort for incomplete events.
    pub fn duration(&self) -> Duration {
        (self.finish_or_epoch() - self.start_or_epoch())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// The first segment of the build ID, e.g. "1234" for "1234-5678"
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in BuildStatus::KNOWN {
            assert_eq!(BuildStatus::from(status.as_str()), status);
        }
        assert_eq!(
            BuildStatus::from("SOMETHING_NEW"),
            BuildStatus::Other("SOMETHING_NEW".to_string())
        );
        assert!(!BuildStatus::from("failure").is_known());
    }

    #[test]
    fn test_parse_event() {
        let json = br#"{
            "id": "1234-5678",
            "projectId": "my-project",
            "buildTriggerId": "trigger-id",
            "status": "FAILURE",
            "logUrl": "https://example.org/log",
            "startTime": "2021-12-11T19:42:31.123456Z",
            "finishTime": "2021-12-11T20:04:51Z",
            "tags": ["trigger-name-deploy"],
            "substitutions": {"COMMIT_SHA": "abc123"},
            "images": ["ignored"]
        }"#;
        let event = BuildEvent::from_json(json).unwrap();
        assert_eq!(event.id, "1234-5678");
        assert_eq!(event.project_id, "my-project");
        assert_eq!(event.trigger_id, "trigger-id");
        assert_eq!(event.status, BuildStatus::Failure);
        assert_eq!(event.log_url, "https://example.org/log");
        assert_eq!(
            event.finish_time.unwrap().to_rfc3339(),
            "2021-12-11T20:04:51+00:00"
        );
        assert!(event.start_time.is_some());
        assert_eq!(event.tags, vec!["trigger-name-deploy".to_string()]);
        assert_eq!(event.substitutions["COMMIT_SHA"], "abc123");
    }

    #[test]
    fn test_parse_partial_event() {
        let event = BuildEvent::from_json(br#"{"status": "QUEUED"}"#).unwrap();
        assert_eq!(event.status, BuildStatus::Queued);
        assert!(event.id.is_empty());
        assert!(event.trigger_id.is_empty());
        assert!(event.start_time.is_none());

        let event = BuildEvent::from_json(b"{}").unwrap();
        assert_eq!(event.status, BuildStatus::StatusUnknown);
    }

    #[test]
    fn test_parse_unknown_status_passes_through() {
        let event = BuildEvent::from_json(br#"{"status": "PAUSED"}"#).unwrap();
        assert_eq!(event.status.as_str(), "PAUSED");
    }

    #[test]
    fn test_duration() {
        let start = "2021-12-11T19:42:31Z".parse::<DateTime<Utc>>().unwrap();
        let finish = "2021-12-11T20:04:51Z".parse::<DateTime<Utc>>().unwrap();
        let mut event = BuildEvent {
            start_time: Some(start),
            finish_time: Some(finish),
            ..Default::default()
        };
        assert_eq!(event.duration(), Duration::from_secs(22 * 60 + 20));

        // Still running: no finish time, so the duration can't be negative.
        event.finish_time = None;
        assert_eq!(event.duration(), Duration::ZERO);
        assert_eq!(event.finish_or_epoch(), DateTime::UNIX_EPOCH);

        event.start_time = None;
        event.finish_time = Some(finish);
        assert_eq!(event.duration().as_secs(), finish.timestamp() as u64);
    }

    #[test]
    fn test_short_id() {
        let mut event = BuildEvent {
            id: "1234-5678-90".to_string(),
            ..Default::default()
        };
        assert_eq!(event.short_id(), "1234");
        event.id = "abcdef".to_string();
        assert_eq!(event.short_id(), "abcdef");
        event.id.clear();
        assert_eq!(event.short_id(), "");
    }
}
