//! Watcher configuration.
//!
//! A [`Config`] is built once per invocation from a [`ConfigSource`] and is
//! read-only afterwards. Construction either yields a fully validated value or
//! a single [`ConfigError`] naming the offending setting.

mod source;

pub use source::{ConfigSource, EnvSource, FileSource, Layered};

use chrono_tz::Tz;
use lazy_static::lazy_static;
use lettre::message::{Mailbox, Mailboxes};
use regex::Regex;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::event::{BuildStatus, MetadataCarrier};

pub const EMAIL_HOSTNAME: &str = "EMAIL_HOSTNAME";
pub const EMAIL_PORT: &str = "EMAIL_PORT";
pub const EMAIL_USERNAME: &str = "EMAIL_USERNAME";
pub const EMAIL_PASSWORD: &str = "EMAIL_PASSWORD";
pub const EMAIL_FROM: &str = "EMAIL_FROM";
pub const EMAIL_RECIPIENTS: &str = "EMAIL_RECIPIENTS";
pub const EMAIL_TIME_ZONE: &str = "EMAIL_TIME_ZONE";
pub const EMAIL_BUILD_TRIGGER_IDS: &str = "EMAIL_BUILD_TRIGGER_IDS";
pub const EMAIL_BUILD_TRIGGER_NAMES: &str = "EMAIL_BUILD_TRIGGER_NAMES";
pub const EMAIL_BUILD_STATUSES: &str = "EMAIL_BUILD_STATUSES";
pub const EMAIL_TRIGGER_URL: &str = "EMAIL_TRIGGER_URL";
pub const BADGE_BUCKET: &str = "BADGE_BUCKET";
pub const BADGE_REPORTS: &str = "BADGE_REPORTS";
pub const METADATA_CARRIER: &str = "METADATA_CARRIER";

lazy_static! {
    /// Separator for list-valued settings
    static ref LIST_SEPARATOR: Regex = Regex::new(r"\s*,\s*").unwrap();
}

/// Errors that can occur while building a [`Config`]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("bad {key}: {value:?} is not a valid {expected}")]
    InvalidValue {
        key: &'static str,
        value: String,
        expected: &'static str,
    },

    #[error("bad {key}: {source}")]
    InvalidAddress {
        key: &'static str,
        #[source]
        source: lettre::address::AddressError,
    },

    #[error("bad EMAIL_TIME_ZONE: unknown time zone {0:?}")]
    UnknownTimeZone(String),

    #[error("bad status {status:?} in {key}")]
    UnknownStatus { key: &'static str, status: String },
}

/// Top-level configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub email: EmailConfig,
    pub badge: BadgeConfig,
    /// Which event annotations carry trigger name, commit, branch and repo
    pub metadata_carrier: MetadataCarrier,
}

/// SMTP server, addressing and eligibility rules for notification emails
#[derive(Clone)]
pub struct EmailConfig {
    pub hostname: Option<String>,
    pub port: i64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub from: Option<Mailbox>,
    pub recipients: Vec<Mailbox>,
    /// Zone used for the Date header and displayed timestamps
    pub time_zone: Tz,
    /// Trigger IDs to notify about, empty to not check
    pub trigger_ids: BTreeSet<String>,
    /// Trigger names or glob patterns to notify about, empty to not check
    pub trigger_names: TriggerNames,
    pub statuses: BTreeSet<BuildStatus>,
    /// Link prefix for the trigger row; the trigger ID is appended
    pub trigger_url: Option<String>,
}

impl Default for EmailConfig {
    fn default() -> Self {
        Self {
            hostname: None,
            port: default_email_port(),
            username: None,
            password: None,
            from: None,
            recipients: Vec::new(),
            time_zone: Tz::UTC,
            trigger_ids: BTreeSet::new(),
            trigger_names: TriggerNames::default(),
            statuses: default_email_statuses(),
            trigger_url: None,
        }
    }
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("hostname", &self.hostname)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("from", &self.from.as_ref().map(ToString::to_string))
            .field("recipients", &self.recipient_addrs())
            .field("time_zone", &self.time_zone.name())
            .field("trigger_ids", &self.trigger_ids)
            .field("trigger_names", &self.trigger_names.names)
            .field("statuses", &self.statuses)
            .field("trigger_url", &self.trigger_url)
            .finish()
    }
}

impl EmailConfig {
    /// The port as a TCP port number, if it is one
    pub fn smtp_port(&self) -> Option<u16> {
        u16::try_from(self.port).ok().filter(|p| *p != 0)
    }

    /// Bare addresses of all recipients, in configured order
    pub fn recipient_addrs(&self) -> Vec<String> {
        self.recipients.iter().map(|m| m.email.to_string()).collect()
    }

    /// Whether any trigger ID or name restriction is configured
    pub fn restricts_triggers(&self) -> bool {
        !self.trigger_ids.is_empty() || !self.trigger_names.is_empty()
    }
}

/// Allowed trigger names, with glob patterns compiled once at load time
#[derive(Debug, Clone, Default)]
pub struct TriggerNames {
    names: BTreeSet<String>,
    patterns: Vec<glob::Pattern>,
}

impl TriggerNames {
    pub fn new(names: BTreeSet<String>) -> Self {
        // Entries that aren't valid patterns can still match literally.
        let patterns = names
            .iter()
            .filter_map(|n| glob::Pattern::new(n).ok())
            .collect();
        Self { names, patterns }
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &BTreeSet<String> {
        &self.names
    }

    /// Whether `name` is listed verbatim
    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Whether `name` matches any listed pattern.
    ///
    /// Matching is case-sensitive and `*`, `?` and `[...]` don't match '/'.
    pub fn matches_glob(&self, name: &str) -> bool {
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        };
        self.patterns.iter().any(|p| p.matches_with(name, options))
    }
}

/// Badge publishing settings
#[derive(Debug, Clone, Default)]
pub struct BadgeConfig {
    /// Bucket badges are written to, `None` to disable badges
    pub bucket: Option<String>,
    /// Whether an HTML report is written alongside each badge
    pub reports: bool,
}

fn default_email_port() -> i64 {
    25
}

fn default_email_statuses() -> BTreeSet<BuildStatus> {
    [
        BuildStatus::Failure,
        BuildStatus::InternalError,
        BuildStatus::Timeout,
    ]
    .into()
}

const DEFAULT_TIME_ZONE: &str = "Etc/UTC";

impl Config {
    /// Build a configuration from `source`.
    ///
    /// All primitive settings are parsed first and the first failure among
    /// them is returned. Addresses, the time zone and status names are then
    /// validated in turn, failing on the first bad one.
    pub fn load(source: &impl ConfigSource) -> Result<Self, ConfigError> {
        let reader = Reader { source };
        let mut first_err = None;

        let port = keep_first_err(
            &mut first_err,
            reader.parse_with(EMAIL_PORT, "integer", |v| v.parse::<i64>().ok()),
        );
        let reports = keep_first_err(
            &mut first_err,
            reader.parse_with(BADGE_REPORTS, "boolean", parse_bool),
        );
        let carrier = keep_first_err(
            &mut first_err,
            reader.parse_with(METADATA_CARRIER, "metadata carrier", |v| {
                v.parse::<MetadataCarrier>().ok()
            }),
        );
        if let Some(err) = first_err {
            return Err(err);
        }

        let from = match reader.string(EMAIL_FROM) {
            Some(v) => Some(v.parse::<Mailbox>().map_err(|source| {
                ConfigError::InvalidAddress {
                    key: EMAIL_FROM,
                    source,
                }
            })?),
            None => None,
        };

        let recipients = match reader.string(EMAIL_RECIPIENTS) {
            Some(v) => {
                let list = v.parse::<Mailboxes>().map_err(|source| {
                    ConfigError::InvalidAddress {
                        key: EMAIL_RECIPIENTS,
                        source,
                    }
                })?;
                dedup_mailboxes(list)
            }
            None => Vec::new(),
        };

        let zone_name = reader
            .string(EMAIL_TIME_ZONE)
            .unwrap_or_else(|| DEFAULT_TIME_ZONE.to_string());
        let time_zone = zone_name
            .parse::<Tz>()
            .map_err(|_| ConfigError::UnknownTimeZone(zone_name.clone()))?;

        let statuses = match reader.string(EMAIL_BUILD_STATUSES) {
            Some(v) => split_list(&v)
                .into_iter()
                .map(|s| {
                    let status = BuildStatus::from(s.as_str());
                    if status.is_known() {
                        Ok(status)
                    } else {
                        Err(ConfigError::UnknownStatus {
                            key: EMAIL_BUILD_STATUSES,
                            status: s,
                        })
                    }
                })
                .collect::<Result<BTreeSet<_>, _>>()?,
            None => default_email_statuses(),
        };

        Ok(Self {
            email: EmailConfig {
                hostname: reader.string(EMAIL_HOSTNAME),
                port: port.unwrap_or_else(default_email_port),
                username: reader.string(EMAIL_USERNAME),
                password: reader.string(EMAIL_PASSWORD),
                from,
                recipients,
                time_zone,
                trigger_ids: reader.list(EMAIL_BUILD_TRIGGER_IDS),
                trigger_names: TriggerNames::new(reader.list(EMAIL_BUILD_TRIGGER_NAMES)),
                statuses,
                trigger_url: reader.string(EMAIL_TRIGGER_URL),
            },
            badge: BadgeConfig {
                bucket: reader.string(BADGE_BUCKET),
                reports: reports.unwrap_or(false),
            },
            metadata_carrier: carrier.unwrap_or_default(),
        })
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&EnvSource)
    }
}

/// Thin wrapper applying trimming and empty-means-unset to raw values
struct Reader<'a, S: ConfigSource> {
    source: &'a S,
}

impl<S: ConfigSource> Reader<'_, S> {
    fn string(&self, key: &str) -> Option<String> {
        self.source
            .get(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn list(&self, key: &str) -> BTreeSet<String> {
        self.string(key)
            .map(|v| split_list(&v).into_iter().collect())
            .unwrap_or_default()
    }

    /// Parse an optional primitive setting; unset yields `Ok(None)`
    fn parse_with<T>(
        &self,
        key: &'static str,
        expected: &'static str,
        parse: impl FnOnce(&str) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        match self.string(key) {
            None => Ok(None),
            Some(value) => match parse(&value) {
                Some(v) => Ok(Some(v)),
                None => Err(ConfigError::InvalidValue {
                    key,
                    value,
                    expected,
                }),
            },
        }
    }
}

/// Record the first error seen, turning any failure into an unset value
fn keep_first_err<T>(
    first_err: &mut Option<ConfigError>,
    result: Result<Option<T>, ConfigError>,
) -> Option<T> {
    match result {
        Ok(v) => v,
        Err(e) => {
            first_err.get_or_insert(e);
            None
        }
    }
}

fn split_list(value: &str) -> Vec<String> {
    LIST_SEPARATOR
        .split(value.trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn dedup_mailboxes(list: Mailboxes) -> Vec<Mailbox> {
    let mut seen = BTreeSet::new();
    list.into_iter()
        .filter(|m| seen.insert(m.email.to_string()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source(vars: &[(&str, &str)]) -> HashMap<String, String> {
        vars.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_load_config() {
        let cfg = Config::load(&source(&[
            (EMAIL_HOSTNAME, "mail.example.org"),
            (EMAIL_PORT, "587"),
            (EMAIL_USERNAME, "user"),
            (EMAIL_PASSWORD, "pass"),
            (EMAIL_FROM, "Build Watcher <build@example.org>"),
            (
                EMAIL_RECIPIENTS,
                r#"user1@example.org,user2@example.org, "Some User" <user3@example.org>"#,
            ),
            (EMAIL_TIME_ZONE, "America/New_York"),
            (EMAIL_BUILD_TRIGGER_IDS, "123-456,789-012"),
            (EMAIL_BUILD_TRIGGER_NAMES, "trigger-1, trigger-2"),
            (EMAIL_BUILD_STATUSES, "FAILURE,TIMEOUT"),
            (EMAIL_TRIGGER_URL, "https://ci.example.org/triggers/"),
            (BADGE_BUCKET, "my-bucket"),
            (BADGE_REPORTS, "true"),
            (METADATA_CARRIER, "tags"),
        ]))
        .unwrap();

        let email = &cfg.email;
        assert_eq!(email.hostname.as_deref(), Some("mail.example.org"));
        assert_eq!(email.port, 587);
        assert_eq!(email.username.as_deref(), Some("user"));
        assert_eq!(email.password.as_deref(), Some("pass"));

        let from = email.from.as_ref().unwrap();
        assert_eq!(from.name.as_deref(), Some("Build Watcher"));
        assert_eq!(from.email.to_string(), "build@example.org");
        assert_eq!(
            email.recipient_addrs(),
            vec!["user1@example.org", "user2@example.org", "user3@example.org"]
        );
        assert_eq!(email.time_zone.name(), "America/New_York");
        assert_eq!(email.trigger_ids, set(&["123-456", "789-012"]));
        assert_eq!(email.trigger_names.names(), &set(&["trigger-1", "trigger-2"]));
        assert_eq!(
            email.statuses,
            BTreeSet::from([BuildStatus::Failure, BuildStatus::Timeout])
        );
        assert_eq!(
            email.trigger_url.as_deref(),
            Some("https://ci.example.org/triggers/")
        );
        assert_eq!(cfg.badge.bucket.as_deref(), Some("my-bucket"));
        assert!(cfg.badge.reports);
        assert_eq!(cfg.metadata_carrier, MetadataCarrier::Tags);
    }

    #[test]
    fn test_load_config_defaults() {
        let cfg = Config::load(&source(&[])).unwrap();
        assert_eq!(cfg.email.hostname, None);
        assert_eq!(cfg.email.port, 25);
        assert_eq!(cfg.email.from.as_ref().map(|m| m.to_string()), None);
        assert!(cfg.email.recipients.is_empty());
        assert_eq!(cfg.email.time_zone.name(), "Etc/UTC");
        assert!(!cfg.email.restricts_triggers());
        assert_eq!(cfg.email.trigger_url, None);
        assert_eq!(
            cfg.email.statuses,
            BTreeSet::from([
                BuildStatus::Failure,
                BuildStatus::InternalError,
                BuildStatus::Timeout,
            ])
        );
        assert_eq!(cfg.badge.bucket, None);
        assert!(!cfg.badge.reports);
        assert_eq!(cfg.metadata_carrier, MetadataCarrier::Substitutions);
    }

    #[test]
    fn test_blank_values_are_unset() {
        let cfg = Config::load(&source(&[
            (EMAIL_HOSTNAME, "   "),
            (EMAIL_PORT, ""),
            (EMAIL_BUILD_TRIGGER_NAMES, ""),
            (BADGE_BUCKET, " "),
        ]))
        .unwrap();
        assert_eq!(cfg.email.hostname, None);
        assert_eq!(cfg.email.port, 25);
        assert!(cfg.email.trigger_names.is_empty());
        assert_eq!(cfg.badge.bucket, None);
    }

    #[test]
    fn test_lists_are_deduplicated() {
        let cfg = Config::load(&source(&[
            (EMAIL_RECIPIENTS, "a@example.org, A <a@example.org>, b@example.org"),
            (EMAIL_BUILD_TRIGGER_IDS, "x, y ,x"),
            (EMAIL_BUILD_STATUSES, "FAILURE , FAILURE"),
        ]))
        .unwrap();
        assert_eq!(cfg.email.recipient_addrs(), vec!["a@example.org", "b@example.org"]);
        assert_eq!(cfg.email.trigger_ids, set(&["x", "y"]));
        assert_eq!(cfg.email.statuses.len(), 1);
    }

    #[test]
    fn test_bad_port() {
        for port in ["abc", "2.5", "99999999999999999999"] {
            let err = Config::load(&source(&[(EMAIL_PORT, port)])).unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidValue { key: EMAIL_PORT, .. }),
                "port {port:?} gave {err:?}"
            );
            assert!(err.to_string().contains(EMAIL_PORT));
        }
    }

    #[test]
    fn test_unusable_port_still_loads() {
        // Out-of-range ports are an email eligibility matter, not a load error.
        for (raw, port) in [("-1", -1), ("0", 0), ("70000", 70000)] {
            let cfg = Config::load(&source(&[(EMAIL_PORT, raw), (BADGE_BUCKET, "b")])).unwrap();
            assert_eq!(cfg.email.port, port);
            assert_eq!(cfg.email.smtp_port(), None);
            assert_eq!(cfg.badge.bucket.as_deref(), Some("b"));
        }
        let cfg = Config::load(&source(&[(EMAIL_PORT, "587")])).unwrap();
        assert_eq!(cfg.email.smtp_port(), Some(587));
    }

    #[test]
    fn test_first_primitive_error_wins() {
        let err = Config::load(&source(&[
            (EMAIL_PORT, "nope"),
            (BADGE_REPORTS, "maybe"),
            (EMAIL_FROM, "not an address"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: EMAIL_PORT, .. }));

        let err = Config::load(&source(&[(BADGE_REPORTS, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: BADGE_REPORTS, .. }));

        let err = Config::load(&source(&[(METADATA_CARRIER, "labels")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: METADATA_CARRIER, .. }));
    }

    #[test]
    fn test_bad_addresses() {
        let err = Config::load(&source(&[(EMAIL_FROM, "not an address")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { key: EMAIL_FROM, .. }));

        let err = Config::load(&source(&[(EMAIL_RECIPIENTS, "ok@example.org, @@")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAddress { key: EMAIL_RECIPIENTS, .. }));
    }

    #[test]
    fn test_bad_time_zone() {
        let err = Config::load(&source(&[(EMAIL_TIME_ZONE, "Mars/Olympus_Mons")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownTimeZone(ref z) if z == "Mars/Olympus_Mons"));
        assert!(err.to_string().contains(EMAIL_TIME_ZONE));
    }

    #[test]
    fn test_bad_status() {
        let err = Config::load(&source(&[(EMAIL_BUILD_STATUSES, "FAILURE,failure")])).unwrap_err();
        assert!(
            matches!(err, ConfigError::UnknownStatus { ref status, .. } if status == "failure")
        );
    }

    #[test]
    fn test_trigger_name_globs() {
        let names = TriggerNames::new(set(&["main-*", "release-?", "[ab]c", "bad[", "lit"]));
        assert!(names.matches_glob("main-deploy"));
        assert!(!names.matches_glob("release-1x"));
        assert!(names.matches_glob("release-1"));
        assert!(names.matches_glob("bc"));
        assert!(!names.matches_glob("Main-deploy"));
        assert!(!names.matches_glob("main-a/b"));
        assert!(!names.matches_glob("bad["));
        assert!(names.contains("bad["));
        assert!(names.contains("lit"));
    }

    #[test]
    fn test_debug_redacts_password() {
        let cfg = Config::load(&source(&[(EMAIL_PASSWORD, "hunter2")])).unwrap();
        let dbg = format!("{:?}", cfg);
        assert!(!dbg.contains("hunter2"));
        assert!(dbg.contains("<redacted>"));
    }
}
