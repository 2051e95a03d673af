//! Decisions about whether an event should produce an email or a badge.
//!
//! Both checks are pure. A rejection isn't an error: the caller logs it and
//! skips the corresponding step.

use thiserror::Error;

use crate::badge;
use crate::config::Config;
use crate::event::{BuildEvent, MetadataField};

/// Reasons for not sending an email about a build
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailRejection {
    #[error("EMAIL_HOSTNAME not set")]
    HostnameUnset,

    #[error("EMAIL_PORT not set")]
    PortUnset,

    #[error("EMAIL_PORT {0} out of range")]
    PortOutOfRange(i64),

    #[error("EMAIL_FROM not set")]
    FromUnset,

    #[error("EMAIL_RECIPIENTS not set")]
    RecipientsUnset,

    #[error(
        "trigger {trigger_id:?} ({trigger_name:?}) not matched by \
         EMAIL_BUILD_TRIGGER_IDS or EMAIL_BUILD_TRIGGER_NAMES"
    )]
    TriggerNotMatched {
        trigger_id: String,
        trigger_name: String,
    },

    #[error("status {0} not matched by EMAIL_BUILD_STATUSES")]
    StatusNotMatched(String),
}

/// Reasons for not writing a badge for a build
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BadgeRejection {
    #[error("BADGE_BUCKET not set")]
    BucketUnset,

    #[error("build not started by a trigger")]
    NoTrigger,

    #[error("non-badge status {0}")]
    UnsupportedStatus(String),
}

/// Check whether an email notification should be sent for `event`.
///
/// When trigger IDs or names are configured, the event must match at least
/// one of them: by trigger ID, by trigger name verbatim, or by trigger name
/// against a glob pattern from the name list.
pub fn check_email(cfg: &Config, event: &BuildEvent) -> Result<(), EmailRejection> {
    let email = &cfg.email;
    if email.hostname.is_none() {
        return Err(EmailRejection::HostnameUnset);
    }
    if email.port <= 0 {
        return Err(EmailRejection::PortUnset);
    }
    if u16::try_from(email.port).is_err() {
        return Err(EmailRejection::PortOutOfRange(email.port));
    }
    if email.from.is_none() {
        return Err(EmailRejection::FromUnset);
    }
    if email.recipients.is_empty() {
        return Err(EmailRejection::RecipientsUnset);
    }

    if email.restricts_triggers() {
        let name = event.field(cfg.metadata_carrier, MetadataField::TriggerName, "");
        let matched = email.trigger_ids.contains(&event.trigger_id)
            || email.trigger_names.contains(&name)
            || email.trigger_names.matches_glob(&name);
        if !matched {
            return Err(EmailRejection::TriggerNotMatched {
                trigger_id: event.trigger_id.clone(),
                trigger_name: name,
            });
        }
    }

    if !email.statuses.contains(&event.status) {
        return Err(EmailRejection::StatusNotMatched(event.status.to_string()));
    }
    Ok(())
}

/// Check whether a badge should be written for `event`.
pub fn check_badge(cfg: &Config, event: &BuildEvent) -> Result<(), BadgeRejection> {
    if cfg.badge.bucket.is_none() {
        return Err(BadgeRejection::BucketUnset);
    }
    if event.trigger_id.is_empty() {
        return Err(BadgeRejection::NoTrigger);
    }
    if badge::status_style(&event.status).is_none() {
        return Err(BadgeRejection::UnsupportedStatus(event.status.to_string()));
    }
    Ok(())
}
