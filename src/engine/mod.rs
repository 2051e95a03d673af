//! The build watcher pipeline.
//!
//! For every event the [`Watcher`] decides independently whether to send an
//! email and whether to publish a badge, then renders and delivers each
//! artifact. A failure in one branch never affects the other.

pub mod eligibility;

pub use eligibility::{check_badge, check_email, BadgeRejection, EmailRejection};

use lettre::Address;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::badge::{render_badge, render_report};
use crate::config::Config;
use crate::error::{RenderError, StorageError, TransportError};
use crate::event::{BuildEvent, MetadataField};
use crate::notifications::{render_email, MailTransport};
use crate::storage::{ObjectStore, StoredObject};

/// Failure while producing or delivering one artifact
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// What happened to one branch of the pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Done,
    /// Not eligible, with the reason
    Skipped(String),
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Done => write!(f, "done"),
            Self::Skipped(reason) => write!(f, "skipped: {}", reason),
            Self::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Outcome of processing a single event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub email: StepOutcome,
    pub badge: StepOutcome,
}

impl ProcessReport {
    pub fn has_failures(&self) -> bool {
        self.email.is_failed() || self.badge.is_failed()
    }
}

/// Totals for a stream of events
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub events: usize,
    pub failures: usize,
}

pub struct Watcher {
    config: Arc<Config>,
    mailer: Arc<dyn MailTransport>,
    store: Arc<dyn ObjectStore>,
}

impl Watcher {
    pub fn new(
        config: Arc<Config>,
        mailer: Arc<dyn MailTransport>,
        store: Arc<dyn ObjectStore>,
    ) -> Self {
        Self {
            config,
            mailer,
            store,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Process every event received on `rx` until the channel closes
    pub async fn run(&self, mut rx: mpsc::Receiver<BuildEvent>) -> RunStats {
        tracing::info!("Build watcher started");
        let mut stats = RunStats::default();
        while let Some(event) = rx.recv().await {
            stats.events += 1;
            if self.handle(&event).await.has_failures() {
                stats.failures += 1;
            }
        }
        tracing::info!(
            events = stats.events,
            failures = stats.failures,
            "Build watcher stopped"
        );
        stats
    }

    /// Run both branches of the pipeline for one event
    pub async fn handle(&self, event: &BuildEvent) -> ProcessReport {
        let trigger_name =
            event.field(self.config.metadata_carrier, MetadataField::TriggerName, "");
        let span = tracing::info_span!(
            "build",
            build_id = %event.id,
            trigger_id = %event.trigger_id,
            trigger_name = %trigger_name,
            status = %event.status,
        );

        async {
            let (email, badge) = tokio::join!(self.email_step(event), self.badge_step(event));
            ProcessReport { email, badge }
        }
        .instrument(span)
        .await
    }

    async fn email_step(&self, event: &BuildEvent) -> StepOutcome {
        if let Err(reason) = check_email(&self.config, event) {
            tracing::info!(%reason, "Not sending email");
            return StepOutcome::Skipped(reason.to_string());
        }
        match self.send_email(event).await {
            Ok(()) => {
                tracing::info!(
                    recipients = self.config.email.recipients.len(),
                    "Sent email"
                );
                StepOutcome::Done
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed sending email");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    async fn badge_step(&self, event: &BuildEvent) -> StepOutcome {
        if let Err(reason) = check_badge(&self.config, event) {
            tracing::info!(%reason, "Not writing badge");
            return StepOutcome::Skipped(reason.to_string());
        }
        match self.write_badge(event).await {
            Ok(()) => {
                tracing::info!(reports = self.config.badge.reports, "Wrote badge");
                StepOutcome::Done
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed writing badge");
                StepOutcome::Failed(e.to_string())
            }
        }
    }

    /// Render and send the notification email, without checking eligibility
    pub async fn send_email(&self, event: &BuildEvent) -> Result<(), StepError> {
        let email = &self.config.email;
        let from = email.from.as_ref().ok_or(RenderError::MissingFrom)?;
        let message = render_email(&self.config, event)?;
        let to: Vec<Address> = email.recipients.iter().map(|m| m.email.clone()).collect();
        tracing::debug!(bytes = message.len(), "Rendered email");
        self.mailer.send(&from.email, &to, &message).await?;
        Ok(())
    }

    /// Render and store the badge, and the report if enabled, without
    /// checking eligibility.
    ///
    /// Everything is rendered before anything is written.
    pub async fn write_badge(&self, event: &BuildEvent) -> Result<(), StepError> {
        let svg = render_badge(event)?;
        let report = if self.config.badge.reports {
            Some(render_report(event)?)
        } else {
            None
        };

        self.store
            .put(StoredObject::badge(&event.trigger_id, svg))
            .await?;
        if let Some(html) = report {
            self.store
                .put(StoredObject::report(&event.trigger_id, html))
                .await?;
        }
        Ok(())
    }
}
