//! CLI module for the build-watcher command-line interface.
//!
//! Provides subcommands:
//! - `process [EVENT]` - Send emails and publish badges for build events
//! - `email [EVENT]` - Print the notification email for an event
//! - `badge <OUTPUT>` - Render a sample badge to a file
//! - `config check` - Validate the configuration

use anyhow::{Context, Result};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::badge::{render_badge, render_report};
use crate::config::{Config, EnvSource, FileSource, Layered};
use crate::engine::Watcher;
use crate::event::{BuildEvent, BuildStatus};
use crate::notifications::{render_email, MailTransport, SmtpMailer, StdoutMailer};
use crate::storage::{DirStore, ObjectStore, S3Store};

/// Events are queued to the watcher with this much backlog
const EVENT_QUEUE: usize = 16;

/// CLI arguments structure
#[derive(Parser, Debug)]
#[command(name = "build-watcher")]
#[command(author, version, about = "Emails and status badges for build events", long_about = None)]
pub struct Cli {
    /// TOML file with configuration keys; environment variables take precedence
    #[arg(short, long, env = "BUILD_WATCHER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is unset
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send emails and publish badges for build events
    Process {
        /// JSON file with one or more events (default: stdin)
        event: Option<PathBuf>,
        /// Print emails and write badges under this directory instead
        #[arg(long, value_name = "DIR")]
        dry_run: Option<PathBuf>,
    },

    /// Print the notification email for each event, ignoring filters
    Email {
        /// JSON file with one or more events (default: stdin)
        event: Option<PathBuf>,
    },

    /// Render a sample badge
    Badge {
        /// Where to write the SVG file
        output: PathBuf,
        /// Build status to render
        #[arg(short, long, default_value = "SUCCESS")]
        status: String,
        /// Also write an HTML report next to the badge
        #[arg(long)]
        report: bool,
    },

    /// Configuration management commands
    #[command(subcommand)]
    Config(ConfigCommands),
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Validate configuration and print a summary
    Check,
}

pub async fn run_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Process { event, dry_run } => {
            cmd_process(cli, event.as_deref(), dry_run.as_deref()).await
        }
        Commands::Email { event } => cmd_email(cli, event.as_deref()).await,
        Commands::Badge {
            output,
            status,
            report,
        } => cmd_badge(output, status, *report).await,
        Commands::Config(ConfigCommands::Check) => cmd_config_check(cli),
    }
}

/// Load configuration from the environment, layered over the config file
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut layers = Layered::new().with(EnvSource);
    if let Some(path) = path {
        layers = layers.with(FileSource::load(path)?);
    }
    Config::load(&layers).context("Invalid configuration")
}

/// Parse a stream of JSON event documents
pub fn parse_events(data: &[u8]) -> Result<Vec<BuildEvent>> {
    let events = serde_json::Deserializer::from_slice(data)
        .into_iter::<BuildEvent>()
        .enumerate()
        .map(|(i, event)| event.with_context(|| format!("Failed to parse event #{}", i + 1)))
        .collect::<Result<Vec<_>>>()?;
    if events.is_empty() {
        anyhow::bail!("No build events in input");
    }
    Ok(events)
}

async fn read_events(path: Option<&Path>) -> Result<Vec<BuildEvent>> {
    let data = match path {
        Some(path) => tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?,
        None => {
            let mut data = Vec::new();
            tokio::io::stdin()
                .read_to_end(&mut data)
                .await
                .context("Failed to read stdin")?;
            data
        }
    };
    parse_events(&data)
}

/// Run the watcher over every event in the input
async fn cmd_process(cli: &Cli, event: Option<&Path>, dry_run: Option<&Path>) -> Result<()> {
    let config = Arc::new(load_config(cli.config.as_deref())?);
    let events = read_events(event).await?;

    let (mailer, store): (Arc<dyn MailTransport>, Arc<dyn ObjectStore>) = match dry_run {
        Some(dir) => {
            tracing::info!(dir = %dir.display(), "Dry run");
            let mailer: Arc<dyn MailTransport> = Arc::new(StdoutMailer::stdout());
            let store: Arc<dyn ObjectStore> = Arc::new(DirStore::new(dir));
            (mailer, store)
        }
        None => {
            // Unset destinations are never reached: eligibility rejects the
            // step first.
            let mailer: Arc<dyn MailTransport> =
                match (&config.email.hostname, config.email.smtp_port()) {
                    (Some(_), Some(_)) => Arc::new(SmtpMailer::from_config(&config.email)?),
                    _ => Arc::new(StdoutMailer::stdout()),
                };
            let store: Arc<dyn ObjectStore> = match &config.badge.bucket {
                Some(bucket) => Arc::new(S3Store::new(bucket.clone()).await),
                None => Arc::new(DirStore::new(".")),
            };
            (mailer, store)
        }
    };

    let watcher = Watcher::new(config, mailer, store);
    let (tx, rx) = mpsc::channel(EVENT_QUEUE);
    tokio::spawn(async move {
        for event in events {
            if tx.send(event).await.is_err() {
                break;
            }
        }
    });

    let stats = watcher.run(rx).await;
    if stats.failures > 0 {
        anyhow::bail!("{} of {} events failed", stats.failures, stats.events);
    }
    Ok(())
}

/// Print rendered emails to stdout
async fn cmd_email(cli: &Cli, event: Option<&Path>) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    let mut stdout = tokio::io::stdout();
    for event in read_events(event).await? {
        let message = render_email(&config, &event)
            .with_context(|| format!("Failed to render email for build {}", event.id))?;
        stdout.write_all(&message).await?;
    }
    stdout.flush().await?;
    Ok(())
}

/// Event used for sample badges
fn sample_event(status: &str) -> BuildEvent {
    let finish = Utc::now();
    BuildEvent {
        id: "sample".to_string(),
        trigger_id: "sample".to_string(),
        status: BuildStatus::from(status.to_uppercase()),
        start_time: Some(finish - Duration::seconds(83)),
        finish_time: Some(finish),
        ..Default::default()
    }
}

async fn cmd_badge(output: &Path, status: &str, report: bool) -> Result<()> {
    let event = sample_event(status);
    let svg = render_badge(&event)?;
    tokio::fs::write(output, svg)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());

    if report {
        let path = output.with_extension("html");
        tokio::fs::write(&path, render_report(&event)?)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn cmd_config_check(cli: &Cli) -> Result<()> {
    if let Some(path) = &cli.config {
        println!("Checking configuration file: {}", path.display());
        println!();
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            println!("[!!] Configuration is invalid!");
            println!();
            println!("Error: {:#}", e);
            anyhow::bail!("Invalid configuration");
        }
    };

    let email = &config.email;
    let or_unset = |v: Option<&str>| v.unwrap_or("(unset)").to_string();
    println!("[OK] Configuration is valid!");
    println!();
    println!("=== Configuration Summary ===");
    println!();
    println!("Email:");
    println!("  Hostname:     {}", or_unset(email.hostname.as_deref()));
    println!("  Port:         {}", email.port);
    println!("  Username:     {}", or_unset(email.username.as_deref()));
    println!(
        "  Password:     {}",
        if email.password.is_some() { "(set)" } else { "(unset)" }
    );
    println!(
        "  From:         {}",
        or_unset(email.from.as_ref().map(|m| m.to_string()).as_deref())
    );
    println!("  Recipients:   {}", email.recipient_addrs().join(", "));
    println!("  Time zone:    {}", email.time_zone.name());
    println!("  Trigger IDs:  {}", join(&email.trigger_ids));
    println!("  Trigger names: {}", join(email.trigger_names.names()));
    println!("  Trigger URL:  {}", or_unset(email.trigger_url.as_deref()));
    println!("  Statuses:     {}", join(&email.statuses));
    println!();
    println!("Badges:");
    println!("  Bucket:       {}", or_unset(config.badge.bucket.as_deref()));
    println!(
        "  Reports:      {}",
        if config.badge.reports { "Enabled" } else { "Disabled" }
    );
    println!();
    println!("Metadata carrier: {}", config.metadata_carrier);
    println!();

    let mut warnings = Vec::new();
    if email.hostname.is_none()
        || email.smtp_port().is_none()
        || email.from.is_none()
        || email.recipients.is_empty()
    {
        warnings.push("Email is not fully configured - no emails will be sent");
    }
    if config.badge.bucket.is_none() {
        warnings.push("No badge bucket configured - no badges will be written");
    }
    if !warnings.is_empty() {
        println!("Warnings:");
        for warning in warnings {
            println!("  [!] {}", warning);
        }
        println!();
    }
    Ok(())
}

fn join<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> String {
    let items: Vec<String> = items.into_iter().map(|i| i.to_string()).collect();
    if items.is_empty() {
        "(any)".to_string()
    } else {
        items.join(", ")
    }
}
