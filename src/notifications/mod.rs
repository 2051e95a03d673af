//! Email delivery for build notifications.
//!
//! Messages are rendered by [`email`] and handed to a [`MailTransport`] as raw
//! bytes together with an envelope.

pub mod email;

pub use email::{render_email, render_email_at, RenderContext};

use async_trait::async_trait;
use lettre::{
    address::Envelope,
    transport::smtp::{
        authentication::Credentials,
        client::{Tls, TlsParameters},
    },
    Address, AsyncSmtpTransport, AsyncTransport, Tokio1Executor,
};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::config::EmailConfig;
use crate::error::TransportError;

/// Something that can deliver an already rendered message
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(
        &self,
        from: &Address,
        to: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError>;
}

/// Delivers mail to the configured SMTP relay.
///
/// STARTTLS is used when the server offers it. Credentials are only sent
/// when a username is configured.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn from_config(config: &EmailConfig) -> Result<Self, TransportError> {
        let hostname = config
            .hostname
            .as_deref()
            .ok_or_else(|| TransportError::Smtp("EMAIL_HOSTNAME not set".to_string()))?;
        let port = config
            .smtp_port()
            .ok_or_else(|| TransportError::Smtp(format!("invalid EMAIL_PORT {}", config.port)))?;
        let tls = TlsParameters::new(hostname.to_string())
            .map_err(|e| TransportError::Smtp(e.to_string()))?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(hostname)
            .port(port)
            .tls(Tls::Opportunistic(tls));
        if let Some(username) = &config.username {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                config.password.clone().unwrap_or_default(),
            ));
        }

        tracing::debug!(hostname, port, "SMTP transport configured");
        Ok(Self {
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn send(
        &self,
        from: &Address,
        to: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError> {
        let envelope = Envelope::new(Some(from.clone()), to.to_vec())
            .map_err(|e| TransportError::Envelope(e.to_string()))?;
        self.transport
            .send_raw(&envelope, message)
            .await
            .map_err(|e| TransportError::Smtp(e.to_string()))?;
        Ok(())
    }
}

/// Writes messages to a stream instead of sending them.
///
/// Each message is preceded by its envelope in SMTP command form.
pub struct WriterMailer<W> {
    out: Mutex<W>,
}

/// Prints messages to stdout, for dry runs
pub type StdoutMailer = WriterMailer<tokio::io::Stdout>;

impl StdoutMailer {
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

impl<W> WriterMailer<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
        }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> MailTransport for WriterMailer<W> {
    async fn send(
        &self,
        from: &Address,
        to: &[Address],
        message: &[u8],
    ) -> Result<(), TransportError> {
        let mut envelope = format!("MAIL FROM:<{}>\r\n", from);
        for rcpt in to {
            envelope.push_str(&format!("RCPT TO:<{}>\r\n", rcpt));
        }
        envelope.push_str("\r\n");

        let mut out = self.out.lock().await;
        out.write_all(envelope.as_bytes()).await?;
        out.write_all(message).await?;
        out.flush().await?;
        Ok(())
    }
}
