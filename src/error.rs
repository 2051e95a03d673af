//! Error types shared by the renderers and I/O collaborators.

use thiserror::Error;

/// Errors that can occur while rendering an email, badge or report
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("no badge info defined for status {0:?}")]
    NoBadgeStyle(String),

    #[error("no from address configured")]
    MissingFrom,

    #[error("invalid message: {0}")]
    Message(#[from] lettre::error::Error),

    #[error("failed writing {part}: {source}")]
    Write {
        part: &'static str,
        #[source]
        source: std::fmt::Error,
    },
}

/// Errors returned by a mail transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("invalid envelope: {0}")]
    Envelope(String),

    #[error("SMTP error: {0}")]
    Smtp(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors returned by an object store
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("failed writing {name} to bucket {bucket}: {message}")]
    Put {
        bucket: String,
        name: String,
        message: String,
    },

    #[error("I/O error writing {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
