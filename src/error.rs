//! Error taxonomy shared by every pipeline stage.
//!
//! Every failure carries the kind of the stage error that caused it plus a
//! human readable message, so the result envelope can report the originating
//! cause. Errors are `Clone` because a single failure is delivered to more
//! than one observer (the archive byte stream and its finalize signal).

use std::fmt;

/// The result type used by the pipeline stages.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Classification of a pipeline failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The source object does not exist.
    NotFound,
    /// The store refused the request for authorization reasons.
    AccessDenied,
    /// Network or protocol failure talking to the store.
    TransportError,
    /// The archive encoder failed.
    CompressionError,
    /// The store refused the write because of a size or quota limit.
    QuotaExceeded,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AccessDenied => "AccessDenied",
            ErrorKind::TransportError => "TransportError",
            ErrorKind::CompressionError => "CompressionError",
            ErrorKind::QuotaExceeded => "QuotaExceeded",
        };
        f.write_str(name)
    }
}

/// A stage failure with its kind and message preserved.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct PipelineError {
    kind: ErrorKind,
    message: String,
}

impl PipelineError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    #[must_use]
    pub fn access_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::AccessDenied, message)
    }

    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, message)
    }

    #[must_use]
    pub fn compression(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::CompressionError, message)
    }

    #[must_use]
    pub fn quota_exceeded(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::QuotaExceeded, message)
    }

    /// The classification of this failure.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// The message without the kind prefix.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Converts an I/O error raised while encoding or emitting the archive.
    pub fn from_encoder_io(err: std::io::Error) -> Self {
        Self::compression(err.to_string())
    }
}
