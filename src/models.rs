//! Invocation-scoped data model of the pipeline.
//!
//! None of these values outlive a single invocation of the pipeline; they
//! are created when `process` starts and dropped once the outcome is known.

use std::fmt;

use bytes::Bytes;
use futures::stream::BoxStream;

use crate::constants::{ARCHIVE_CONTENT_TYPE, SUCCESS_MESSAGE};
use crate::error::{ErrorKind, PipelineError};

/// Lazy, forward-only, single-pass sequence of byte chunks.
pub type ByteStream = BoxStream<'static, Result<Bytes, PipelineError>>;

/// Identifies the stored object a pipeline reads from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceObjectRef {
    pub location: String,
    pub key: String,
}

impl SourceObjectRef {
    pub fn new(location: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for SourceObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.location, self.key)
    }
}

/// Identifies where the archive is republished and how it is labelled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestinationObjectRef {
    pub location: String,
    pub key: String,
    pub content_type: String,
}

impl DestinationObjectRef {
    /// Destination for a zip archive (`application/zip`).
    pub fn archive(location: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            key: key.into(),
            content_type: ARCHIVE_CONTENT_TYPE.to_string(),
        }
    }
}

impl fmt::Display for DestinationObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "s3://{}/{}", self.location, self.key)
    }
}

/// One named member of the archive; its content is consumed exactly once.
pub struct ArchiveEntry {
    pub name: String,
    pub content: ByteStream,
}

impl ArchiveEntry {
    pub fn new(name: impl Into<String>, content: ByteStream) -> Self {
        Self {
            name: name.into(),
            content,
        }
    }
}

impl fmt::Debug for ArchiveEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArchiveEntry")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Totals reported once the archive trailer has been written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub entries: usize,
    pub uncompressed_bytes: u64,
    pub compressed_bytes: u64,
    pub archive_bytes: u64,
}

/// Acknowledgement from the store that the object is durably written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub location: String,
    pub key: String,
    pub e_tag: Option<String>,
    pub bytes: u64,
    pub parts: usize,
}

/// The single terminal value produced per pipeline invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Success {
        message: String,
    },
    Failure {
        cause: PipelineError,
    },
}

impl PipelineOutcome {
    pub fn success() -> Self {
        PipelineOutcome::Success {
            message: SUCCESS_MESSAGE.to_string(),
        }
    }

    pub fn failure(cause: PipelineError) -> Self {
        PipelineOutcome::Failure { cause }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Success { .. })
    }

    /// Kind of the failure cause, if this outcome is a failure.
    pub fn failure_kind(&self) -> Option<ErrorKind> {
        match self {
            PipelineOutcome::Success { .. } => None,
            PipelineOutcome::Failure { cause } => Some(cause.kind()),
        }
    }

    /// Message for the caller-facing result.
    pub fn message(&self) -> String {
        match self {
            PipelineOutcome::Success { message } => message.clone(),
            PipelineOutcome::Failure { cause } => cause.to_string(),
        }
    }
}
