//! Single-assignment resolution of a pipeline invocation.
//!
//! The coordinator feeds every stage signal into a [`Settlement`]. The first
//! authoritative failure, or the arrival of all success signals, fixes the
//! outcome; anything observed afterwards is ignored.

use log::debug;

use crate::error::PipelineError;
use crate::models::{ArchiveSummary, PipelineOutcome, UploadResult};

/// Lifecycle of one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    Streaming,
    /// Some completion signals have arrived, others are still pending.
    AwaitingFinalize,
    Settled,
}

/// Why moving archive bytes into the upload sink stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The archive stream delivered an error (source or encoder failure).
    Archive(PipelineError),
    /// The sink refused bytes; the upload completion carries the cause.
    Sink(PipelineError),
}

#[derive(Debug)]
pub struct Settlement {
    state: PipelineState,
    transferred: Option<u64>,
    transfer_observed: bool,
    archive: Option<ArchiveSummary>,
    finalize_observed: bool,
    upload: Option<UploadResult>,
    upload_observed: bool,
    sink_error: Option<PipelineError>,
    outcome: Option<PipelineOutcome>,
}

impl Default for Settlement {
    fn default() -> Self {
        Self::new()
    }
}

impl Settlement {
    pub fn new() -> Self {
        Self {
            state: PipelineState::Idle,
            transferred: None,
            transfer_observed: false,
            archive: None,
            finalize_observed: false,
            upload: None,
            upload_observed: false,
            sink_error: None,
            outcome: None,
        }
    }

    pub fn start(&mut self) {
        if self.state == PipelineState::Idle {
            self.state = PipelineState::Streaming;
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_settled(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn transfer_observed(&self) -> bool {
        self.transfer_observed
    }

    pub fn finalize_observed(&self) -> bool {
        self.finalize_observed
    }

    pub fn upload_observed(&self) -> bool {
        self.upload_observed
    }

    pub fn archive_summary(&self) -> Option<&ArchiveSummary> {
        self.archive.as_ref()
    }

    pub fn upload_result(&self) -> Option<&UploadResult> {
        self.upload.as_ref()
    }

    /// Records the end of the byte transfer. Returns true if this settled the outcome.
    pub fn on_transfer(&mut self, result: Result<u64, TransferError>) -> bool {
        if self.ignore("transfer") {
            return false;
        }
        self.transfer_observed = true;
        match result {
            Ok(bytes) => {
                self.transferred = Some(bytes);
                self.try_succeed()
            }
            Err(TransferError::Archive(err)) => self.settle(PipelineOutcome::failure(err)),
            Err(TransferError::Sink(err)) => {
                self.sink_error = Some(err);
                self.state = PipelineState::AwaitingFinalize;
                false
            }
        }
    }

    /// Records the archive finalize signal. Returns true if this settled the outcome.
    ///
    /// Once the sink has rejected bytes the archive fails only because its
    /// consumer went away, so the upload completion decides the cause.
    pub fn on_finalize(&mut self, result: Result<ArchiveSummary, PipelineError>) -> bool {
        if self.ignore("archive finalize") {
            return false;
        }
        self.finalize_observed = true;
        match result {
            Ok(summary) => {
                self.archive = Some(summary);
                self.try_succeed()
            }
            Err(err) if self.sink_error.is_some() => {
                debug!("Archive stopped after the upload rejected data: {}", err);
                self.state = PipelineState::AwaitingFinalize;
                false
            }
            Err(err) => self.settle(PipelineOutcome::failure(err)),
        }
    }

    /// Records the upload completion. Returns true if this settled the outcome.
    pub fn on_upload(&mut self, result: Result<UploadResult, PipelineError>) -> bool {
        if self.ignore("upload completion") {
            return false;
        }
        self.upload_observed = true;
        match result {
            Ok(upload) => {
                if let Some(err) = self.sink_error.take() {
                    return self.settle(PipelineOutcome::failure(err));
                }
                self.upload = Some(upload);
                self.try_succeed()
            }
            Err(err) => self.settle(PipelineOutcome::failure(err)),
        }
    }

    /// Settles as failure unless already settled.
    pub fn fail(&mut self, err: PipelineError) -> bool {
        self.settle(PipelineOutcome::failure(err))
    }

    fn ignore(&self, signal: &str) -> bool {
        if self.is_settled() {
            debug!("Ignoring {} signal after settlement", signal);
            return true;
        }
        false
    }

    fn try_succeed(&mut self) -> bool {
        if self.transferred.is_some() && self.archive.is_some() && self.upload.is_some() {
            return self.settle(PipelineOutcome::success());
        }
        self.state = PipelineState::AwaitingFinalize;
        false
    }

    fn settle(&mut self, outcome: PipelineOutcome) -> bool {
        if self.outcome.is_some() {
            return false;
        }
        self.outcome = Some(outcome);
        self.state = PipelineState::Settled;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn upload() -> UploadResult {
        UploadResult {
            location: "bucket".into(),
            key: "zip/q1.zip".into(),
            e_tag: Some("\"abc\"".into()),
            bytes: 42,
            parts: 1,
        }
    }

    #[test]
    fn test_success_needs_every_signal() {
        let mut settlement = Settlement::new();
        settlement.start();
        assert_eq!(settlement.state(), PipelineState::Streaming);

        assert!(!settlement.on_transfer(Ok(42)));
        assert_eq!(settlement.state(), PipelineState::AwaitingFinalize);
        assert!(!settlement.on_finalize(Ok(ArchiveSummary::default())));
        assert!(settlement.on_upload(Ok(upload())));

        assert_eq!(settlement.state(), PipelineState::Settled);
        assert!(settlement.outcome().unwrap().is_success());
    }

    #[test]
    fn test_completion_signals_in_either_order() {
        let mut first = Settlement::new();
        first.on_transfer(Ok(1));
        first.on_upload(Ok(upload()));
        assert!(first.on_finalize(Ok(ArchiveSummary::default())));

        let mut second = Settlement::new();
        second.on_finalize(Ok(ArchiveSummary::default()));
        second.on_transfer(Ok(1));
        assert!(second.on_upload(Ok(upload())));

        assert_eq!(first.outcome(), second.outcome());
    }

    #[test]
    fn test_first_failure_wins() {
        let mut settlement = Settlement::new();
        assert!(settlement.on_finalize(Err(PipelineError::not_found("s3://bucket/missing"))));

        // Later signals, including a late success and a different failure, change nothing.
        assert!(!settlement.on_upload(Err(PipelineError::transport("abandoned"))));
        assert!(!settlement.on_transfer(Ok(10)));
        assert!(!settlement.fail(PipelineError::compression("late")));

        assert_eq!(settlement.outcome().unwrap().failure_kind(), Some(ErrorKind::NotFound));
    }

    #[test]
    fn test_duplicate_signals_are_ignored() {
        let mut settlement = Settlement::new();
        settlement.on_transfer(Ok(1));
        settlement.on_finalize(Ok(ArchiveSummary::default()));
        assert!(settlement.on_upload(Ok(upload())));

        let settled = settlement.outcome().cloned();
        assert!(!settlement.on_upload(Ok(upload())));
        assert!(!settlement.on_upload(Err(PipelineError::transport("close after end"))));
        assert_eq!(settlement.outcome().cloned(), settled);
    }

    #[test]
    fn test_sink_error_defers_to_upload_cause() {
        let mut settlement = Settlement::new();
        assert!(!settlement.on_transfer(Err(TransferError::Sink(PipelineError::transport(
            "upload no longer accepts data"
        )))));
        assert!(!settlement.is_settled());

        assert!(settlement.on_upload(Err(PipelineError::quota_exceeded("bucket quota"))));
        assert_eq!(settlement.outcome().unwrap().failure_kind(), Some(ErrorKind::QuotaExceeded));
    }

    #[test]
    fn test_sink_error_never_becomes_success() {
        let mut settlement = Settlement::new();
        settlement.on_transfer(Err(TransferError::Sink(PipelineError::transport("rejected"))));
        settlement.on_finalize(Ok(ArchiveSummary::default()));
        assert!(settlement.on_upload(Ok(upload())));
        assert!(!settlement.outcome().unwrap().is_success());
    }

    #[test]
    fn test_consumer_loss_after_sink_error_defers_to_upload() {
        let mut settlement = Settlement::new();
        settlement.on_transfer(Err(TransferError::Sink(PipelineError::transport("rejected"))));
        assert!(!settlement.on_finalize(Err(PipelineError::compression(
            "archive output closed by its consumer"
        ))));
        assert!(settlement.on_upload(Err(PipelineError::access_denied("put refused"))));
        assert_eq!(settlement.outcome().unwrap().failure_kind(), Some(ErrorKind::AccessDenied));
    }

    #[test]
    fn test_archive_error_settles_immediately() {
        let mut settlement = Settlement::new();
        assert!(settlement.on_transfer(Err(TransferError::Archive(PipelineError::compression(
            "deflate failed"
        )))));
        assert_eq!(
            settlement.outcome().unwrap().failure_kind(),
            Some(ErrorKind::CompressionError)
        );
    }
}
