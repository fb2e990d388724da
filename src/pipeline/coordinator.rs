//! Wires the source, archive and upload stages together for one invocation.

use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use log::{debug, error, info};

use crate::cloud::store::BlobStore;
use crate::error::PipelineError;
use crate::models::{
    ArchiveEntry, ByteStream, DestinationObjectRef, PipelineOutcome, SourceObjectRef,
};
use crate::pipeline::archive::{ArchiveOptions, ArchiveStage};
use crate::pipeline::settlement::{Settlement, TransferError};
use crate::pipeline::source::SourceReader;
use crate::pipeline::upload::{DestinationWriter, UploadOptions, UploadSink};

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub archive: ArchiveOptions,
    pub upload: UploadOptions,
}

/// Runs source → archive → destination and reports exactly one outcome.
#[derive(Clone)]
pub struct PipelineCoordinator {
    store: Arc<dyn BlobStore>,
    options: PipelineOptions,
}

impl PipelineCoordinator {
    pub fn new(store: Arc<dyn BlobStore>, options: PipelineOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Streams `source` into a single-entry archive named `entry_name` and
    /// uploads it to `destination`.
    ///
    /// Success is reported only after the archive trailer is written and the
    /// store has acknowledged the object. The first failure from any stage
    /// settles the outcome; stages still running are abandoned.
    pub async fn process(
        &self,
        source: &SourceObjectRef,
        entry_name: &str,
        destination: DestinationObjectRef,
    ) -> PipelineOutcome {
        let started = Instant::now();
        info!("Archiving {} as {} into {}", source, entry_name, destination);

        let mut settlement = Settlement::new();
        settlement.start();

        let content = SourceReader::new(Arc::clone(&self.store)).open(source);
        let archive = ArchiveStage::new(self.options.archive.clone())
            .compress(vec![ArchiveEntry::new(entry_name, content)]);
        let (sink, mut completion) =
            DestinationWriter::new(Arc::clone(&self.store), self.options.upload.clone())
                .open_upload(destination.clone());

        let mut finalize = archive.finalize;
        let transfer = transfer(archive.bytes, sink);
        tokio::pin!(transfer);

        while !settlement.is_settled() {
            tokio::select! {
                result = &mut transfer, if !settlement.transfer_observed() => {
                    debug!("Transfer into {} ended: {:?}", destination, result);
                    settlement.on_transfer(result);
                }
                result = &mut finalize, if !settlement.finalize_observed() => {
                    debug!("Archive finalized: {:?}", result);
                    settlement.on_finalize(result);
                }
                result = &mut completion, if !settlement.upload_observed() => {
                    debug!("Upload of {} completed: {:?}", destination, result);
                    settlement.on_upload(result);
                }
                else => {
                    settlement.fail(PipelineError::transport(
                        "pipeline stages ended without a terminal signal",
                    ));
                }
            }
        }

        let outcome = match settlement.outcome() {
            Some(outcome) => outcome.clone(),
            None => PipelineOutcome::failure(PipelineError::transport("pipeline was not settled")),
        };

        match &outcome {
            PipelineOutcome::Success { .. } => {
                let archive_bytes = settlement
                    .archive_summary()
                    .map(|summary| summary.archive_bytes)
                    .unwrap_or_default();
                let parts = settlement
                    .upload_result()
                    .map(|upload| upload.parts)
                    .unwrap_or_default();
                info!(
                    "Uploaded {} ({} bytes, {} parts) in {:.2?}",
                    destination,
                    archive_bytes,
                    parts,
                    started.elapsed()
                );
            }
            PipelineOutcome::Failure { cause } => {
                error!("Failed to archive {} into {}: {}", source, destination, cause);
            }
        }
        outcome
    }
}

/// Pushes archive bytes into the sink and closes it once the archive ends.
async fn transfer(mut bytes: ByteStream, mut sink: UploadSink) -> Result<u64, TransferError> {
    while let Some(chunk) = bytes.next().await {
        let chunk = chunk.map_err(TransferError::Archive)?;
        sink.feed(chunk).await.map_err(TransferError::Sink)?;
    }
    sink.close().await.map_err(TransferError::Sink)?;
    Ok(sink.bytes_pushed())
}
