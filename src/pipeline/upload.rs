use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::{Sink, SinkExt};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::PollSender;

use crate::cloud::store::{BlobStore, UploadedPart};
use crate::constants::{
    DEFAULT_WINDOW_CHUNKS, S3_MAX_PARTS, S3_MIN_PART_SIZE, S3_UPLOAD_PART_SIZE_MB,
};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::models::{DestinationObjectRef, UploadResult};
use crate::pipeline::task::StageSignal;

#[derive(Debug, Clone)]
pub struct UploadOptions {
    /// Bytes buffered before a multipart part is sent. Objects smaller than
    /// one part are written with a single put.
    pub part_size: usize,
    /// Chunks the sink accepts ahead of the upload task.
    pub window_chunks: usize,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            part_size: S3_UPLOAD_PART_SIZE_MB * 1024 * 1024,
            window_chunks: DEFAULT_WINDOW_CHUNKS,
        }
    }
}

impl UploadOptions {
    /// Options with a part size clamped to the S3 minimum part size.
    pub fn for_s3(part_size_mb: usize, window_chunks: usize) -> Self {
        Self {
            part_size: (part_size_mb * 1024 * 1024).max(S3_MIN_PART_SIZE),
            window_chunks,
        }
    }
}

/// Resolves once the store has acknowledged the object.
pub type UploadCompletion = StageSignal<UploadResult>;

/// Streams pushed bytes into the store.
#[derive(Clone)]
pub struct DestinationWriter {
    store: Arc<dyn BlobStore>,
    options: UploadOptions,
}

impl DestinationWriter {
    pub fn new(store: Arc<dyn BlobStore>, options: UploadOptions) -> Self {
        Self { store, options }
    }

    /// Starts an upload to `destination`.
    ///
    /// Closing the sink commits the upload; dropping it without closing
    /// abandons the upload and any stored parts are aborted. The returned
    /// completion is the only signal that the object is durable.
    pub fn open_upload(&self, destination: DestinationObjectRef) -> (UploadSink, UploadCompletion) {
        let (sender, receiver) = mpsc::channel(self.options.window_chunks.max(1));
        let (commit, committed) = oneshot::channel();

        let sink = UploadSink {
            sender: PollSender::new(sender),
            commit: Some(commit),
            destination: destination.to_string(),
            bytes_pushed: 0,
        };

        let uploader = PartUploader {
            store: Arc::clone(&self.store),
            destination,
            part_size: self.options.part_size.max(1),
            upload_id: None,
            parts: Vec::new(),
            bytes_uploaded: 0,
        };
        let completion = StageSignal::spawn(
            "upload",
            ErrorKind::TransportError,
            run_upload(uploader, receiver, committed),
        );

        (sink, completion)
    }
}

/// Push side of an upload. Accepts bytes until closed or until the upload fails.
pub struct UploadSink {
    sender: PollSender<Bytes>,
    commit: Option<oneshot::Sender<()>>,
    destination: String,
    bytes_pushed: u64,
}

impl UploadSink {
    pub fn bytes_pushed(&self) -> u64 {
        self.bytes_pushed
    }

    fn rejected(&self) -> PipelineError {
        PipelineError::transport(format!("upload to {} no longer accepts data", self.destination))
    }
}

impl Sink<Bytes> for UploadSink {
    type Error = PipelineError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = &mut *self;
        this.sender.poll_ready_unpin(cx).map_err(|_| this.rejected())
    }

    fn start_send(mut self: Pin<&mut Self>, item: Bytes) -> Result<()> {
        let this = &mut *self;
        this.bytes_pushed += item.len() as u64;
        this.sender.start_send_unpin(item).map_err(|_| this.rejected())
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = &mut *self;
        this.sender.poll_flush_unpin(cx).map_err(|_| this.rejected())
    }

    fn poll_close(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<()>> {
        let this = &mut *self;
        // Commit before closing so the task sees it once the channel drains.
        if let Some(commit) = this.commit.take() {
            if commit.send(()).is_err() {
                return Poll::Ready(Err(this.rejected()));
            }
        }
        this.sender.poll_close_unpin(cx).map_err(|_| this.rejected())
    }
}

struct PartUploader {
    store: Arc<dyn BlobStore>,
    destination: DestinationObjectRef,
    part_size: usize,
    upload_id: Option<String>,
    parts: Vec<UploadedPart>,
    bytes_uploaded: u64,
}

impl PartUploader {
    async fn send_part(&mut self, body: Bytes) -> Result<()> {
        let upload_id = match &self.upload_id {
            Some(id) => id.clone(),
            None => {
                let id = self.store.create_multipart_upload(&self.destination).await?;
                debug!("Started multipart upload with ID: {} for {}", id, self.destination);
                self.upload_id = Some(id.clone());
                id
            }
        };

        let part_number = self.parts.len() as i64 + 1;
        if part_number > S3_MAX_PARTS {
            return Err(PipelineError::quota_exceeded(format!(
                "{} needs more than {} parts of {} bytes",
                self.destination, S3_MAX_PARTS, self.part_size
            )));
        }

        let size = body.len() as u64;
        let part = self
            .store
            .upload_part(&self.destination, &upload_id, part_number, body)
            .await?;
        self.parts.push(part);
        self.bytes_uploaded += size;

        debug!("Uploaded part {} ({} bytes) of {}", part_number, size, self.destination);
        Ok(())
    }

    async fn finish(&mut self, tail: Bytes) -> Result<UploadResult> {
        let e_tag = match self.upload_id.clone() {
            None => {
                let size = tail.len() as u64;
                let e_tag = self.store.put_object(&self.destination, tail).await?;
                self.bytes_uploaded += size;
                e_tag
            }
            Some(upload_id) => {
                if !tail.is_empty() {
                    self.send_part(tail).await?;
                }
                let e_tag = self
                    .store
                    .complete_multipart_upload(&self.destination, &upload_id, self.parts.clone())
                    .await?;
                // Completed uploads must not be aborted.
                self.upload_id = None;
                debug!("Completed multipart upload for {}", self.destination);
                e_tag
            }
        };

        Ok(UploadResult {
            location: self.destination.location.clone(),
            key: self.destination.key.clone(),
            e_tag,
            bytes: self.bytes_uploaded,
            parts: self.parts.len().max(1),
        })
    }

    async fn abort(&mut self) {
        if let Some(upload_id) = self.upload_id.take() {
            match self
                .store
                .abort_multipart_upload(&self.destination, &upload_id)
                .await
            {
                Ok(()) => warn!("Aborted multipart upload {} for {}", upload_id, self.destination),
                Err(e) => warn!("Failed to abort upload {}: {}", upload_id, e),
            }
        }
    }
}

async fn run_upload(
    mut uploader: PartUploader,
    receiver: mpsc::Receiver<Bytes>,
    committed: oneshot::Receiver<()>,
) -> Result<UploadResult> {
    let result = drain_into_parts(&mut uploader, receiver, committed).await;
    if let Err(err) = &result {
        warn!("Upload to {} failed: {}", uploader.destination, err);
        uploader.abort().await;
    }
    result
}

/// Owns the receiver so that it is dropped, and the sink starts rejecting
/// writes, as soon as the upload fails.
async fn drain_into_parts(
    uploader: &mut PartUploader,
    mut receiver: mpsc::Receiver<Bytes>,
    committed: oneshot::Receiver<()>,
) -> Result<UploadResult> {
    let mut buffer = BytesMut::with_capacity(uploader.part_size);

    while let Some(chunk) = receiver.recv().await {
        buffer.extend_from_slice(&chunk);
        while buffer.len() >= uploader.part_size {
            let part = buffer.split_to(uploader.part_size).freeze();
            uploader.send_part(part).await?;
        }
    }

    if committed.await.is_err() {
        return Err(PipelineError::transport(format!(
            "upload to {} was abandoned before the sink was closed",
            uploader.destination
        )));
    }

    uploader.finish(buffer.freeze()).await
}
