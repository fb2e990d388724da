use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::PollSender;

use crate::archive::{CompressionMethod, FileOptions, StreamingZipWriter};
use crate::constants::{
    ARCHIVE_CONTENT_TYPE, ARCHIVE_EXTENSION, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_LEVEL,
    DEFAULT_WINDOW_CHUNKS,
};
use crate::error::{ErrorKind, PipelineError, Result};
use crate::models::{ArchiveEntry, ArchiveSummary, ByteStream};
use crate::pipeline::task::StageSignal;

/// Container formats the archive stage can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArchiveFormat {
    #[default]
    Zip,
}

impl ArchiveFormat {
    pub fn content_type(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ARCHIVE_CONTENT_TYPE,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ArchiveFormat::Zip => ARCHIVE_EXTENSION,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArchiveOptions {
    pub format: ArchiveFormat,
    pub compression_method: CompressionMethod,
    pub compression_level: u32,
    /// Size of the chunks emitted on the output stream.
    pub chunk_size: usize,
    /// Number of output chunks buffered ahead of the consumer.
    pub window_chunks: usize,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            format: ArchiveFormat::Zip,
            compression_method: CompressionMethod::Deflated,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_chunks: DEFAULT_WINDOW_CHUNKS,
        }
    }
}

/// Signal that resolves once every entry is encoded and the trailer written.
pub type ArchiveFinalize = StageSignal<ArchiveSummary>;

/// The two independent observables of a running archive stage.
pub struct ArchiveOutput {
    /// Archive bytes in order. A failure is delivered as the last item.
    pub bytes: ByteStream,
    pub finalize: ArchiveFinalize,
}

/// Wraps named byte streams into a single compressed container.
#[derive(Debug, Clone, Default)]
pub struct ArchiveStage {
    options: ArchiveOptions,
}

impl ArchiveStage {
    pub fn new(options: ArchiveOptions) -> Self {
        Self { options }
    }

    /// Starts encoding `entries` in order on a separate task.
    ///
    /// The encoder only runs ahead of the consumer by `window_chunks`
    /// chunks, so a slow consumer throttles how fast entry content is pulled.
    pub fn compress(&self, entries: Vec<ArchiveEntry>) -> ArchiveOutput {
        let options = self.options.clone();
        let (sender, mut receiver) = mpsc::channel(options.window_chunks.max(1));

        let finalize = StageSignal::spawn(
            "archive",
            ErrorKind::CompressionError,
            encode_entries(entries, options, sender),
        );
        let bytes = futures::stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed();

        ArchiveOutput { bytes, finalize }
    }
}

async fn encode_entries(
    entries: Vec<ArchiveEntry>,
    options: ArchiveOptions,
    sender: mpsc::Sender<Result<Bytes>>,
) -> Result<ArchiveSummary> {
    let output = ChannelWriter::new(sender.clone(), options.chunk_size);
    let result = write_archive(entries, &options, output).await;

    if let Err(err) = &result {
        debug!("Archive stage failed: {}", err);
        // The consumer may already be gone; the finalize signal still carries the error.
        let _ = sender.send(Err(err.clone())).await;
    }
    result
}

async fn write_archive(
    entries: Vec<ArchiveEntry>,
    options: &ArchiveOptions,
    output: ChannelWriter,
) -> Result<ArchiveSummary> {
    let file_options = FileOptions {
        compression_method: options.compression_method,
        compression_level: options.compression_level,
        last_modified: None,
    };

    let mut zip = match options.format {
        ArchiveFormat::Zip => StreamingZipWriter::new(output),
    };
    let mut summary = ArchiveSummary::default();

    for entry in entries {
        let ArchiveEntry { name, mut content } = entry;
        debug!("Adding {} to archive", name);

        let mut file = zip.start_file(&name, file_options).await?;
        while let Some(chunk) = content.next().await {
            file.write_all(&chunk?).await?;
        }
        let written = file.finish().await?;

        summary.entries += 1;
        summary.uncompressed_bytes += u64::from(written.uncompressed_size);
        summary.compressed_bytes += u64::from(written.compressed_size);
    }

    let (mut output, archive_bytes) = zip.finish().await?;
    output
        .shutdown()
        .await
        .map_err(PipelineError::from_encoder_io)?;

    summary.archive_bytes = archive_bytes;
    Ok(summary)
}

/// `AsyncWrite` end of the archive output channel.
///
/// Collects writes into chunks of `chunk_size` bytes; a write is pending
/// while the channel is full.
struct ChannelWriter {
    sender: PollSender<Result<Bytes>>,
    buffer: BytesMut,
    chunk_size: usize,
}

impl ChannelWriter {
    fn new(sender: mpsc::Sender<Result<Bytes>>, chunk_size: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            sender: PollSender::new(sender),
            buffer: BytesMut::with_capacity(chunk_size),
            chunk_size,
        }
    }

    fn poll_send_buffer(&mut self, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.sender.poll_reserve(cx)).map_err(|_| output_closed())?;
        let chunk = self.buffer.split().freeze();
        self.sender.send_item(Ok(chunk)).map_err(|_| output_closed())?;
        Poll::Ready(Ok(()))
    }
}

fn output_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "archive output closed by its consumer")
}

impl AsyncWrite for ChannelWriter {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.buffer.len() >= this.chunk_size {
            ready!(this.poll_send_buffer(cx))?;
        }
        let n = buf.len().min(this.chunk_size - this.buffer.len());
        this.buffer.extend_from_slice(&buf[..n]);
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !this.buffer.is_empty() {
            ready!(this.poll_send_buffer(cx))?;
        }
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        ready!(self.as_mut().poll_flush(cx))?;
        self.get_mut().sender.close();
        Poll::Ready(Ok(()))
    }
}
