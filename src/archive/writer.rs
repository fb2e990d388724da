use async_compression::tokio::write::DeflateEncoder;
use async_compression::Level;
use crc32fast::Hasher;
use log::debug;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::archive::formats::{
    zip32, CentralDirectoryHeader, CompressionMethod, DataDescriptor,
    EndOfCentralDirectoryRecord, FileOptions, LocalFileHeader, ZipEntry, STREAMING_BIT_FLAG,
    VERSION_NEEDED,
};
use crate::archive::helpers::{dos_time, EntryWriter};
use crate::error::{PipelineError, Result};

/// Streaming ZIP writer that creates ZIP archives directly to an output stream.
///
/// The archive is produced front to back without seeking: every entry is
/// followed by a data descriptor carrying its CRC32 and sizes, and the
/// central directory is written by [`StreamingZipWriter::finish`].
pub struct StreamingZipWriter<W: AsyncWrite + Unpin> {
    writer: W,
    entries: Vec<ZipEntry>,
    offset: u64,
}

impl<W: AsyncWrite + Unpin> StreamingZipWriter<W> {
    /// Create a new streaming ZIP writer
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            entries: Vec::new(),
            offset: 0,
        }
    }

    /// Start a new file entry in the ZIP
    pub async fn start_file(
        &mut self,
        name: &str,
        options: FileOptions,
    ) -> Result<StreamingFileWriter<'_, W>> {
        let compression_method = options.compression_method.code();
        let (last_mod_time, last_mod_date) = dos_time(options.last_modified);

        let header = LocalFileHeader {
            version_needed: VERSION_NEEDED,
            bit_flag: STREAMING_BIT_FLAG,
            compression_method,
            last_mod_time,
            last_mod_date,
            file_name: name.as_bytes().to_vec(),
        };

        let entry_offset = self.offset;
        let header_size = header.write(&mut self.writer).await?;
        self.offset += u64::from(header_size);

        let Self {
            writer,
            entries,
            offset,
        } = self;

        let output = EntryWriter::new(writer);
        let encoder = match options.compression_method {
            CompressionMethod::Stored => EntryEncoder::Stored(output),
            CompressionMethod::Deflated => EntryEncoder::Deflated(DeflateEncoder::with_quality(
                output,
                Level::Precise(options.compression_level),
            )),
        };

        Ok(StreamingFileWriter {
            entries,
            offset,
            encoder,
            name: name.to_string(),
            entry_offset,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32: Hasher::new(),
            uncompressed_size: 0,
        })
    }

    /// Finish the ZIP file, returning the output and the total archive size
    pub async fn finish(mut self) -> Result<(W, u64)> {
        let central_dir_offset = self.offset;

        for entry in &self.entries {
            let written = CentralDirectoryHeader::for_entry(entry)
                .write(&mut self.writer)
                .await?;
            self.offset += u64::from(written);
        }

        let total_entries = u16::try_from(self.entries.len()).map_err(|_| {
            PipelineError::compression(format!(
                "{} entries exceed the limit of zip archives without zip64",
                self.entries.len()
            ))
        })?;

        let end_record = EndOfCentralDirectoryRecord {
            total_entries,
            central_dir_size: zip32(self.offset - central_dir_offset, "central directory")?,
            central_dir_offset: zip32(central_dir_offset, "central directory offset")?,
        };
        self.offset += u64::from(end_record.write(&mut self.writer).await?);

        self.writer
            .flush()
            .await
            .map_err(PipelineError::from_encoder_io)?;

        debug!(
            "Finished zip archive with {} entries, {} bytes",
            self.entries.len(),
            self.offset
        );

        Ok((self.writer, self.offset))
    }
}

enum EntryEncoder<'a, W: AsyncWrite + Unpin> {
    Stored(EntryWriter<'a, W>),
    Deflated(DeflateEncoder<EntryWriter<'a, W>>),
}

/// Writer for a single file entry in the ZIP archive.
///
/// Created by [`StreamingZipWriter::start_file`]; tracks the CRC32 and sizes
/// of the entry and records it for the central directory on
/// [`StreamingFileWriter::finish`].
pub struct StreamingFileWriter<'a, W: AsyncWrite + Unpin> {
    entries: &'a mut Vec<ZipEntry>,
    offset: &'a mut u64,
    encoder: EntryEncoder<'a, W>,
    name: String,
    entry_offset: u64,
    compression_method: u16,
    last_mod_time: u16,
    last_mod_date: u16,
    crc32: Hasher,
    uncompressed_size: u64,
}

impl<'a, W: AsyncWrite + Unpin> StreamingFileWriter<'a, W> {
    /// Write data to the file entry
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.crc32.update(data);
        self.uncompressed_size += data.len() as u64;

        let written = match &mut self.encoder {
            EntryEncoder::Stored(writer) => writer.write_all(data).await,
            EntryEncoder::Deflated(encoder) => encoder.write_all(data).await,
        };
        written.map_err(PipelineError::from_encoder_io)
    }

    /// Flush the encoder, write the data descriptor and record the entry.
    pub async fn finish(self) -> Result<ZipEntry> {
        let Self {
            entries,
            offset,
            encoder,
            name,
            entry_offset,
            compression_method,
            last_mod_time,
            last_mod_date,
            crc32,
            uncompressed_size,
        } = self;

        let mut output = match encoder {
            EntryEncoder::Stored(writer) => writer,
            EntryEncoder::Deflated(mut encoder) => {
                encoder
                    .shutdown()
                    .await
                    .map_err(PipelineError::from_encoder_io)?;
                encoder.into_inner()
            }
        };
        let compressed_size = output.written;

        let entry = ZipEntry {
            name,
            compressed_size: zip32(compressed_size, "compressed entry")?,
            uncompressed_size: zip32(uncompressed_size, "entry")?,
            crc32: crc32.finalize(),
            offset: zip32(entry_offset, "entry offset")?,
            compression_method,
            last_mod_time,
            last_mod_date,
        };

        let descriptor = DataDescriptor {
            crc32: entry.crc32,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
        };
        let descriptor_size = descriptor.write(&mut *output.inner).await?;

        *offset += compressed_size + u64::from(descriptor_size);

        debug!(
            "Finished entry {} ({} -> {} bytes, crc32={:08x})",
            entry.name, entry.uncompressed_size, entry.compressed_size, entry.crc32
        );

        entries.push(entry.clone());
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Read};

    async fn build_archive(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
        let mut zip = StreamingZipWriter::new(Vec::new());
        for (name, data) in entries {
            let options = FileOptions {
                compression_method: method,
                ..FileOptions::default()
            };
            let mut file = zip.start_file(name, options).await.unwrap();
            for chunk in data.chunks(1000) {
                file.write_all(chunk).await.unwrap();
            }
            file.finish().await.unwrap();
        }
        let (bytes, total) = zip.finish().await.unwrap();
        assert_eq!(total, bytes.len() as u64);
        bytes
    }

    #[tokio::test]
    async fn test_deflated_archive_is_readable() {
        let content = b"date,revenue\n2024-01-01,100\n".repeat(500);
        let bytes =
            build_archive(&[("/q1.csv", content.as_slice())], CompressionMethod::Deflated).await;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 1);

        let mut file = archive.by_index(0).unwrap();
        assert_eq!(file.name(), "/q1.csv");
        assert_eq!(file.compression(), zip::CompressionMethod::Deflated);
        assert!(file.compressed_size() < file.size());

        let mut extracted = Vec::new();
        file.read_to_end(&mut extracted).unwrap();
        assert_eq!(extracted, content);
    }

    #[tokio::test]
    async fn test_stored_and_multiple_entries() {
        let bytes = build_archive(
            &[("a.txt", &b"first entry"[..]), ("nested/b.bin", &[7u8; 4096][..])],
            CompressionMethod::Stored,
        )
        .await;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        assert_eq!(archive.len(), 2);

        let mut second = archive.by_name("nested/b.bin").unwrap();
        assert_eq!(second.compression(), zip::CompressionMethod::Stored);
        let mut extracted = Vec::new();
        second.read_to_end(&mut extracted).unwrap();
        assert_eq!(extracted, vec![7u8; 4096]);
    }

    #[tokio::test]
    async fn test_empty_entry() {
        let bytes = build_archive(&[("empty.txt", &b""[..])], CompressionMethod::Deflated).await;

        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let file = archive.by_index(0).unwrap();
        assert_eq!(file.size(), 0);
        assert_eq!(file.crc32(), 0);
    }
}
