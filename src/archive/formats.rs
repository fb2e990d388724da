use bytes::{BufMut, BytesMut};
use std::time::SystemTime;
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::constants::{
    ZIP_CENTRAL_DIR_HEADER_SIGNATURE as CENTRAL_DIR_HEADER_SIGNATURE,
    ZIP_DATA_DESCRIPTOR_SIGNATURE as DATA_DESCRIPTOR_SIGNATURE,
    ZIP_END_OF_CENTRAL_DIR_SIGNATURE as END_OF_CENTRAL_DIR_SIGNATURE,
    ZIP_LOCAL_FILE_HEADER_SIGNATURE as LOCAL_FILE_HEADER_SIGNATURE,
};
use crate::error::{PipelineError, Result};

pub use crate::constants::{
    ZIP_COMPRESSION_METHOD_DEFLATE as COMPRESSION_METHOD_DEFLATE,
    ZIP_COMPRESSION_METHOD_STORE as COMPRESSION_METHOD_STORE,
    ZIP_FILE_EXTERNAL_ATTRIBUTES as FILE_EXTERNAL_ATTRIBUTES,
    ZIP_STREAMING_BIT_FLAG as STREAMING_BIT_FLAG, ZIP_VERSION_MADE_BY as VERSION_MADE_BY,
    ZIP_VERSION_NEEDED as VERSION_NEEDED,
};

/// ZIP file entry information kept for the central directory
#[derive(Debug, Clone)]
pub struct ZipEntry {
    pub name: String,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    pub crc32: u32,
    pub offset: u32,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
}

/// File options for ZIP entries
#[derive(Debug, Clone, Copy)]
pub struct FileOptions {
    pub compression_method: CompressionMethod,
    pub compression_level: u32,
    pub last_modified: Option<SystemTime>,
}

/// Compression methods
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum CompressionMethod {
    Stored,
    Deflated,
}

impl CompressionMethod {
    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => COMPRESSION_METHOD_STORE,
            CompressionMethod::Deflated => COMPRESSION_METHOD_DEFLATE,
        }
    }
}

impl Default for FileOptions {
    fn default() -> Self {
        Self {
            compression_method: CompressionMethod::Deflated,
            compression_level: crate::constants::DEFAULT_COMPRESSION_LEVEL,
            last_modified: None,
        }
    }
}

/// Narrow a 64-bit size or offset to the 32-bit fields of a non-zip64 archive.
pub fn zip32(value: u64, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        PipelineError::compression(format!(
            "{} of {} bytes exceeds the 4 GiB limit of zip archives without zip64",
            what, value
        ))
    })
}

async fn write_record<W: AsyncWrite + Unpin>(writer: &mut W, bytes: &BytesMut) -> Result<u32> {
    writer
        .write_all(bytes)
        .await
        .map_err(PipelineError::from_encoder_io)?;
    Ok(bytes.len() as u32)
}

/// Local file header structure.
///
/// Archives are written without seeking, so the CRC32 and size fields are
/// always zero here and bit 3 of the flags announces a trailing data descriptor.
pub struct LocalFileHeader {
    pub version_needed: u16,
    pub bit_flag: u16,
    pub compression_method: u16,
    pub last_mod_time: u16,
    pub last_mod_date: u16,
    pub file_name: Vec<u8>,
}

impl LocalFileHeader {
    pub fn encode(&self) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(30 + self.file_name.len());

        bytes.put_u32_le(LOCAL_FILE_HEADER_SIGNATURE);
        bytes.put_u16_le(self.version_needed);
        bytes.put_u16_le(self.bit_flag);
        bytes.put_u16_le(self.compression_method);
        bytes.put_u16_le(self.last_mod_time);
        bytes.put_u16_le(self.last_mod_date);

        // CRC32, compressed size, uncompressed size live in the data descriptor
        bytes.put_u32_le(0);
        bytes.put_u32_le(0);
        bytes.put_u32_le(0);

        bytes.put_u16_le(self.file_name.len() as u16);
        // Extra field length
        bytes.put_u16_le(0);
        bytes.extend_from_slice(&self.file_name);

        bytes
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        write_record(writer, &self.encode()).await
    }
}

/// Data descriptor written after each entry's data
pub struct DataDescriptor {
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl DataDescriptor {
    pub fn encode(&self) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(16);
        bytes.put_u32_le(DATA_DESCRIPTOR_SIGNATURE);
        bytes.put_u32_le(self.crc32);
        bytes.put_u32_le(self.compressed_size);
        bytes.put_u32_le(self.uncompressed_size);
        bytes
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        write_record(writer, &self.encode()).await
    }
}

/// Central directory header structure
pub struct CentralDirectoryHeader<'a> {
    pub entry: &'a ZipEntry,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub bit_flag: u16,
    pub external_file_attributes: u32,
}

impl<'a> CentralDirectoryHeader<'a> {
    pub fn for_entry(entry: &'a ZipEntry) -> Self {
        Self {
            entry,
            version_made_by: VERSION_MADE_BY,
            version_needed: VERSION_NEEDED,
            bit_flag: STREAMING_BIT_FLAG,
            external_file_attributes: FILE_EXTERNAL_ATTRIBUTES,
        }
    }

    pub fn encode(&self) -> BytesMut {
        let entry = self.entry;
        let name = entry.name.as_bytes();
        let mut bytes = BytesMut::with_capacity(46 + name.len());

        bytes.put_u32_le(CENTRAL_DIR_HEADER_SIGNATURE);
        bytes.put_u16_le(self.version_made_by);
        bytes.put_u16_le(self.version_needed);
        bytes.put_u16_le(self.bit_flag);
        bytes.put_u16_le(entry.compression_method);
        bytes.put_u16_le(entry.last_mod_time);
        bytes.put_u16_le(entry.last_mod_date);
        bytes.put_u32_le(entry.crc32);
        bytes.put_u32_le(entry.compressed_size);
        bytes.put_u32_le(entry.uncompressed_size);
        bytes.put_u16_le(name.len() as u16);

        // Extra field length, file comment length
        bytes.put_u16_le(0);
        bytes.put_u16_le(0);

        // Disk number start, internal attributes
        bytes.put_u16_le(0);
        bytes.put_u16_le(0);

        bytes.put_u32_le(self.external_file_attributes);
        bytes.put_u32_le(entry.offset);
        bytes.extend_from_slice(name);

        bytes
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        write_record(writer, &self.encode()).await
    }
}

/// End of central directory record structure
pub struct EndOfCentralDirectoryRecord {
    pub total_entries: u16,
    pub central_dir_size: u32,
    pub central_dir_offset: u32,
}

impl EndOfCentralDirectoryRecord {
    pub fn encode(&self) -> BytesMut {
        let mut bytes = BytesMut::with_capacity(22);

        bytes.put_u32_le(END_OF_CENTRAL_DIR_SIGNATURE);

        // Single-disk archive
        bytes.put_u16_le(0);
        bytes.put_u16_le(0);

        bytes.put_u16_le(self.total_entries);
        bytes.put_u16_le(self.total_entries);
        bytes.put_u32_le(self.central_dir_size);
        bytes.put_u32_le(self.central_dir_offset);

        // Comment length
        bytes.put_u16_le(0);

        bytes
    }

    pub async fn write<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<u32> {
        write_record(writer, &self.encode()).await
    }
}
