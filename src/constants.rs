//! Global constants for the rust-zipper pipeline.
//!
//! This module centralizes all hardcoded values to improve maintainability
//! and make configuration changes easier.

// Archive format constants
/// Content type declared to the store for every produced archive
pub const ARCHIVE_CONTENT_TYPE: &str = "application/zip";

/// File extension of produced archives
pub const ARCHIVE_EXTENSION: &str = "zip";

/// Default key prefix under which archives are republished
pub const DEFAULT_DESTINATION_PREFIX: &str = "zip";

/// Canned ACL applied to republished archives
pub const DESTINATION_ACL: &str = "private";

/// Message carried by a successful outcome
pub const SUCCESS_MESSAGE: &str = "uploaded";

// Buffer size constants
/// Chunk size used when reading the source and emitting archive bytes (64KB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Number of archive chunks that may be in flight between stages
pub const DEFAULT_WINDOW_CHUNKS: usize = 4;

/// Default deflate compression level
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

// Cloud storage constants
/// S3 upload part size (8MB, S3 minimum is 5MB)
pub const S3_UPLOAD_PART_SIZE_MB: usize = 8;

/// S3 minimum part size for multipart uploads (5MB)
pub const S3_MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// S3 maximum parts per upload
pub const S3_MAX_PARTS: i64 = 10000;

// ZIP format constants
/// ZIP local file header signature
pub const ZIP_LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP data descriptor signature
pub const ZIP_DATA_DESCRIPTOR_SIGNATURE: u32 = 0x08074b50;

/// ZIP central directory header signature
pub const ZIP_CENTRAL_DIR_HEADER_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
pub const ZIP_END_OF_CENTRAL_DIR_SIGNATURE: u32 = 0x06054b50;

/// ZIP version needed to extract
pub const ZIP_VERSION_NEEDED: u16 = 20; // 2.0

/// ZIP version made by (UNIX + 3.0)
pub const ZIP_VERSION_MADE_BY: u16 = 0x031e;

/// ZIP compression method: deflate
pub const ZIP_COMPRESSION_METHOD_DEFLATE: u16 = 8;

/// ZIP compression method: store (no compression)
pub const ZIP_COMPRESSION_METHOD_STORE: u16 = 0;

/// ZIP bit flags: sizes and CRC follow the entry data (bit 3), UTF-8 names (bit 11)
pub const ZIP_STREAMING_BIT_FLAG: u16 = 0x0008 | 0x0800;

/// External attributes for regular files (rw-r--r--)
pub const ZIP_FILE_EXTERNAL_ATTRIBUTES: u32 = 0o100644 << 16;

// Result envelope constants
pub const HTTP_STATUS_OK: u16 = 200;
pub const HTTP_STATUS_INTERNAL_ERROR: u16 = 500;
pub const CORS_ALLOW_ORIGIN_HEADER: &str = "Access-Control-Allow-Origin";

// Environment variables
pub const ENV_REGION: &str = "RUST_ZIPPER_REGION";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_PROFILE: &str = "RUST_ZIPPER_PROFILE";
pub const ENV_ARCHIVE_FOLDER: &str = "RUST_ZIPPER_ARCHIVE_FOLDER";
pub const ENV_DESTINATION_PREFIX: &str = "RUST_ZIPPER_DESTINATION_PREFIX";
pub const ENV_PART_SIZE_MB: &str = "RUST_ZIPPER_PART_SIZE_MB";
pub const ENV_CHUNK_SIZE_KB: &str = "RUST_ZIPPER_CHUNK_SIZE_KB";
pub const ENV_WINDOW_CHUNKS: &str = "RUST_ZIPPER_WINDOW_CHUNKS";
pub const ENV_COMPRESSION_LEVEL: &str = "RUST_ZIPPER_COMPRESSION_LEVEL";
