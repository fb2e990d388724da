//! Seek-free zip encoding.
//!
//! Produces standard deflate zip archives front to back so they can be
//! written straight into a channel or an upload without buffering the whole
//! archive.

mod formats;
mod helpers;
mod writer;

pub use formats::{CompressionMethod, FileOptions, ZipEntry};
pub use writer::{StreamingFileWriter, StreamingZipWriter};
