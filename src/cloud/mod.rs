//! Object storage used by the pipeline.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   get_object    ┌─────────────┐
//! │ SourceReader │◀────────────────│             │
//! └──────────────┘                 │  BlobStore  │──▶ S3Store (rusoto)
//! ┌──────────────┐ put / multipart │             │──▶ MemoryStore (tests)
//! │ Destination  │────────────────▶│             │
//! └──────────────┘                 └─────────────┘
//! ```
//!
//! Stores classify failures into [`crate::error::ErrorKind`] and never retry.

pub mod client;
pub mod memory;
pub mod s3;
pub mod store;

pub use memory::{Faults, MemoryStore, StoreStats};
pub use s3::S3Store;
pub use store::{BlobStore, UploadedPart};
