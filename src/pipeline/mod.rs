//! Streaming pipeline stages and the coordinator that settles them.
//!
//! Each stage runs on its own task and exposes a completion signal; bytes
//! move between stages over bounded channels so memory use stays within a
//! few chunks regardless of object size.

pub mod archive;
pub mod coordinator;
pub mod settlement;
pub mod source;
pub mod upload;

mod task;

pub use archive::{ArchiveFormat, ArchiveOptions, ArchiveOutput, ArchiveStage};
pub use coordinator::{PipelineCoordinator, PipelineOptions};
pub use settlement::{PipelineState, Settlement, TransferError};
pub use source::SourceReader;
pub use task::StageSignal;
pub use upload::{DestinationWriter, UploadOptions, UploadSink};
