//! # rust-zipper
//!
//! Streams a stored object into a zip archive and republishes the archive
//! to the same bucket, without holding the object in memory.
//!
//! ## Overview
//!
//! One invocation reads `s3://bucket/reports/q1.csv`, wraps it as a single
//! archive entry and uploads `s3://bucket/zip/q1.zip`. The three stages run
//! concurrently and are joined by bounded channels, so a slow upload slows
//! the download instead of buffering it. Every invocation reports exactly
//! one [`models::PipelineOutcome`], and success is only reported after the
//! store has acknowledged the archive.
//!
//! ## Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use rust_zipper::cloud::memory::MemoryStore;
//! use rust_zipper::handler::ZipHandler;
//! use rust_zipper::models::SourceObjectRef;
//! use rust_zipper::pipeline::{PipelineCoordinator, PipelineOptions};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let store = Arc::new(MemoryStore::new());
//! store.insert("bucket", "reports/q1.csv", &b"id,total\n1,10\n"[..]);
//!
//! let coordinator = PipelineCoordinator::new(store, PipelineOptions::default());
//! let handler = ZipHandler::new(
//!     coordinator,
//!     SourceObjectRef::new("bucket", "reports/q1.csv"),
//!     "request-1",
//!     "zip/q1.zip",
//! )?;
//!
//! let envelope = handler.process().await;
//! assert_eq!(envelope.status_code, 200);
//! # Ok(())
//! # }
//! ```
//!
//! ## Module Organization
//!
//! - [`pipeline`]: source, archive and upload stages plus the coordinator
//! - [`archive`]: streaming zip writer
//! - [`cloud`]: object store abstraction, S3 and in-memory stores
//! - [`handler`]: trigger parsing, key conventions and the result envelope
//! - [`config`]: pipeline configuration
//! - [`error`]: failure taxonomy

/// Command-line interface definitions and argument parsing
pub mod cli;

/// Invocation-scoped data model
pub mod models;

/// Error kinds reported by the pipeline
pub mod error;

/// Streaming zip writer
pub mod archive;

/// Object storage (S3, in-memory)
pub mod cloud;

/// Source → archive → upload stages
pub mod pipeline;

/// Trigger events, destination naming and result envelopes
pub mod handler;

/// Configuration loading
pub mod config;

/// Application constants and configuration values
pub mod constants;
