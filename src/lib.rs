//! Clipshare - media sharing with a durable background transcoding pipeline
//!
//! This library crate exposes the pipeline pieces the binary wires together
//! and the integration tests drive directly.

pub mod ingest;
pub mod sweep;
pub mod worker;

pub use ingest::{IngestRequest, Ingestor};
pub use sweep::{remove_media, run_sweeper, sweep_expired, SweepReport};
pub use worker::{WorkerPool, WorkerSettings};
