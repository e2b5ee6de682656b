//! cs-core: shared domain model, errors, configuration, and event bus.
//!
//! This crate is the foundational dependency for the other cs-* crates. It
//! defines the media/variant state machine, the job model, the capability
//! traits the worker pool is built against, and the per-media event bus.

pub mod config;
pub mod converter;
pub mod error;
pub mod events;
pub mod ids;
pub mod job;
pub mod media;
pub mod negotiate;
pub mod probe;
pub mod store;

// Re-export the most commonly used items at the crate root.
pub use converter::MediaConverter;
pub use error::{Error, Result};
pub use events::{Event, EventBus, EventKind, EventPublisher, Subscription};
pub use ids::*;
pub use job::*;
pub use media::*;
pub use probe::ProbeResult;
pub use store::{JobQueue, MediaStore};
