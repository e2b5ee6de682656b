//! Query modules, one per table.

pub mod jobs;
pub mod media;
pub mod variants;
