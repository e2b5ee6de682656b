//! # cs-av
//!
//! External tool management and the ffmpeg-backed converter for the
//! clipshare pipeline.
//!
//! This crate provides:
//!
//! - **Tool discovery** ([`ToolRegistry`]) -- find and cache paths to ffmpeg
//!   and ffprobe.
//! - **Command execution** ([`ToolCommand`]) -- async builder with timeout
//!   support for running external processes.
//! - **Converter** ([`FfmpegConverter`]) -- implements
//!   [`cs_core::MediaConverter`] for encoding, thumbnails and probing.

pub mod command;
pub mod ffmpeg;
pub mod tools;

// ---- Re-exports for convenience ----

pub use command::{ToolCommand, ToolOutput};
pub use ffmpeg::FfmpegConverter;
pub use tools::{ToolInfo, ToolRegistry};
