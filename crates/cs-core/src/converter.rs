//! The external media converter as seen by the pipeline.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::ids::MediaId;
use crate::media::Codec;
use crate::probe::ProbeResult;

/// Performs one conversion, thumbnail, or probe.
///
/// Calls may run for the length of a full encode; implementations enforce
/// their own time limit.
#[async_trait]
pub trait MediaConverter: Send + Sync {
    /// Encode `input` to `codec`, writing into `output_dir`. Returns the
    /// path of the produced file.
    async fn convert(
        &self,
        codec: Codec,
        input: &Path,
        output_dir: &Path,
        media_id: &MediaId,
        fps: Option<u32>,
    ) -> Result<PathBuf>;

    /// Extract a still frame from `input` into `output`.
    async fn thumbnail(&self, input: &Path, output: &Path) -> Result<()>;

    async fn probe(&self, input: &Path) -> Result<ProbeResult>;
}
