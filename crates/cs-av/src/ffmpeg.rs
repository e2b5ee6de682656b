//! ffmpeg/ffprobe backed [`MediaConverter`].
//!
//! Argument construction is kept in pure functions so the exact command
//! lines can be checked without the tools installed.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cs_core::config::ConversionConfig;
use cs_core::{Codec, Error, MediaConverter, MediaId, ProbeResult, Result};

use crate::command::ToolCommand;
use crate::tools::ToolRegistry;

/// Raw probe output above this size is not retained.
const MAX_RAW_PROBE_JSON: usize = 1024 * 1024;

/// Reject empty paths and paths with embedded NUL bytes before they reach
/// a command line.
pub fn validate_path(path: &Path, what: &str) -> Result<()> {
    let s = path.as_os_str();
    if s.is_empty() {
        return Err(Error::Validation(format!("{what}: empty path")));
    }
    if s.to_string_lossy().contains('\0') {
        return Err(Error::Validation(format!("{what}: path contains NUL byte")));
    }
    Ok(())
}

fn os(s: impl Into<OsString>) -> OsString {
    s.into()
}

/// ffmpeg arguments to encode `input` into `output` with `codec`.
pub fn encode_args(
    codec: Codec,
    input: &Path,
    output: &Path,
    fps: Option<u32>,
    settings: &ConversionConfig,
) -> Vec<OsString> {
    let mut args = vec![os("-nostdin"), os("-i"), input.as_os_str().to_os_string()];

    match codec {
        Codec::Av1 => args.extend([
            os("-c:v"),
            os("libsvtav1"),
            os("-crf"),
            os(settings.av1_crf.to_string()),
            os("-preset"),
            os(settings.av1_preset.to_string()),
            os("-c:a"),
            os("libopus"),
            os("-b:a"),
            os(settings.audio_bitrate.as_str()),
        ]),
        Codec::H264 => args.extend([
            os("-c:v"),
            os("libx264"),
            os("-crf"),
            os(settings.h264_crf.to_string()),
            os("-preset"),
            os(settings.h264_preset.as_str()),
            os("-c:a"),
            os("aac"),
            os("-b:a"),
            os(settings.audio_bitrate.as_str()),
            os("-movflags"),
            os("+faststart"),
        ]),
        Codec::Opus => args.extend([
            os("-c:a"),
            os("libopus"),
            os("-b:a"),
            os(settings.audio_bitrate.as_str()),
            os("-vn"),
        ]),
    }

    if codec.is_video() {
        if let Some(fps) = fps.filter(|f| *f > 0) {
            args.extend([os("-r"), os(fps.to_string())]);
        }
    }

    args.extend([os("-y"), output.as_os_str().to_os_string()]);
    args
}

/// ffmpeg arguments to grab one JPEG frame at the one-second mark.
pub fn thumbnail_args(input: &Path, output: &Path) -> Vec<OsString> {
    vec![
        os("-nostdin"),
        os("-i"),
        input.as_os_str().to_os_string(),
        os("-vframes"),
        os("1"),
        os("-ss"),
        os("00:00:01"),
        os("-f"),
        os("image2"),
        os("-y"),
        output.as_os_str().to_os_string(),
    ]
}

/// ffprobe arguments producing JSON format and stream info.
pub fn probe_args(input: &Path) -> Vec<OsString> {
    vec![
        os("-v"),
        os("quiet"),
        os("-print_format"),
        os("json"),
        os("-show_format"),
        os("-show_streams"),
        input.as_os_str().to_os_string(),
    ]
}

/// Converter shelling out to ffmpeg and ffprobe.
#[derive(Debug, Clone)]
pub struct FfmpegConverter {
    tools: ToolRegistry,
    settings: ConversionConfig,
}

impl FfmpegConverter {
    pub fn new(tools: ToolRegistry, settings: ConversionConfig) -> Self {
        Self { tools, settings }
    }

    fn timeout(secs: u64) -> Duration {
        Duration::from_secs(secs.max(1))
    }
}

#[async_trait]
impl MediaConverter for FfmpegConverter {
    async fn convert(
        &self,
        codec: Codec,
        input: &Path,
        output_dir: &Path,
        media_id: &MediaId,
        fps: Option<u32>,
    ) -> Result<PathBuf> {
        validate_path(input, "input")?;
        validate_path(output_dir, "output dir")?;
        tokio::fs::create_dir_all(output_dir).await?;

        let output = output_dir.join(codec.output_file_name(media_id));
        let ffmpeg = self.tools.require("ffmpeg")?;

        tracing::info!(media_id = %media_id, %codec, output = %output.display(), "Encoding");
        ToolCommand::new(ffmpeg.to_path_buf())
            .args(encode_args(codec, input, &output, fps, &self.settings))
            .timeout(Self::timeout(self.settings.convert_timeout_secs))
            .execute()
            .await
            .map_err(|e| match e {
                Error::Tool { tool, message } => Error::Tool {
                    tool,
                    message: format!("convert to {codec}: {message}"),
                },
                other => other,
            })?;

        Ok(output)
    }

    async fn thumbnail(&self, input: &Path, output: &Path) -> Result<()> {
        validate_path(input, "input")?;
        validate_path(output, "output")?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let ffmpeg = self.tools.require("ffmpeg")?;
        ToolCommand::new(ffmpeg.to_path_buf())
            .args(thumbnail_args(input, output))
            .timeout(Self::timeout(self.settings.thumbnail_timeout_secs))
            .execute()
            .await?;
        Ok(())
    }

    async fn probe(&self, input: &Path) -> Result<ProbeResult> {
        validate_path(input, "input")?;

        let ffprobe = self.tools.require("ffprobe")?;
        let out = ToolCommand::new(ffprobe.to_path_buf())
            .args(probe_args(input))
            .timeout(Self::timeout(self.settings.probe_timeout_secs))
            .execute()
            .await?;

        let mut result = ProbeResult::from_json(&out.stdout)?;
        if result.raw_json.len() > MAX_RAW_PROBE_JSON {
            tracing::debug!(bytes = result.raw_json.len(), "Dropping oversized raw probe output");
            result.raw_json.clear();
        }
        Ok(result)
    }
}
