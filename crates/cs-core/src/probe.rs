//! ffprobe result model and display helpers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// `format` section of `ffprobe -print_format json` output.
///
/// ffprobe reports most numbers as strings; they are kept as such and
/// parsed on demand.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeFormat {
    pub format_name: String,
    #[serde(rename = "format_long_name")]
    pub format_long: String,
    pub duration: Option<String>,
    pub size: Option<String>,
    pub bit_rate: Option<String>,
    pub nb_streams: u32,
    pub tags: HashMap<String, String>,
}

/// One entry of the `streams` array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeStream {
    pub index: u32,
    pub codec_type: String,
    pub codec_name: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub pix_fmt: Option<String>,
    pub r_frame_rate: Option<String>,
    pub avg_frame_rate: Option<String>,
    pub duration: Option<String>,
    pub bit_rate: Option<String>,
    pub sample_rate: Option<String>,
    pub channels: Option<u32>,
    pub channel_layout: Option<String>,
    pub tags: HashMap<String, String>,
}

/// Parsed probe output plus the raw JSON it came from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeResult {
    pub format: ProbeFormat,
    pub streams: Vec<ProbeStream>,
    #[serde(skip)]
    pub raw_json: String,
}

impl ProbeResult {
    /// Parse ffprobe JSON output, keeping the raw text.
    pub fn from_json(raw: &str) -> crate::Result<Self> {
        let mut result: ProbeResult = serde_json::from_str(raw)
            .map_err(|e| crate::Error::Probe(format!("invalid ffprobe output: {e}")))?;
        result.raw_json = raw.to_string();
        Ok(result)
    }

    pub fn video_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "video")
    }

    pub fn audio_stream(&self) -> Option<&ProbeStream> {
        self.streams.iter().find(|s| s.codec_type == "audio")
    }

    /// Width and height of the first video stream.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let v = self.video_stream()?;
        Some((v.width?, v.height?))
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.format.duration.as_deref()?.parse().ok()
    }
}

/// Parse an ffprobe frame-rate fraction such as `30000/1001`.
/// Returns 0.0 for empty, `0/0` or malformed input.
pub fn parse_frame_rate(fraction: &str) -> f64 {
    let Some((num, den)) = fraction.split_once('/') else {
        return fraction.trim().parse().unwrap_or(0.0);
    };
    match (num.trim().parse::<i64>(), den.trim().parse::<i64>()) {
        (Ok(n), Ok(d)) if d > 0 => n as f64 / d as f64,
        _ => 0.0,
    }
}

/// `h:mm:ss` or `m:ss`.
pub fn format_duration(seconds: f64) -> String {
    if seconds.is_nan() || seconds <= 0.0 {
        return "00:00".into();
    }
    let total = seconds as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Human-readable bit rate from ffprobe's decimal string.
pub fn format_bitrate(bitrate: &str) -> String {
    if bitrate.is_empty() {
        return String::new();
    }
    let Ok(bps) = bitrate.parse::<f64>() else {
        return bitrate.to_string();
    };
    if bps >= 1_000_000.0 {
        format!("{:.1} Mbps", bps / 1_000_000.0)
    } else if bps >= 1_000.0 {
        format!("{:.1} Kbps", bps / 1_000.0)
    } else {
        format!("{bps:.0} bps")
    }
}

/// Human-readable byte size (binary units).
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    match bytes {
        b if b >= GB => format!("{:.1} GB", b as f64 / GB as f64),
        b if b >= MB => format!("{:.1} MB", b as f64 / MB as f64),
        b if b >= KB => format!("{:.1} KB", b as f64 / KB as f64),
        b => format!("{b} B"),
    }
}
