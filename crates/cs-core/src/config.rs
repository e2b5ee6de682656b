//! Application configuration.
//!
//! The top-level [`Config`] is read from TOML. Every section defaults
//! sensibly so an empty file is valid; a handful of `CLIPSHARE_*`
//! environment variables override the file for container deployments.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};

/// Locations searched when no config path is given, in order.
pub const DEFAULT_CONFIG_PATHS: &[&str] = &[
    "./clipshare.toml",
    "~/.config/clipshare/config.toml",
    "/etc/clipshare/config.toml",
];

// ---------------------------------------------------------------------------
// Top-level Config
// ---------------------------------------------------------------------------

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub workers: WorkersConfig,
    pub retention: RetentionConfig,
    pub events: EventsConfig,
    pub tools: ToolsConfig,
    pub conversion: ConversionConfig,
}

impl Config {
    /// Deserialize a `Config` from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| Error::Config(format!("config parse error: {e}")))
    }

    /// Read and parse a config file. Missing or malformed files are errors.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml(&contents)
    }

    /// Load from `path`, or from the first of [`DEFAULT_CONFIG_PATHS`] that
    /// exists, falling back to defaults. Parse failures are logged and
    /// replaced by defaults.
    pub fn load_or_default(path: Option<&Path>) -> Self {
        let candidate = match path {
            Some(p) => Some(p.to_path_buf()),
            None => DEFAULT_CONFIG_PATHS
                .iter()
                .map(|p| PathBuf::from(shellexpand::tilde(p).as_ref()))
                .find(|p| p.exists()),
        };

        let Some(path) = candidate else {
            tracing::info!("No config file found; using defaults");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(contents) => Self::from_toml(&contents).unwrap_or_else(|e| {
                tracing::warn!("Failed to parse config file {}: {e}", path.display());
                Self::default()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No config file at {}; using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read config file {}: {e}", path.display());
                Self::default()
            }
        }
    }

    /// Apply `CLIPSHARE_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(std::env::vars())
    }

    /// Apply overrides from `(key, value)` pairs. Unknown keys are ignored.
    pub fn apply_overrides<I, K, V>(&mut self, vars: I) -> Result<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (key, value) in vars {
            let value = value.as_ref().trim();
            if value.is_empty() {
                continue;
            }
            match key.as_ref() {
                "CLIPSHARE_DATA_DIR" => self.storage.data_dir = PathBuf::from(value),
                "CLIPSHARE_WORKERS" => self.workers.count = parse_env(key.as_ref(), value)?,
                "CLIPSHARE_RETENTION_DAYS" => {
                    self.retention.default_days = parse_env(key.as_ref(), value)?
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Reject settings the service cannot run with.
    pub fn check(&self) -> Result<()> {
        if self.workers.count == 0 {
            return Err(Error::Config("workers.count must be at least 1".into()));
        }
        if self.events.subscriber_buffer == 0 {
            return Err(Error::Config("events.subscriber_buffer must be at least 1".into()));
        }
        if self.storage.database_file.as_os_str().is_empty() {
            return Err(Error::Config("storage.database_file is empty".into()));
        }
        Ok(())
    }

    /// Return a list of validation warnings (non-fatal issues).
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.workers.count > 16 {
            warnings.push(format!(
                "workers.count is {}; each worker may run a full ffmpeg encode",
                self.workers.count
            ));
        }
        if self.retention.default_days == 0 {
            warnings.push("retention.default_days is 0; uploads expire immediately".into());
        }
        if self.workers.poll_interval_ms < 50 {
            warnings.push("workers.poll_interval_ms below 50 will busy-poll the database".into());
        }
        if self.conversion.av1_crf > 63 {
            warnings.push(format!(
                "conversion.av1_crf {} is outside 0-63",
                self.conversion.av1_crf
            ));
        }
        if self.conversion.h264_crf > 51 {
            warnings.push(format!(
                "conversion.h264_crf {} is outside 0-51",
                self.conversion.h264_crf
            ));
        }
        for (name, path) in [
            ("tools.ffmpeg_path", &self.tools.ffmpeg_path),
            ("tools.ffprobe_path", &self.tools.ffprobe_path),
        ] {
            if let Some(p) = path {
                if !p.exists() {
                    warnings.push(format!("{name} {} does not exist", p.display()));
                }
            }
        }

        warnings
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| Error::Config(format!("invalid {key}: {value:?}")))
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// On-disk layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Database file name, relative to `data_dir` unless absolute.
    pub database_file: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            database_file: PathBuf::from("clipshare.db"),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_file)
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.data_dir.join("uploads")
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.data_dir.join("converted")
    }
}

/// Worker pool sizing and polling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub count: usize,
    /// Sleep after an empty claim.
    pub poll_interval_ms: u64,
    /// Sleep after a failed claim.
    pub claim_backoff_ms: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 2,
            poll_interval_ms: 500,
            claim_backoff_ms: 2000,
        }
    }
}

impl WorkersConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn claim_backoff(&self) -> Duration {
        Duration::from_millis(self.claim_backoff_ms)
    }
}

/// Upload retention and the expiry sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub default_days: u32,
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            default_days: 7,
            sweep_interval_secs: 3600,
        }
    }
}

/// Live event fan-out.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EventsConfig {
    pub subscriber_buffer: usize,
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            subscriber_buffer: crate::events::DEFAULT_SUBSCRIBER_BUFFER,
        }
    }
}

/// Paths to external tools. `None` means search `PATH`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
}

/// Encoder settings and tool time limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionConfig {
    pub av1_crf: u32,
    pub av1_preset: u32,
    pub h264_crf: u32,
    pub h264_preset: String,
    pub audio_bitrate: String,
    pub convert_timeout_secs: u64,
    pub thumbnail_timeout_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            av1_crf: 30,
            av1_preset: 6,
            h264_crf: 23,
            h264_preset: "medium".into(),
            audio_bitrate: "128k".into(),
            convert_timeout_secs: 30 * 60,
            thumbnail_timeout_secs: 60,
            probe_timeout_secs: 60,
        }
    }
}
