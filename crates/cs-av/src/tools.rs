//! External tool detection.
//!
//! The [`ToolRegistry`] resolves the locations of ffmpeg and ffprobe once at
//! startup, honouring path overrides from configuration.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use cs_core::config::ToolsConfig;

/// Tools the converter shells out to.
pub const KNOWN_TOOLS: &[&str] = &["ffmpeg", "ffprobe"];

/// Availability information for a tool, returned by [`ToolRegistry::check_all`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Tool name.
    pub name: String,
    /// Whether the tool was found.
    pub available: bool,
    /// First line of `-version` output, if available.
    pub version: Option<String>,
    /// Resolved path to the executable.
    pub path: Option<PathBuf>,
}

/// Registry holding discovered tool paths.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    tools: HashMap<String, PathBuf>,
}

impl ToolRegistry {
    /// Discover tools by searching `PATH` (or using overrides from config).
    ///
    /// A configured path is used when it exists; otherwise [`which::which`]
    /// locates the tool. Tools that are not found are omitted.
    pub fn discover(config: &ToolsConfig) -> Self {
        let mut tools = HashMap::new();

        for &name in KNOWN_TOOLS {
            let custom_path = match name {
                "ffmpeg" => config.ffmpeg_path.as_deref(),
                "ffprobe" => config.ffprobe_path.as_deref(),
                _ => None,
            };

            let resolved = match custom_path {
                Some(p) if p.exists() => Some(p.to_path_buf()),
                Some(p) => {
                    tracing::warn!(tool = name, path = %p.display(), "Configured tool path does not exist; searching PATH");
                    which::which(name).ok()
                }
                None => which::which(name).ok(),
            };

            match resolved {
                Some(path) => {
                    tools.insert(name.to_string(), path);
                }
                None => tracing::debug!(tool = name, "Tool not found"),
            }
        }

        Self { tools }
    }

    /// Build a registry from explicit paths, skipping discovery.
    pub fn with_paths(paths: impl IntoIterator<Item = (String, PathBuf)>) -> Self {
        Self {
            tools: paths.into_iter().collect(),
        }
    }

    /// Path of the given tool, or [`cs_core::Error::Tool`] if it was not
    /// found during discovery.
    pub fn require(&self, name: &str) -> cs_core::Result<&Path> {
        self.tools.get(name).map(PathBuf::as_path).ok_or_else(|| {
            cs_core::Error::tool(name, format!("{name} not found; is it installed and in PATH?"))
        })
    }

    /// Check all known tools and return availability information.
    pub fn check_all(&self) -> Vec<ToolInfo> {
        KNOWN_TOOLS
            .iter()
            .map(|&name| match self.tools.get(name) {
                Some(path) => ToolInfo {
                    name: name.to_string(),
                    available: true,
                    version: detect_version(path),
                    path: Some(path.clone()),
                },
                None => ToolInfo {
                    name: name.to_string(),
                    available: false,
                    version: None,
                    path: None,
                },
            })
            .collect()
    }
}

/// Run `<tool> -version` and return the first line of stdout.
fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}
