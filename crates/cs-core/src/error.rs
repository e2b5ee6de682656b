//! Unified error type for clipshare.
//!
//! Every library crate returns [`Error`]. Worker code stores the `Display`
//! form of an error on the failed job and variant rows, so messages are kept
//! short and self-describing.

use std::fmt;

/// Unified error type covering all failure modes in clipshare.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested entity could not be found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "media", "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// Input data failed validation.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The entity is not in a state that allows the requested transition.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A database operation failed.
    #[error("Database error: {source}")]
    Database {
        /// The underlying database error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// An I/O operation failed.
    #[error("IO error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// An external tool (ffmpeg, ffprobe) returned an error.
    #[error("Tool error [{tool}]: {message}")]
    Tool {
        /// Name of the tool that failed.
        tool: String,
        /// Human-readable error description.
        message: String,
    },

    /// Media probing failed.
    #[error("Probe error: {0}")]
    Probe(String),

    /// Configuration could not be loaded or is invalid.
    #[error("Config error: {0}")]
    Config(String),

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Convenience constructor for [`Error::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        Error::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`Error::Database`].
    pub fn database(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Error::Database {
            source: source.into(),
        }
    }

    /// Convenience constructor for [`Error::Tool`].
    pub fn tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Whether this is a [`Error::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = Error::not_found("media", "ABCD2345");
        assert_eq!(err.to_string(), "media not found: ABCD2345");
        assert!(err.is_not_found());
    }

    #[test]
    fn conflict_display() {
        let err = Error::Conflict("job 7 is not running".into());
        assert_eq!(err.to_string(), "Conflict: job 7 is not running");
        assert!(!err.is_not_found());
    }

    #[test]
    fn database_display() {
        let err = Error::database("database is locked");
        assert!(err.to_string().contains("database is locked"));
    }

    #[test]
    fn io_from_std() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io { .. }));
    }

    #[test]
    fn tool_display() {
        let err = Error::tool("ffmpeg", "exit code 1");
        assert_eq!(err.to_string(), "Tool error [ffmpeg]: exit code 1");
    }

    #[test]
    fn probe_and_config_display() {
        assert_eq!(
            Error::Probe("no streams".into()).to_string(),
            "Probe error: no streams"
        );
        assert_eq!(
            Error::Config("workers.count must be > 0".into()).to_string(),
            "Config error: workers.count must be > 0"
        );
    }
}
