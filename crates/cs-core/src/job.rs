//! Queued units of work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;
use crate::ids::{JobId, MediaId};
use crate::media::Codec;

/// What a job asks the worker to do.
///
/// Kinds are stored as text; a row written by a newer build with a kind this
/// build does not know is kept as [`JobKind::Other`] so the worker can fail
/// it with a readable message instead of the row failing to load.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Convert,
    Thumbnail,
    Probe,
    #[serde(untagged)]
    Other(String),
}

impl JobKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Convert => "convert",
            Self::Thumbnail => "thumbnail",
            Self::Probe => "probe",
            Self::Other(s) => s,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for JobKind {
    fn from(s: &str) -> Self {
        match s {
            "convert" => Self::Convert,
            "thumbnail" => Self::Thumbnail,
            "probe" => Self::Probe,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Job lifecycle: `pending -> running -> done | failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "done" => Ok(Self::Done),
            "failed" => Ok(Self::Failed),
            other => Err(Error::Validation(format!("unknown job status: {other:?}"))),
        }
    }
}

/// A persisted unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub media_id: MediaId,
    pub kind: JobKind,
    /// Target codec; only set for per-codec convert jobs.
    pub codec: Option<Codec>,
    /// Output frame rate override.
    pub fps: Option<u32>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Parameters for enqueuing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewJob {
    pub media_id: MediaId,
    pub kind: JobKind,
    pub codec: Option<Codec>,
    pub fps: Option<u32>,
}

impl NewJob {
    pub fn convert(media_id: MediaId, codec: Codec, fps: Option<u32>) -> Self {
        Self {
            media_id,
            kind: JobKind::Convert,
            codec: Some(codec),
            fps,
        }
    }

    /// A convert job with no codec: one output, AV1 with H264 fallback.
    pub fn legacy_convert(media_id: MediaId, fps: Option<u32>) -> Self {
        Self {
            media_id,
            kind: JobKind::Convert,
            codec: None,
            fps,
        }
    }

    pub fn thumbnail(media_id: MediaId) -> Self {
        Self {
            media_id,
            kind: JobKind::Thumbnail,
            codec: None,
            fps: None,
        }
    }

    pub fn probe(media_id: MediaId) -> Self {
        Self {
            media_id,
            kind: JobKind::Probe,
            codec: None,
            fps: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_roundtrip_and_unknown() {
        for s in ["convert", "thumbnail", "probe"] {
            assert_eq!(JobKind::from(s).as_str(), s);
        }
        assert_eq!(JobKind::from("transmogrify"), JobKind::Other("transmogrify".into()));
        assert_eq!(JobKind::from("transmogrify").to_string(), "transmogrify");
    }

    #[test]
    fn status_parse() {
        assert_eq!("running".parse::<JobStatus>().unwrap(), JobStatus::Running);
        assert!("queued".parse::<JobStatus>().is_err());
        assert!(JobStatus::Failed.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
    }

    #[test]
    fn new_job_constructors() {
        let id: MediaId = "ABCD2345".parse().unwrap();
        let j = NewJob::convert(id.clone(), Codec::Av1, Some(30));
        assert_eq!(j.kind, JobKind::Convert);
        assert_eq!(j.codec, Some(Codec::Av1));
        assert_eq!(j.fps, Some(30));
        assert_eq!(NewJob::legacy_convert(id.clone(), None).codec, None);
        assert_eq!(NewJob::thumbnail(id).kind, JobKind::Thumbnail);
    }
}
