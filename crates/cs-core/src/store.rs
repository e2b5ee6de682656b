//! Persistence capabilities used by the worker pool.
//!
//! These are narrow method sets rather than a query language so the pipeline
//! does not depend on a storage engine. `cs-db` provides the SQLite
//! implementations; tests can substitute their own.

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::ids::{JobId, MediaId};
use crate::job::{Job, NewJob};
use crate::media::{Codec, Media, Variant, VariantOutput};

/// Media and variant persistence.
///
/// Media and variant transitions only ever move forward. Each `mark_*` and
/// `variant_*` update returns `false` when the row was already past the
/// requested state, so a late or repeated update cannot resurrect a terminal
/// media or variant.
pub trait MediaStore: Send + Sync {
    /// Insert a new media row.
    fn create(&self, media: &Media) -> Result<()>;

    /// Load a media with its variants (ordered by codec preference).
    fn get(&self, id: &MediaId) -> Result<Media>;

    fn list_all(&self) -> Result<Vec<Media>>;

    /// Media whose expiry instant is before `now`.
    fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Media>>;

    /// Delete a media together with its variants and jobs.
    fn delete(&self, id: &MediaId) -> Result<()>;

    /// `pending -> processing`. Returns `false` if the media had already
    /// left `pending`.
    fn mark_processing(&self, id: &MediaId) -> Result<bool>;

    /// `pending | processing -> done`, mirroring `output` into the legacy
    /// fields. Returns `false` if the media was already terminal.
    fn mark_done(&self, id: &MediaId, codec: Option<Codec>, output: &VariantOutput)
        -> Result<bool>;

    /// `pending | processing -> failed`. Returns `false` if the media was
    /// already terminal.
    fn mark_failed(&self, id: &MediaId, message: &str) -> Result<bool>;

    fn set_thumbnail(&self, id: &MediaId, path: &str) -> Result<()>;

    fn set_dimensions(&self, id: &MediaId, width: u32, height: u32) -> Result<()>;

    /// Store the raw probe blob unless one is already present. Returns
    /// whether it was written.
    fn set_probe_json(&self, id: &MediaId, json: &str) -> Result<bool>;

    /// Create a `pending` variant. Fails with `Conflict` if one already
    /// exists for the (media, codec) pair.
    fn create_variant(&self, media_id: &MediaId, codec: Codec) -> Result<Variant>;

    fn get_variant(&self, media_id: &MediaId, codec: Codec) -> Result<Option<Variant>>;

    /// `pending -> processing`.
    fn variant_processing(&self, media_id: &MediaId, codec: Codec) -> Result<bool>;

    /// `pending | processing -> done`, recording the output.
    fn variant_done(&self, media_id: &MediaId, codec: Codec, output: &VariantOutput) -> Result<bool>;

    /// `pending | processing -> failed`, recording the message.
    fn variant_failed(&self, media_id: &MediaId, codec: Codec, message: &str) -> Result<bool>;
}

/// Durable FIFO of jobs.
pub trait JobQueue: Send + Sync {
    /// Persist a new `pending` job.
    fn enqueue(&self, job: NewJob) -> Result<Job>;

    /// Like [`enqueue`](Self::enqueue), but does nothing and returns `None`
    /// if the media already has a job of the same kind. Atomic with respect
    /// to concurrent callers.
    fn enqueue_once(&self, job: NewJob) -> Result<Option<Job>>;

    /// Atomically take the oldest `pending` job and mark it `running`.
    /// `Ok(None)` means the queue is empty.
    fn claim(&self) -> Result<Option<Job>>;

    /// `running -> done`.
    fn complete(&self, id: JobId) -> Result<()>;

    /// `running -> failed`, recording `message`.
    fn fail(&self, id: JobId, message: &str) -> Result<()>;

    /// Return every `running` job to `pending`. Only safe before any worker
    /// has started. Returns the number of jobs reset.
    fn reset_stalled(&self) -> Result<usize>;

    fn get(&self, id: JobId) -> Result<Job>;

    /// All jobs for a media, oldest first.
    fn jobs_for_media(&self, media_id: &MediaId) -> Result<Vec<Job>>;
}
