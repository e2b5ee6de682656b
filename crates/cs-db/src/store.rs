//! SQLite implementations of the pipeline's persistence traits.

use chrono::{DateTime, Utc};
use cs_core::{
    Codec, Job, JobId, JobQueue, Media, MediaId, MediaStore, NewJob, Result, Variant,
    VariantOutput,
};

use crate::pool::{get_conn, DbPool};
use crate::queries::{jobs, media, variants};

// ---------------------------------------------------------------------------
// SqliteStore
// ---------------------------------------------------------------------------

/// Distinguish "already terminal" from "no such media" after a guarded
/// update changed nothing.
fn ensure_exists(conn: &rusqlite::Connection, id: &MediaId) -> Result<()> {
    match media::find_media(conn, id)? {
        Some(_) => Ok(()),
        None => Err(cs_core::Error::not_found("media", id)),
    }
}

/// [`MediaStore`] over a connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: DbPool,
}

impl SqliteStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

impl MediaStore for SqliteStore {
    fn create(&self, m: &Media) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        media::create_media(&conn, m)
    }

    fn get(&self, id: &MediaId) -> Result<Media> {
        let conn = get_conn(&self.pool)?;
        media::get_media(&conn, id)
    }

    fn list_all(&self) -> Result<Vec<Media>> {
        let conn = get_conn(&self.pool)?;
        media::list_media(&conn)
    }

    fn list_expired(&self, now: DateTime<Utc>) -> Result<Vec<Media>> {
        let conn = get_conn(&self.pool)?;
        media::list_expired(&conn, now)
    }

    fn delete(&self, id: &MediaId) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        media::delete_media(&conn, id)?;
        Ok(())
    }

    fn mark_processing(&self, id: &MediaId) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        media::mark_processing(&conn, id)
    }

    fn mark_done(&self, id: &MediaId, codec: Option<Codec>, output: &VariantOutput) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        if media::mark_done(&conn, id, codec, output)? {
            return Ok(true);
        }
        ensure_exists(&conn, id)?;
        Ok(false)
    }

    fn mark_failed(&self, id: &MediaId, message: &str) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        if media::mark_failed(&conn, id, message)? {
            return Ok(true);
        }
        ensure_exists(&conn, id)?;
        Ok(false)
    }

    fn set_thumbnail(&self, id: &MediaId, path: &str) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        if !media::set_thumbnail(&conn, id, path)? {
            return Err(cs_core::Error::not_found("media", id));
        }
        Ok(())
    }

    fn set_dimensions(&self, id: &MediaId, width: u32, height: u32) -> Result<()> {
        let conn = get_conn(&self.pool)?;
        if !media::set_dimensions(&conn, id, width, height)? {
            return Err(cs_core::Error::not_found("media", id));
        }
        Ok(())
    }

    fn set_probe_json(&self, id: &MediaId, json: &str) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        media::set_probe_json(&conn, id, json)
    }

    fn create_variant(&self, media_id: &MediaId, codec: Codec) -> Result<Variant> {
        let conn = get_conn(&self.pool)?;
        variants::create_variant(&conn, media_id, codec)
    }

    fn get_variant(&self, media_id: &MediaId, codec: Codec) -> Result<Option<Variant>> {
        let conn = get_conn(&self.pool)?;
        variants::get_variant(&conn, media_id, codec)
    }

    fn variant_processing(&self, media_id: &MediaId, codec: Codec) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        variants::mark_processing(&conn, media_id, codec)
    }

    fn variant_done(&self, media_id: &MediaId, codec: Codec, output: &VariantOutput) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        variants::mark_done(&conn, media_id, codec, output)
    }

    fn variant_failed(&self, media_id: &MediaId, codec: Codec, message: &str) -> Result<bool> {
        let conn = get_conn(&self.pool)?;
        variants::mark_failed(&conn, media_id, codec, message)
    }
}

// ---------------------------------------------------------------------------
// SqliteJobQueue
// ---------------------------------------------------------------------------

/// [`JobQueue`] over a connection pool. Queue events are logged inside the
/// span given at construction.
#[derive(Clone)]
pub struct SqliteJobQueue {
    pool: DbPool,
    span: tracing::Span,
}

impl SqliteJobQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            span: tracing::info_span!("job_queue"),
        }
    }

    /// Log queue events under `span` instead of the default `job_queue` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }
}

impl JobQueue for SqliteJobQueue {
    fn enqueue(&self, new: NewJob) -> Result<Job> {
        let _enter = self.span.enter();
        let conn = get_conn(&self.pool)?;
        let job = jobs::enqueue_job(&conn, &new)?;
        tracing::debug!(
            job_id = %job.id,
            media_id = %job.media_id,
            kind = %job.kind,
            codec = ?job.codec,
            "Job enqueued"
        );
        Ok(job)
    }

    fn enqueue_once(&self, new: NewJob) -> Result<Option<Job>> {
        let _enter = self.span.enter();
        let conn = get_conn(&self.pool)?;
        let job = jobs::enqueue_unique(&conn, &new)?;
        match job {
            Some(ref j) => tracing::debug!(job_id = %j.id, media_id = %j.media_id, kind = %j.kind, "Job enqueued"),
            None => tracing::debug!(media_id = %new.media_id, kind = %new.kind, "Job of this kind already queued"),
        }
        Ok(job)
    }

    fn claim(&self) -> Result<Option<Job>> {
        let _enter = self.span.enter();
        let mut conn = get_conn(&self.pool)?;
        let job = jobs::claim_next(&mut conn)?;
        if let Some(ref j) = job {
            tracing::debug!(job_id = %j.id, attempts = j.attempts, "Job claimed");
        }
        Ok(job)
    }

    fn complete(&self, id: JobId) -> Result<()> {
        let _enter = self.span.enter();
        let conn = get_conn(&self.pool)?;
        jobs::complete_job(&conn, id)?;
        tracing::debug!(job_id = %id, "Job completed");
        Ok(())
    }

    fn fail(&self, id: JobId, message: &str) -> Result<()> {
        let _enter = self.span.enter();
        let conn = get_conn(&self.pool)?;
        jobs::fail_job(&conn, id, message)?;
        tracing::debug!(job_id = %id, error = message, "Job failed");
        Ok(())
    }

    fn reset_stalled(&self) -> Result<usize> {
        let _enter = self.span.enter();
        let conn = get_conn(&self.pool)?;
        let n = jobs::reset_stalled(&conn)?;
        if n > 0 {
            tracing::info!(count = n, "Reset stalled jobs to pending");
        }
        Ok(n)
    }

    fn get(&self, id: JobId) -> Result<Job> {
        let conn = get_conn(&self.pool)?;
        jobs::get_job(&conn, id)?.ok_or_else(|| cs_core::Error::not_found("job", id))
    }

    fn jobs_for_media(&self, media_id: &MediaId) -> Result<Vec<Job>> {
        let conn = get_conn(&self.pool)?;
        jobs::list_jobs_for_media(&conn, media_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::init_memory_pool;
    use cs_core::{JobStatus, MediaType, VariantStatus};

    #[test]
    fn test_store_roundtrip_with_variants() {
        let store = SqliteStore::new(init_memory_pool().unwrap());
        let m = Media::new(MediaType::Video, "clip.mov", "/u/clip.mov", 3);
        store.create(&m).unwrap();
        store.create_variant(&m.id, Codec::H264).unwrap();
        store.create_variant(&m.id, Codec::Av1).unwrap();

        assert!(store.variant_processing(&m.id, Codec::Av1).unwrap());
        assert!(store.variant_failed(&m.id, Codec::Av1, "boom").unwrap());

        let got = store.get(&m.id).unwrap();
        assert_eq!(got.variants.len(), 2);
        assert_eq!(got.variant(Codec::Av1).unwrap().status, VariantStatus::Failed);
        assert_eq!(got.variant(Codec::H264).unwrap().status, VariantStatus::Pending);
        assert!(!got.all_variants_terminal());
    }

    #[test]
    fn test_store_updates_on_missing_media() {
        let store = SqliteStore::new(init_memory_pool().unwrap());
        let id = MediaId::generate();
        assert!(store.mark_failed(&id, "x").unwrap_err().is_not_found());
        assert!(store.set_thumbnail(&id, "/t.jpg").unwrap_err().is_not_found());
    }

    #[test]
    fn test_terminal_media_reports_no_change() {
        let store = SqliteStore::new(init_memory_pool().unwrap());
        let m = Media::new(MediaType::Audio, "song.flac", "/u/song.flac", 3);
        store.create(&m).unwrap();
        let out = VariantOutput {
            path: "/c/song_opus.ogg".into(),
            file_size: 9,
            width: None,
            height: None,
        };

        assert!(store.mark_done(&m.id, Some(Codec::Opus), &out).unwrap());
        assert!(!store.mark_done(&m.id, Some(Codec::Opus), &out).unwrap());
        assert!(!store.mark_failed(&m.id, "too late").unwrap());
        assert_eq!(store.get(&m.id).unwrap().status, cs_core::MediaStatus::Done);
    }

    #[test]
    fn test_delete_cascades() {
        let pool = init_memory_pool().unwrap();
        let store = SqliteStore::new(pool.clone());
        let queue = SqliteJobQueue::new(pool);
        let m = Media::new(MediaType::Video, "clip.mov", "/u/clip.mov", 3);
        store.create(&m).unwrap();
        store.create_variant(&m.id, Codec::H264).unwrap();
        let job = queue.enqueue(NewJob::convert(m.id.clone(), Codec::H264, None)).unwrap();

        store.delete(&m.id).unwrap();
        assert!(store.get(&m.id).unwrap_err().is_not_found());
        assert!(queue.get(job.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_queue_lifecycle() {
        let pool = init_memory_pool().unwrap();
        let store = SqliteStore::new(pool.clone());
        let queue = SqliteJobQueue::new(pool).with_span(tracing::info_span!("test_queue"));
        let m = Media::new(MediaType::Audio, "song.flac", "/u/song.flac", 3);
        store.create(&m).unwrap();

        let job = queue.enqueue(NewJob::convert(m.id.clone(), Codec::Opus, None)).unwrap();
        let claimed = queue.claim().unwrap().unwrap();
        assert_eq!(claimed.id, job.id);
        assert!(queue.claim().unwrap().is_none());

        queue.fail(claimed.id, "encoder missing").unwrap();
        let stored = queue.get(job.id).unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(queue.reset_stalled().unwrap(), 0);
        assert_eq!(queue.jobs_for_media(&m.id).unwrap().len(), 1);
    }
}
