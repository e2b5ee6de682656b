//! Job queue operations.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use cs_core::{Error, Job, JobId, JobStatus, MediaId, NewJob, Result};

use crate::rows::{fmt_ts, job_from_row, JOB_COLS};

/// Persist a new `pending` job.
pub fn enqueue_job(conn: &Connection, job: &NewJob) -> Result<Job> {
    let q = format!(
        "INSERT INTO jobs (media_id, kind, codec, fps, status, attempts, created_at)
         VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5)
         RETURNING {JOB_COLS}"
    );
    conn.query_row(
        &q,
        params![
            job.media_id.as_str(),
            job.kind.as_str(),
            job.codec.map(|c| c.as_str()),
            job.fps,
            fmt_ts(Utc::now())
        ],
        job_from_row,
    )
    .map_err(|e| insert_error(e, job))
}

/// Persist a new `pending` job unless the media already has a job of the
/// same kind, in any status. Returns `None` when one existed.
///
/// The existence check and the insert are a single statement, so two
/// concurrent callers cannot both insert.
pub fn enqueue_unique(conn: &Connection, job: &NewJob) -> Result<Option<Job>> {
    let q = format!(
        "INSERT INTO jobs (media_id, kind, codec, fps, status, attempts, created_at)
         SELECT ?1, ?2, ?3, ?4, 'pending', 0, ?5
         WHERE NOT EXISTS (SELECT 1 FROM jobs WHERE media_id = ?1 AND kind = ?2)
         RETURNING {JOB_COLS}"
    );
    conn.query_row(
        &q,
        params![
            job.media_id.as_str(),
            job.kind.as_str(),
            job.codec.map(|c| c.as_str()),
            job.fps,
            fmt_ts(Utc::now())
        ],
        job_from_row,
    )
    .optional()
    .map_err(|e| insert_error(e, job))
}

fn insert_error(e: rusqlite::Error, job: &NewJob) -> Error {
    match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::not_found("media", &job.media_id)
        }
        other => Error::database(other.to_string()),
    }
}

/// Get a job by ID.
pub fn get_job(conn: &Connection, id: JobId) -> Result<Option<Job>> {
    let q = format!("SELECT {JOB_COLS} FROM jobs WHERE id = ?1");
    conn.query_row(&q, [id.get()], job_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// All jobs for a media, oldest first.
pub fn list_jobs_for_media(conn: &Connection, media_id: &MediaId) -> Result<Vec<Job>> {
    let q = format!("SELECT {JOB_COLS} FROM jobs WHERE media_id = ?1 ORDER BY created_at, id");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([media_id.as_str()], job_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// Count jobs in each status.
pub fn count_by_status(conn: &Connection) -> Result<Vec<(JobStatus, i64)>> {
    let mut stmt = conn
        .prepare("SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status")
        .map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    rows.into_iter()
        .map(|(s, n)| Ok((s.parse()?, n)))
        .collect()
}

/// Atomically claim the oldest pending job.
///
/// Runs inside an IMMEDIATE transaction so the write lock is taken before
/// the oldest row is chosen; concurrent claimers queue on the lock instead
/// of racing for the same row. Sets `status='running'`, stamps
/// `started_at` and increments `attempts`.
pub fn claim_next(conn: &mut Connection) -> Result<Option<Job>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| Error::database(e.to_string()))?;

    let now = fmt_ts(Utc::now());
    let q = format!(
        "UPDATE jobs SET status = 'running', started_at = ?1, attempts = attempts + 1
         WHERE status = 'pending' AND id = (
             SELECT id FROM jobs WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC LIMIT 1
         )
         RETURNING {JOB_COLS}"
    );
    let job = tx
        .query_row(&q, [&now], job_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))?;

    tx.commit().map_err(|e| Error::database(e.to_string()))?;
    Ok(job)
}

/// Move a running job to a terminal status.
fn finish(conn: &Connection, id: JobId, status: JobStatus, message: Option<&str>) -> Result<()> {
    let n = conn
        .execute(
            "UPDATE jobs SET status = ?1, error_message = ?2, completed_at = ?3
             WHERE id = ?4 AND status = 'running'",
            params![status.as_str(), message, fmt_ts(Utc::now()), id.get()],
        )
        .map_err(|e| Error::database(e.to_string()))?;

    if n == 0 {
        return match get_job(conn, id)? {
            None => Err(Error::not_found("job", id)),
            Some(job) => Err(Error::Conflict(format!(
                "job {id} is {}, not running",
                job.status
            ))),
        };
    }
    Ok(())
}

/// `running -> done`.
pub fn complete_job(conn: &Connection, id: JobId) -> Result<()> {
    finish(conn, id, JobStatus::Done, None)
}

/// `running -> failed`, recording the message.
pub fn fail_job(conn: &Connection, id: JobId, message: &str) -> Result<()> {
    finish(conn, id, JobStatus::Failed, Some(message))
}

/// Return every `running` job to `pending` and clear its start time.
pub fn reset_stalled(conn: &Connection) -> Result<usize> {
    conn.execute(
        "UPDATE jobs SET status = 'pending', started_at = NULL WHERE status = 'running'",
        [],
    )
    .map_err(|e| Error::database(e.to_string()))
}
