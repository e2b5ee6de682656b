//! Row mapping between SQLite columns and domain types.
//!
//! Enums and ids are stored as text and parsed back through their `FromStr`
//! impls; a value that fails to parse surfaces as a
//! `FromSqlConversionFailure` for the offending column.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;
use std::str::FromStr;

use cs_core::{Job, JobKind, Media, Variant};

// ---------------------------------------------------------------------------
// helpers
// ---------------------------------------------------------------------------

/// Fixed-width RFC 3339 timestamp, so text order matches time order.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn conversion_failure(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn parse_text<T>(row: &Row, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: String = row.get(idx)?;
    s.parse().map_err(|e| conversion_failure(idx, e))
}

fn parse_opt_text<T>(row: &Row, idx: usize) -> rusqlite::Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    let s: Option<String> = row.get(idx)?;
    s.map(|v| v.parse().map_err(|e| conversion_failure(idx, e)))
        .transpose()
}

fn parse_ts(row: &Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_failure(idx, e))
}

fn parse_opt_ts(row: &Row, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let s: Option<String> = row.get(idx)?;
    s.map(|v| {
        DateTime::parse_from_rfc3339(&v)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| conversion_failure(idx, e))
    })
    .transpose()
}

fn opt_u32(row: &Row, idx: usize) -> rusqlite::Result<Option<u32>> {
    row.get(idx)
}

fn opt_u64(row: &Row, idx: usize) -> rusqlite::Result<Option<u64>> {
    let v: Option<i64> = row.get(idx)?;
    Ok(v.map(|n| n.max(0) as u64))
}

// ---------------------------------------------------------------------------
// Media
// ---------------------------------------------------------------------------

pub const MEDIA_COLS: &str = "id, media_type, original_name, original_path, status, error_message,
    retention_days, converted_path, codec, width, height, file_size, thumb_path, probe_json,
    created_at, expires_at";

/// Build a [`Media`] from a row selected with [`MEDIA_COLS`]. Variants are
/// loaded separately.
pub fn media_from_row(row: &Row) -> rusqlite::Result<Media> {
    Ok(Media {
        id: parse_text(row, 0)?,
        media_type: parse_text(row, 1)?,
        original_name: row.get(2)?,
        original_path: row.get(3)?,
        status: parse_text(row, 4)?,
        error_message: row.get(5)?,
        retention_days: row.get(6)?,
        converted_path: row.get(7)?,
        codec: parse_opt_text(row, 8)?,
        width: opt_u32(row, 9)?,
        height: opt_u32(row, 10)?,
        file_size: opt_u64(row, 11)?,
        thumb_path: row.get(12)?,
        probe_json: row.get(13)?,
        created_at: parse_ts(row, 14)?,
        expires_at: parse_ts(row, 15)?,
        variants: Vec::new(),
    })
}

// ---------------------------------------------------------------------------
// Variant
// ---------------------------------------------------------------------------

pub const VARIANT_COLS: &str =
    "id, media_id, codec, path, file_size, width, height, status, error_message, created_at";

pub fn variant_from_row(row: &Row) -> rusqlite::Result<Variant> {
    Ok(Variant {
        id: row.get::<_, i64>(0)?.into(),
        media_id: parse_text(row, 1)?,
        codec: parse_text(row, 2)?,
        path: row.get(3)?,
        file_size: opt_u64(row, 4)?,
        width: opt_u32(row, 5)?,
        height: opt_u32(row, 6)?,
        status: parse_text(row, 7)?,
        error_message: row.get(8)?,
        created_at: parse_ts(row, 9)?,
    })
}

// ---------------------------------------------------------------------------
// Job
// ---------------------------------------------------------------------------

pub const JOB_COLS: &str = "id, media_id, kind, codec, fps, status, error_message, attempts,
    created_at, started_at, completed_at";

pub fn job_from_row(row: &Row) -> rusqlite::Result<Job> {
    let kind: String = row.get(2)?;
    Ok(Job {
        id: row.get::<_, i64>(0)?.into(),
        media_id: parse_text(row, 1)?,
        kind: JobKind::from(kind.as_str()),
        codec: parse_opt_text(row, 3)?,
        fps: opt_u32(row, 4)?,
        status: parse_text(row, 5)?,
        error_message: row.get(6)?,
        attempts: row.get(7)?,
        created_at: parse_ts(row, 8)?,
        started_at: parse_opt_ts(row, 9)?,
        completed_at: parse_opt_ts(row, 10)?,
    })
}
