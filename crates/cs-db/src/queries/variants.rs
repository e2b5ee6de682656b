//! Per-codec variant rows.
//!
//! Status updates carry their allowed source states in the `WHERE` clause so
//! a variant only moves forward and never changes once terminal.

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use cs_core::{Codec, Error, MediaId, Result, Variant, VariantOutput, VariantStatus};

use crate::rows::{fmt_ts, variant_from_row, VARIANT_COLS};

/// Create a `pending` variant for (media, codec).
pub fn create_variant(conn: &Connection, media_id: &MediaId, codec: Codec) -> Result<Variant> {
    let now = Utc::now();
    conn.execute(
        "INSERT INTO media_variants (media_id, codec, status, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            media_id.as_str(),
            codec.as_str(),
            VariantStatus::Pending.as_str(),
            fmt_ts(now)
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("{codec} variant already exists for media {media_id}"))
        }
        other => Error::database(other.to_string()),
    })?;

    get_variant(conn, media_id, codec)?
        .ok_or_else(|| Error::Internal(format!("{codec} variant for {media_id} vanished after insert")))
}

pub fn get_variant(conn: &Connection, media_id: &MediaId, codec: Codec) -> Result<Option<Variant>> {
    let q = format!("SELECT {VARIANT_COLS} FROM media_variants WHERE media_id = ?1 AND codec = ?2");
    conn.query_row(&q, params![media_id.as_str(), codec.as_str()], variant_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Variants of a media in codec preference order.
pub fn list_variants(conn: &Connection, media_id: &MediaId) -> Result<Vec<Variant>> {
    let q = format!(
        "SELECT {VARIANT_COLS} FROM media_variants WHERE media_id = ?1
         ORDER BY CASE codec WHEN 'av1' THEN 0 WHEN 'h264' THEN 1 WHEN 'opus' THEN 2 ELSE 3 END, id"
    );
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = stmt
        .query_map([media_id.as_str()], variant_from_row)
        .map_err(|e| Error::database(e.to_string()))?
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(rows)
}

/// `pending -> processing`.
pub fn mark_processing(conn: &Connection, media_id: &MediaId, codec: Codec) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media_variants SET status = 'processing'
             WHERE media_id = ?1 AND codec = ?2 AND status = 'pending'",
            params![media_id.as_str(), codec.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// `pending | processing -> done` with the produced file's metadata.
pub fn mark_done(
    conn: &Connection,
    media_id: &MediaId,
    codec: Codec,
    output: &VariantOutput,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media_variants
             SET status = 'done', path = ?1, file_size = ?2, width = ?3, height = ?4,
                 error_message = NULL
             WHERE media_id = ?5 AND codec = ?6 AND status IN ('pending', 'processing')",
            params![
                output.path,
                output.file_size as i64,
                output.width,
                output.height,
                media_id.as_str(),
                codec.as_str(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// `pending | processing -> failed` with the error message.
pub fn mark_failed(conn: &Connection, media_id: &MediaId, codec: Codec, message: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media_variants SET status = 'failed', error_message = ?1
             WHERE media_id = ?2 AND codec = ?3 AND status IN ('pending', 'processing')",
            params![message, media_id.as_str(), codec.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
