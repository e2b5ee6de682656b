//! Media CRUD operations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use cs_core::{Codec, Error, Media, MediaId, MediaStatus, Result, VariantOutput};

use crate::queries::variants;
use crate::rows::{fmt_ts, media_from_row, MEDIA_COLS};

/// Insert a new media row. Variants on the struct are ignored.
pub fn create_media(conn: &Connection, media: &Media) -> Result<()> {
    conn.execute(
        "INSERT INTO media (id, media_type, original_name, original_path, status, error_message,
                            retention_days, converted_path, codec, width, height, file_size,
                            thumb_path, probe_json, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
        params![
            media.id.as_str(),
            media.media_type.as_str(),
            media.original_name,
            media.original_path,
            media.status.as_str(),
            media.error_message,
            media.retention_days,
            media.converted_path,
            media.codec.map(|c| c.as_str()),
            media.width,
            media.height,
            media.file_size.map(|n| n as i64),
            media.thumb_path,
            media.probe_json,
            fmt_ts(media.created_at),
            fmt_ts(media.expires_at),
        ],
    )
    .map_err(|e| match e {
        rusqlite::Error::SqliteFailure(f, _)
            if f.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::Conflict(format!("media {} already exists", media.id))
        }
        other => Error::database(other.to_string()),
    })?;
    Ok(())
}

/// Get a media row (without variants).
pub fn find_media(conn: &Connection, id: &MediaId) -> Result<Option<Media>> {
    let q = format!("SELECT {MEDIA_COLS} FROM media WHERE id = ?1");
    conn.query_row(&q, [id.as_str()], media_from_row)
        .optional()
        .map_err(|e| Error::database(e.to_string()))
}

/// Get a media together with its variants.
pub fn get_media(conn: &Connection, id: &MediaId) -> Result<Media> {
    let mut media = find_media(conn, id)?.ok_or_else(|| Error::not_found("media", id))?;
    media.variants = variants::list_variants(conn, id)?;
    Ok(media)
}

fn list_where(conn: &Connection, filter: &str, arg: Option<String>) -> Result<Vec<Media>> {
    let q = format!("SELECT {MEDIA_COLS} FROM media {filter} ORDER BY created_at DESC, id");
    let mut stmt = conn.prepare(&q).map_err(|e| Error::database(e.to_string()))?;
    let rows = match arg {
        Some(a) => stmt.query_map([a], media_from_row),
        None => stmt.query_map([], media_from_row),
    }
    .map_err(|e| Error::database(e.to_string()))?
    .collect::<std::result::Result<Vec<_>, _>>()
    .map_err(|e| Error::database(e.to_string()))?;

    rows.into_iter()
        .map(|mut m| {
            m.variants = variants::list_variants(conn, &m.id)?;
            Ok(m)
        })
        .collect()
}

/// All media, newest first.
pub fn list_media(conn: &Connection) -> Result<Vec<Media>> {
    list_where(conn, "", None)
}

/// Media whose expiry instant is strictly before `now`.
pub fn list_expired(conn: &Connection, now: DateTime<Utc>) -> Result<Vec<Media>> {
    list_where(conn, "WHERE expires_at < ?1", Some(fmt_ts(now)))
}

/// Delete a media row. Variants and jobs go with it.
pub fn delete_media(conn: &Connection, id: &MediaId) -> Result<bool> {
    let n = conn
        .execute("DELETE FROM media WHERE id = ?1", [id.as_str()])
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// `pending -> processing`. Returns `false` if the media was not pending.
pub fn mark_processing(conn: &Connection, id: &MediaId) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET status = 'processing' WHERE id = ?1 AND status = 'pending'",
            [id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// `pending | processing -> done`, recording the chosen output in the legacy
/// columns. Returns `false` if the media is missing or already terminal.
pub fn mark_done(
    conn: &Connection,
    id: &MediaId,
    codec: Option<Codec>,
    output: &VariantOutput,
) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET status = ?1, error_message = NULL, converted_path = ?2, codec = ?3,
                              width = ?4, height = ?5, file_size = ?6
             WHERE id = ?7 AND status IN ('pending', 'processing')",
            params![
                MediaStatus::Done.as_str(),
                output.path,
                codec.map(|c| c.as_str()),
                output.width,
                output.height,
                output.file_size as i64,
                id.as_str(),
            ],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// `pending | processing -> failed`. Returns `false` if the media is missing
/// or already terminal.
pub fn mark_failed(conn: &Connection, id: &MediaId, message: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET status = ?1, error_message = ?2
             WHERE id = ?3 AND status IN ('pending', 'processing')",
            params![MediaStatus::Failed.as_str(), message, id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn set_thumbnail(conn: &Connection, id: &MediaId, path: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET thumb_path = ?1 WHERE id = ?2",
            params![path, id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

pub fn set_dimensions(conn: &Connection, id: &MediaId, width: u32, height: u32) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET width = ?1, height = ?2 WHERE id = ?3",
            params![width, height, id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}

/// Store the raw probe blob only if none is present yet.
pub fn set_probe_json(conn: &Connection, id: &MediaId, json: &str) -> Result<bool> {
    let n = conn
        .execute(
            "UPDATE media SET probe_json = ?1 WHERE id = ?2 AND probe_json IS NULL",
            params![json, id.as_str()],
        )
        .map_err(|e| Error::database(e.to_string()))?;
    Ok(n > 0)
}
