//! Retention enforcement: delete expired media and their files.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use cs_core::{Media, MediaId, MediaStore, Result};
use tokio_util::sync::CancellationToken;

/// Outcome of one sweep.
#[derive(Debug, Default, Clone)]
pub struct SweepReport {
    pub removed: Vec<MediaId>,
    pub failed: Vec<(MediaId, String)>,
}

/// Delete one media record together with every file it references.
pub async fn remove_media(store: &dyn MediaStore, id: &MediaId) -> Result<()> {
    let media = store.get(id)?;
    remove_files(&media).await;
    store.delete(id)
}

/// Delete every media whose expiry is before `now`.
pub async fn sweep_expired(store: &dyn MediaStore, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    for media in store.list_expired(now)? {
        remove_files(&media).await;
        match store.delete(&media.id) {
            Ok(()) => report.removed.push(media.id),
            Err(e) => {
                tracing::warn!(media_id = %media.id, error = %e, "Failed to delete expired media");
                report.failed.push((media.id, e.to_string()));
            }
        }
    }
    Ok(report)
}

/// Sweep every `interval` until `cancel` fires.
pub async fn run_sweeper(store: Arc<dyn MediaStore>, interval: Duration, cancel: CancellationToken) {
    tracing::info!(interval_secs = interval.as_secs(), "Expiry sweeper started");
    loop {
        match sweep_expired(store.as_ref(), Utc::now()).await {
            Ok(report) if !report.removed.is_empty() || !report.failed.is_empty() => {
                tracing::info!(
                    removed = report.removed.len(),
                    failed = report.failed.len(),
                    "Expired media swept"
                );
            }
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Expiry sweep failed"),
        }

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
    tracing::info!("Expiry sweeper stopped");
}

async fn remove_files(media: &Media) {
    let paths = media
        .variants
        .iter()
        .filter_map(|v| v.path.as_deref())
        .chain(std::iter::once(media.original_path.as_str()))
        .chain(media.converted_path.as_deref())
        .chain(media.thumb_path.as_deref());

    for path in paths.filter(|p| !p.is_empty()) {
        match tokio::fs::remove_file(path).await {
            Ok(()) => tracing::debug!(media_id = %media.id, path, "Removed file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(media_id = %media.id, path, error = %e, "Failed to remove file"),
        }
    }
}
