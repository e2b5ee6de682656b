//! Per-kind job handlers and media finalization.

use std::path::{Path, PathBuf};

use cs_core::media::Aggregate;
use cs_core::{
    Codec, Error, Event, Job, JobKind, Media, MediaId, MediaStatus, MediaType, NewJob, Result,
    VariantOutput, VariantStatus,
};

use super::WorkerPool;

/// Message stored on a media whose every variant failed.
pub const ALL_CONVERSIONS_FAILED: &str = "all conversions failed";

impl WorkerPool {
    pub(super) async fn dispatch(&self, job: &Job) -> Result<()> {
        match &job.kind {
            JobKind::Convert => self.handle_convert(job).await,
            JobKind::Thumbnail => self.handle_thumbnail(job).await,
            JobKind::Probe => self.handle_probe(job).await,
            JobKind::Other(kind) => Err(Error::Validation(format!("unknown job kind: {kind}"))),
        }
    }

    fn publish(&self, media_id: &MediaId, event: Event) {
        self.events.publish(media_id, event);
    }

    fn thumb_path(&self, media_id: &MediaId) -> PathBuf {
        self.settings
            .converted_dir
            .join(format!("{media_id}_thumb.jpg"))
    }

    // -----------------------------------------------------------------------
    // convert
    // -----------------------------------------------------------------------

    async fn handle_convert(&self, job: &Job) -> Result<()> {
        let media = self.store.get(&job.media_id)?;

        // A re-claimed single-output job may find its media settled and the
        // original already removed.
        if job.codec.is_none() && media.status.is_terminal() {
            tracing::info!(media_id = %media.id, status = %media.status, "Media already settled");
            return Ok(());
        }

        if media.status == MediaStatus::Pending && self.store.mark_processing(&media.id)? {
            self.publish(&media.id, Event::status(MediaStatus::Processing, None));
        }

        tokio::fs::create_dir_all(&self.settings.converted_dir).await?;

        match job.codec {
            Some(codec) => self.convert_variant(job, &media, codec).await,
            None => self.convert_legacy(job, &media).await,
        }
    }

    async fn convert_variant(&self, job: &Job, media: &Media, codec: Codec) -> Result<()> {
        let variant = self
            .store
            .get_variant(&media.id, codec)?
            .ok_or_else(|| Error::not_found("variant", format!("{}/{codec}", media.id)))?;

        // A re-claimed job whose variant already settled only needs the
        // media re-evaluated.
        if variant.status.is_terminal() {
            tracing::info!(media_id = %media.id, %codec, status = %variant.status, "Variant already settled");
            self.finalize(&media.id)?;
            return Ok(());
        }

        if self.store.variant_processing(&media.id, codec)? {
            self.publish(&media.id, Event::variant(codec, VariantStatus::Processing, None));
        }

        let output_path = self
            .converter
            .convert(
                codec,
                Path::new(&media.original_path),
                &self.settings.converted_dir,
                &media.id,
                job.fps,
            )
            .await?;

        let mut output = VariantOutput {
            path: output_path.to_string_lossy().into_owned(),
            file_size: file_size(&output_path).await,
            width: None,
            height: None,
        };

        if media.media_type == MediaType::Video {
            match self.converter.probe(&output_path).await {
                Ok(probe) => {
                    if let Some((w, h)) = probe.dimensions() {
                        output.width = Some(w);
                        output.height = Some(h);
                    }
                    if media.probe_json.is_none() && !probe.raw_json.is_empty() {
                        self.store.set_probe_json(&media.id, &probe.raw_json)?;
                    }
                }
                Err(e) => {
                    tracing::warn!(media_id = %media.id, %codec, error = %e, "Probe of variant output failed");
                }
            }
        }

        if self.store.variant_done(&media.id, codec, &output)? {
            self.publish(&media.id, Event::variant(codec, VariantStatus::Done, None));
        }

        if media.media_type == MediaType::Video && media.thumb_path.is_none() {
            self.ensure_thumbnail_job(&media.id)?;
        }

        if !self.finalize(&media.id)? {
            self.publish(&media.id, Event::status(MediaStatus::Processing, None));
        }
        Ok(())
    }

    /// Single-output conversion: AV1 with an H264 fallback, then probe and
    /// thumbnail from the converted file.
    async fn convert_legacy(&self, job: &Job, media: &Media) -> Result<()> {
        let input = Path::new(&media.original_path);
        let dir = &self.settings.converted_dir;

        let (codec, output_path) = match self
            .converter
            .convert(Codec::Av1, input, dir, &media.id, job.fps)
            .await
        {
            Ok(path) => (Codec::Av1, path),
            Err(av1_err) => {
                tracing::warn!(media_id = %media.id, error = %av1_err, "AV1 conversion failed, falling back to H264");
                let path = self
                    .converter
                    .convert(Codec::H264, input, dir, &media.id, job.fps)
                    .await
                    .map_err(|e| {
                        Error::Internal(format!("both AV1 and H264 conversion failed: {e}"))
                    })?;
                (Codec::H264, path)
            }
        };

        let probe = self.converter.probe(&output_path).await?;
        let thumb = self.thumb_path(&media.id);
        self.converter.thumbnail(&output_path, &thumb).await?;

        let (width, height) = probe.dimensions().unzip();
        let output = VariantOutput {
            path: output_path.to_string_lossy().into_owned(),
            file_size: file_size(&output_path).await,
            width,
            height,
        };
        let settled = self.store.mark_done(&media.id, Some(codec), &output)?;
        self.store.set_thumbnail(&media.id, &thumb.to_string_lossy())?;
        if media.probe_json.is_none() && !probe.raw_json.is_empty() {
            self.store.set_probe_json(&media.id, &probe.raw_json)?;
        }

        if let Err(e) = tokio::fs::remove_file(input).await {
            tracing::debug!(media_id = %media.id, error = %e, "Could not remove original after conversion");
        }

        if settled {
            self.publish(&media.id, Event::status(MediaStatus::Done, None));
        }
        Ok(())
    }

    /// Enqueue a thumbnail job unless the media already has one.
    fn ensure_thumbnail_job(&self, media_id: &MediaId) -> Result<()> {
        if let Some(job) = self.queue.enqueue_once(NewJob::thumbnail(media_id.clone()))? {
            tracing::debug!(media_id = %media_id, job_id = %job.id, "Derived thumbnail job");
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // thumbnail / probe
    // -----------------------------------------------------------------------

    async fn handle_thumbnail(&self, job: &Job) -> Result<()> {
        let media = self.store.get(&job.media_id)?;
        if media.thumb_path.is_some() {
            tracing::debug!(media_id = %media.id, "Thumbnail already present");
            return Ok(());
        }

        let thumb = self.thumb_path(&media.id);
        self.converter
            .thumbnail(Path::new(&media.original_path), &thumb)
            .await?;
        self.store.set_thumbnail(&media.id, &thumb.to_string_lossy())
    }

    async fn handle_probe(&self, job: &Job) -> Result<()> {
        let media = self.store.get(&job.media_id)?;
        let source = media
            .converted_path
            .as_deref()
            .unwrap_or(&media.original_path);

        let probe = self.converter.probe(Path::new(source)).await?;
        if let Some((w, h)) = probe.dimensions() {
            self.store.set_dimensions(&media.id, w, h)?;
        }
        if media.probe_json.is_none() && !probe.raw_json.is_empty() {
            self.store.set_probe_json(&media.id, &probe.raw_json)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // outcomes
    // -----------------------------------------------------------------------

    /// Re-read the media and settle it if every variant is terminal.
    /// Returns whether the media is terminal. The final status event is
    /// published only by the call that moved the media.
    fn finalize(&self, media_id: &MediaId) -> Result<bool> {
        let media = self.store.get(media_id)?;
        match media.aggregate() {
            Some(Aggregate::Done(best)) => {
                let output = VariantOutput {
                    path: best.path.clone().unwrap_or_default(),
                    file_size: best.file_size.unwrap_or(0),
                    width: best.width,
                    height: best.height,
                };
                if self.store.mark_done(media_id, Some(best.codec), &output)? {
                    tracing::info!(media_id = %media_id, codec = %best.codec, "Media done");
                    self.publish(media_id, Event::status(MediaStatus::Done, None));
                }
                Ok(true)
            }
            Some(Aggregate::Failed) => {
                if self.store.mark_failed(media_id, ALL_CONVERSIONS_FAILED)? {
                    tracing::warn!(media_id = %media_id, "All conversions failed");
                    self.publish(
                        media_id,
                        Event::status(MediaStatus::Failed, Some(ALL_CONVERSIONS_FAILED.to_string())),
                    );
                }
                Ok(true)
            }
            Some(Aggregate::Pending | Aggregate::Processing) | None => Ok(false),
        }
    }

    /// State updates after a job failed. Errors here are logged only; the
    /// job itself is already recorded as failed.
    pub(super) fn on_failure(&self, job: &Job, message: &str) {
        if job.kind != JobKind::Convert {
            return;
        }

        let Some(codec) = job.codec else {
            match self.store.mark_failed(&job.media_id, message) {
                Ok(true) => self.publish(
                    &job.media_id,
                    Event::status(MediaStatus::Failed, Some(message.to_string())),
                ),
                Ok(false) => {
                    tracing::debug!(media_id = %job.media_id, "Media already settled; failure not recorded");
                }
                Err(e) => {
                    tracing::error!(media_id = %job.media_id, error = %e, "Failed to mark media failed");
                }
            }
            return;
        };

        match self.store.variant_failed(&job.media_id, codec, message) {
            Ok(true) => self.publish(
                &job.media_id,
                Event::variant(codec, VariantStatus::Failed, Some(message.to_string())),
            ),
            Ok(false) => {}
            Err(e) => {
                tracing::error!(media_id = %job.media_id, %codec, error = %e, "Failed to mark variant failed");
                return;
            }
        }

        if let Err(e) = self.finalize(&job.media_id) {
            tracing::error!(media_id = %job.media_id, error = %e, "Failed to settle media after variant failure");
        }
    }
}

async fn file_size(path: &Path) -> u64 {
    tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0)
}
