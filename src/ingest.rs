//! Upload ingestion: turn a source file into a stored media plus the jobs
//! that will convert it.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use cs_core::{
    Codec, Error, JobQueue, Media, MediaConverter, MediaStore, MediaType, NewJob, Result,
    VariantOutput,
};

/// What to ingest and how to convert it.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// File to copy into the uploads directory.
    pub source: PathBuf,
    /// Display name; defaults to the source file name.
    pub original_name: Option<String>,
    /// Overrides detection from the file extension.
    pub media_type: Option<MediaType>,
    pub codecs: Vec<Codec>,
    pub fps: Option<u32>,
    pub retention_days: u32,
}

impl IngestRequest {
    pub fn new(source: impl Into<PathBuf>, retention_days: u32) -> Self {
        Self {
            source: source.into(),
            original_name: None,
            media_type: None,
            codecs: Vec::new(),
            fps: None,
            retention_days,
        }
    }

    pub fn codecs(mut self, codecs: impl IntoIterator<Item = Codec>) -> Self {
        self.codecs = codecs.into_iter().collect();
        self
    }

    pub fn fps(mut self, fps: Option<u32>) -> Self {
        self.fps = fps;
        self
    }
}

/// Codecs to convert to for an upload of `media_type`.
///
/// Duplicates are dropped keeping first occurrence order. Video always gets
/// an H264 output for broad playback support; images are never converted.
pub fn plan_codecs(media_type: MediaType, requested: &[Codec]) -> Vec<Codec> {
    if media_type == MediaType::Image {
        return Vec::new();
    }
    let mut codecs: Vec<Codec> = Vec::with_capacity(requested.len() + 1);
    for &codec in requested {
        if !codecs.contains(&codec) {
            codecs.push(codec);
        }
    }
    if media_type == MediaType::Video && !codecs.contains(&Codec::H264) {
        codecs.push(Codec::H264);
    }
    codecs
}

/// Creates media records and their conversion jobs.
pub struct Ingestor {
    store: Arc<dyn MediaStore>,
    queue: Arc<dyn JobQueue>,
    converter: Arc<dyn MediaConverter>,
    uploads_dir: PathBuf,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn MediaStore>,
        queue: Arc<dyn JobQueue>,
        converter: Arc<dyn MediaConverter>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            store,
            queue,
            converter,
            uploads_dir: uploads_dir.into(),
        }
    }

    /// Store the upload and queue its conversions.
    ///
    /// Uploads that need no conversion (images, or audio without requested
    /// codecs) are stored already `done` with the original as their output.
    pub async fn ingest(&self, request: IngestRequest) -> Result<Media> {
        if request.retention_days == 0 {
            return Err(Error::Validation(
                "retention must be at least one day".into(),
            ));
        }

        let meta = tokio::fs::metadata(&request.source).await?;
        if !meta.is_file() {
            return Err(Error::Validation(format!(
                "not a regular file: {}",
                request.source.display()
            )));
        }

        let name = match request.original_name {
            Some(name) => name,
            None => request
                .source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| Error::Validation("source has no file name".into()))?,
        };
        let media_type = request
            .media_type
            .unwrap_or_else(|| MediaType::detect(&name));

        let mut media = Media::new(media_type, name.clone(), String::new(), request.retention_days);

        let base = Path::new(&name)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "upload".to_string());
        tokio::fs::create_dir_all(&self.uploads_dir).await?;
        let stored = self.uploads_dir.join(format!("{}_{}", media.id, base));
        tokio::fs::copy(&request.source, &stored).await?;
        media.original_path = stored.to_string_lossy().into_owned();

        match self.converter.probe(&stored).await {
            Ok(probe) => {
                if let Some((w, h)) = probe.dimensions() {
                    media.width = Some(w);
                    media.height = Some(h);
                }
                if !probe.raw_json.is_empty() {
                    media.probe_json = Some(probe.raw_json);
                }
            }
            Err(e) => tracing::debug!(media_id = %media.id, error = %e, "Upload probe failed"),
        }

        let codecs = plan_codecs(media_type, &request.codecs);
        if codecs.is_empty() {
            let output = VariantOutput {
                path: media.original_path.clone(),
                file_size: meta.len(),
                width: media.width,
                height: media.height,
            };
            media.mark_done(None, &output);
        }

        if let Err(e) = self.store.create(&media) {
            if let Err(rm) = tokio::fs::remove_file(&stored).await {
                tracing::warn!(path = %stored.display(), error = %rm, "Failed to remove orphaned upload");
            }
            return Err(e);
        }

        tracing::info!(
            media_id = %media.id,
            media_type = %media_type,
            name = %name,
            retention_days = request.retention_days,
            codecs = ?codecs,
            "Media ingested"
        );

        for codec in codecs {
            self.store.create_variant(&media.id, codec)?;
            self.queue
                .enqueue(NewJob::convert(media.id.clone(), codec, request.fps))?;
        }

        self.store.get(&media.id)
    }
}
