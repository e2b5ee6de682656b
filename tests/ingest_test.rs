//! Ingestion integration tests: uploads become media, variants and jobs.

mod common;

use std::path::{Path, PathBuf};

use assert_matches::assert_matches;
use clipshare::{IngestRequest, Ingestor};
use common::TestHarness;
use cs_core::{
    Codec, Error, JobKind, JobQueue, JobStatus, MediaStatus, MediaStore, MediaType, VariantStatus,
};

fn ingestor(harness: &TestHarness) -> Ingestor {
    Ingestor::new(
        harness.store.clone(),
        harness.queue.clone(),
        harness.converter.clone(),
        harness.uploads_dir(),
    )
}

fn source_file(harness: &TestHarness, name: &str, bytes: &[u8]) -> PathBuf {
    let dir = harness.dir.path().join("incoming");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

#[tokio::test]
async fn video_ingest_queues_one_job_per_codec() {
    let harness = TestHarness::new();
    let source = source_file(&harness, "holiday.mp4", b"not really a video");

    let media = ingestor(&harness)
        .ingest(IngestRequest::new(&source, 3).codecs([Codec::Av1, Codec::Av1]).fps(Some(30)))
        .await
        .unwrap();

    assert_eq!(media.media_type, MediaType::Video);
    assert_eq!(media.status, MediaStatus::Pending);
    assert_eq!(media.original_name, "holiday.mp4");
    assert_eq!(media.retention_days, 3);
    assert_eq!((media.width, media.height), (Some(1280), Some(720)));
    assert!(media.probe_json.is_some());

    // Copied, not moved.
    let stored = Path::new(&media.original_path);
    assert!(stored.starts_with(harness.uploads_dir()));
    assert_eq!(
        stored.file_name().unwrap().to_string_lossy(),
        format!("{}_holiday.mp4", media.id)
    );
    assert!(stored.exists());
    assert!(source.exists());

    // Duplicate AV1 collapsed, H264 added for video.
    let codecs: Vec<Codec> = media.variants.iter().map(|v| v.codec).collect();
    assert_eq!(codecs, vec![Codec::Av1, Codec::H264]);
    assert!(media.variants.iter().all(|v| v.status == VariantStatus::Pending));

    let jobs = harness.queue.jobs_for_media(&media.id).unwrap();
    assert_eq!(jobs.len(), 2);
    assert!(jobs.iter().all(|j| j.kind == JobKind::Convert && j.fps == Some(30)));
    assert_eq!(jobs[0].codec, Some(Codec::Av1));
    assert_eq!(jobs[1].codec, Some(Codec::H264));
}

#[tokio::test]
async fn image_is_done_without_jobs() {
    let harness = TestHarness::new();
    let source = source_file(&harness, "photo.PNG", b"0123456789");

    let media = ingestor(&harness)
        .ingest(IngestRequest::new(&source, 7).codecs([Codec::Av1]))
        .await
        .unwrap();

    assert_eq!(media.media_type, MediaType::Image);
    assert_eq!(media.status, MediaStatus::Done);
    assert_eq!(media.converted_path.as_deref(), Some(media.original_path.as_str()));
    assert_eq!(media.file_size, Some(10));
    assert!(media.codec.is_none());
    assert!(media.variants.is_empty());
    assert!(harness.queue.jobs_for_media(&media.id).unwrap().is_empty());
}

#[tokio::test]
async fn audio_without_codecs_keeps_original() {
    let harness = TestHarness::new();
    let source = source_file(&harness, "song.flac", b"flac");

    let media = ingestor(&harness)
        .ingest(IngestRequest::new(&source, 7))
        .await
        .unwrap();

    assert_eq!(media.media_type, MediaType::Audio);
    assert_eq!(media.status, MediaStatus::Done);
    assert!(harness.queue.jobs_for_media(&media.id).unwrap().is_empty());
}

#[tokio::test]
async fn invalid_requests_are_rejected() {
    let harness = TestHarness::new();
    let source = source_file(&harness, "clip.mov", b"x");
    let ingestor = ingestor(&harness);

    assert_matches!(
        ingestor.ingest(IngestRequest::new(&source, 0)).await,
        Err(Error::Validation(_))
    );
    assert_matches!(
        ingestor
            .ingest(IngestRequest::new(harness.dir.path().join("missing.mov"), 7))
            .await,
        Err(Error::Io { .. })
    );
    assert!(harness.store.list_all().unwrap().is_empty());
}

#[tokio::test]
async fn ingested_upload_runs_through_the_pipeline() {
    let harness = TestHarness::new();
    let source = source_file(&harness, "clip.mov", b"frames");
    let media = ingestor(&harness)
        .ingest(IngestRequest::new(&source, 7).codecs([Codec::Av1]))
        .await
        .unwrap();

    let pool = harness.worker_pool(1);
    // av1, h264, then the derived thumbnail.
    assert_eq!(harness.drain(&pool).await, 3);

    let media = harness.store.get(&media.id).unwrap();
    assert_eq!(media.status, MediaStatus::Done);
    assert_eq!(media.codec, Some(Codec::Av1));
    assert!(media.thumb_path.is_some());
    assert!(harness
        .queue
        .jobs_for_media(&media.id)
        .unwrap()
        .iter()
        .all(|j| j.status == JobStatus::Done));

    let best = media.best_variant_for_accept("video/mp4").unwrap();
    assert_eq!(best.codec, Codec::H264);
}
