//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], which opens a file-backed database in a temp
//! directory (so concurrent claims go through real SQLite locking), plus a
//! scripted [`FakeConverter`] standing in for ffmpeg.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;

use clipshare::{WorkerPool, WorkerSettings};
use cs_core::{
    Codec, Error, EventBus, JobQueue, Media, MediaConverter, MediaId, MediaStore, MediaType,
    NewJob, ProbeResult, Result,
};
use cs_db::{get_conn, init_pool, DbPool, SqliteJobQueue, SqliteStore};

/// ffprobe output the fake converter reports for every file.
pub const PROBE_JSON: &str = r#"{
  "format": {"format_name": "mov,mp4", "duration": "12.500000", "bit_rate": "2500000"},
  "streams": [
    {"index": 0, "codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
    {"index": 1, "codec_type": "audio", "codec_name": "aac", "channels": 2}
  ]
}"#;

// ---------------------------------------------------------------------------
// FakeConverter
// ---------------------------------------------------------------------------

/// Converter that writes small placeholder files instead of encoding.
#[derive(Default)]
pub struct FakeConverter {
    failing: Mutex<HashSet<Codec>>,
    fail_thumbnail: AtomicBool,
    fail_probe: AtomicBool,
    converts: AtomicUsize,
    thumbnails: AtomicUsize,
    probes: AtomicUsize,
}

impl FakeConverter {
    /// Make every conversion to `codec` fail.
    pub fn fail_codec(&self, codec: Codec) {
        self.failing.lock().insert(codec);
    }

    pub fn fail_thumbnails(&self) {
        self.fail_thumbnail.store(true, Ordering::SeqCst);
    }

    pub fn fail_probes(&self) {
        self.fail_probe.store(true, Ordering::SeqCst);
    }

    pub fn convert_calls(&self) -> usize {
        self.converts.load(Ordering::SeqCst)
    }

    pub fn thumbnail_calls(&self) -> usize {
        self.thumbnails.load(Ordering::SeqCst)
    }

    pub fn probe_calls(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MediaConverter for FakeConverter {
    async fn convert(
        &self,
        codec: Codec,
        input: &Path,
        output_dir: &Path,
        media_id: &MediaId,
        _fps: Option<u32>,
    ) -> Result<PathBuf> {
        self.converts.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().contains(&codec) {
            return Err(Error::tool("ffmpeg", format!("{codec} encoder unavailable")));
        }
        tokio::fs::create_dir_all(output_dir).await?;
        let output = output_dir.join(codec.output_file_name(media_id));
        tokio::fs::write(&output, format!("{codec} of {}", input.display())).await?;
        Ok(output)
    }

    async fn thumbnail(&self, _input: &Path, output: &Path) -> Result<()> {
        self.thumbnails.fetch_add(1, Ordering::SeqCst);
        if self.fail_thumbnail.load(Ordering::SeqCst) {
            return Err(Error::tool("ffmpeg", "no frame at 00:00:01"));
        }
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(output, b"jpeg").await?;
        Ok(())
    }

    async fn probe(&self, _input: &Path) -> Result<ProbeResult> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.fail_probe.load(Ordering::SeqCst) {
            return Err(Error::Probe("unreadable".into()));
        }
        ProbeResult::from_json(PROBE_JSON)
    }
}

// ---------------------------------------------------------------------------
// TestHarness
// ---------------------------------------------------------------------------

pub struct TestHarness {
    pub dir: TempDir,
    pub db: DbPool,
    pub store: Arc<SqliteStore>,
    pub queue: Arc<SqliteJobQueue>,
    pub converter: Arc<FakeConverter>,
    pub events: Arc<EventBus>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_event_buffer(16)
    }

    pub fn with_event_buffer(buffer: usize) -> Self {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let db = init_pool(&dir.path().join("test.db")).expect("failed to open database");
        Self {
            store: Arc::new(SqliteStore::new(db.clone())),
            queue: Arc::new(SqliteJobQueue::new(db.clone())),
            converter: Arc::new(FakeConverter::default()),
            events: Arc::new(EventBus::new(buffer)),
            db,
            dir,
        }
    }

    pub fn converted_dir(&self) -> PathBuf {
        self.dir.path().join("converted")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn settings(&self, workers: usize) -> WorkerSettings {
        WorkerSettings {
            count: workers,
            poll_interval: Duration::from_millis(10),
            claim_backoff: Duration::from_millis(20),
            converted_dir: self.converted_dir(),
        }
    }

    pub fn worker_pool(&self, workers: usize) -> WorkerPool {
        WorkerPool::new(
            self.queue.clone(),
            self.store.clone(),
            self.converter.clone(),
            self.events.clone(),
            self.settings(workers),
        )
    }

    /// Store a media backed by a real file, with one pending variant and
    /// one convert job per codec.
    pub fn seed_media(&self, media_type: MediaType, codecs: &[Codec]) -> Media {
        let mut media = Media::new(media_type, "clip.mov", String::new(), 7);
        let uploads = self.uploads_dir();
        std::fs::create_dir_all(&uploads).unwrap();
        let original = uploads.join(format!("{}_clip.mov", media.id));
        std::fs::write(&original, b"original bytes").unwrap();
        media.original_path = original.to_string_lossy().into_owned();
        self.store.create(&media).unwrap();

        for &codec in codecs {
            self.store.create_variant(&media.id, codec).unwrap();
            self.queue
                .enqueue(NewJob::convert(media.id.clone(), codec, None))
                .unwrap();
        }
        self.store.get(&media.id).unwrap()
    }

    /// Put every job back to `running` and recover it as a restart would,
    /// so already-processed jobs get delivered a second time.
    pub fn replay_after_crash(&self) -> usize {
        let conn = get_conn(&self.db).unwrap();
        conn.execute("UPDATE jobs SET status = 'running'", []).unwrap();
        self.queue.reset_stalled().unwrap()
    }

    /// Run jobs on the calling task until the queue is empty.
    pub async fn drain(&self, pool: &WorkerPool) -> usize {
        let mut n = 0;
        while pool.process_one().await.unwrap() {
            n += 1;
        }
        n
    }
}
