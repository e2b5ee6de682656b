//! Background worker pool.
//!
//! A fixed number of loops poll the [`JobQueue`], dispatch each claimed job
//! by kind and drive the Media/Variant state machine through the
//! [`MediaStore`]. State changes are announced on an [`EventPublisher`].

mod handlers;

pub use handlers::ALL_CONVERSIONS_FAILED;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use cs_core::config::Config;
use cs_core::{EventPublisher, Job, JobQueue, MediaConverter, MediaStore, Result};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Tunables for [`WorkerPool`].
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    /// Number of concurrent worker loops.
    pub count: usize,
    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,
    /// Sleep after a failed claim.
    pub claim_backoff: Duration,
    /// Directory receiving converted outputs and thumbnails.
    pub converted_dir: PathBuf,
}

impl WorkerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            count: config.workers.count,
            poll_interval: config.workers.poll_interval(),
            claim_backoff: config.workers.claim_backoff(),
            converted_dir: config.storage.converted_dir(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            count: 2,
            poll_interval: Duration::from_millis(500),
            claim_backoff: Duration::from_secs(2),
            converted_dir: PathBuf::from("./data/converted"),
        }
    }
}

/// Pool of workers sharing one queue, store, converter and event sink.
#[derive(Clone)]
pub struct WorkerPool {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn MediaStore>,
    converter: Arc<dyn MediaConverter>,
    events: Arc<dyn EventPublisher>,
    settings: WorkerSettings,
    span: tracing::Span,
}

impl WorkerPool {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn MediaStore>,
        converter: Arc<dyn MediaConverter>,
        events: Arc<dyn EventPublisher>,
        settings: WorkerSettings,
    ) -> Self {
        Self {
            queue,
            store,
            converter,
            events,
            settings,
            span: tracing::info_span!("worker_pool"),
        }
    }

    /// Log under `span` instead of the default `worker_pool` span.
    pub fn with_span(mut self, span: tracing::Span) -> Self {
        self.span = span;
        self
    }

    /// Recover stalled jobs, then spawn the worker loops.
    ///
    /// Stalled-job recovery finishes before any worker can claim. Loops stop
    /// at their next poll once `cancel` fires; a job already in progress runs
    /// to completion, including its queue bookkeeping.
    pub fn start(&self, cancel: CancellationToken) -> Result<Vec<JoinHandle<()>>> {
        {
            let _enter = self.span.enter();
            let reset = self.queue.reset_stalled()?;
            if reset > 0 {
                tracing::info!(count = reset, "Recovered stalled jobs");
            }
        }

        let count = self.settings.count.max(1);
        let handles = (0..count)
            .map(|worker| {
                let pool = self.clone();
                let cancel = cancel.clone();
                let span = tracing::info_span!(parent: &self.span, "worker", worker);
                tokio::spawn(async move { pool.run_worker(worker, cancel).await }.instrument(span))
            })
            .collect();

        let _enter = self.span.enter();
        tracing::info!(workers = count, "Worker pool started");
        Ok(handles)
    }

    async fn run_worker(&self, worker: usize, cancel: CancellationToken) {
        tracing::debug!(worker, "Worker started");
        loop {
            if cancel.is_cancelled() {
                break;
            }

            let delay = match self.queue.claim() {
                Ok(Some(job)) => {
                    self.process(job).await;
                    continue;
                }
                Ok(None) => self.settings.poll_interval,
                Err(e) => {
                    tracing::error!(worker, error = %e, "Failed to claim job");
                    self.settings.claim_backoff
                }
            };

            tokio::select! {
                biased;

                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::info!(worker, "Worker shutting down");
    }

    /// Claim and process at most one job. Returns whether a job was run.
    pub async fn process_one(&self) -> Result<bool> {
        match self.queue.claim()? {
            Some(job) => {
                self.process(job).instrument(self.span.clone()).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run one claimed job to completion and record its outcome.
    async fn process(&self, job: Job) {
        tracing::info!(
            job_id = %job.id,
            kind = %job.kind,
            media_id = %job.media_id,
            codec = ?job.codec,
            "Processing job"
        );

        match self.dispatch(&job).await {
            Ok(()) => match self.queue.complete(job.id) {
                Ok(()) => tracing::info!(job_id = %job.id, "Job completed"),
                Err(e) => tracing::error!(job_id = %job.id, error = %e, "Failed to complete job"),
            },
            Err(e) => {
                let message = e.to_string();
                tracing::error!(job_id = %job.id, error = %message, "Job failed");
                if let Err(e) = self.queue.fail(job.id, &message) {
                    tracing::error!(job_id = %job.id, error = %e, "Failed to record job failure");
                }
                self.on_failure(&job, &message);
            }
        }
    }
}
