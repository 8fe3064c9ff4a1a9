//! Batch processor: runs transform jobs on a bounded pool of blocking workers.
//!
//! Every job is isolated. A job that fails to validate, decode, transform,
//! encode or store yields a failed [`JobResult`] and nothing else; sibling jobs
//! are unaffected. The report is only built once every job has finished.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::JobError;
use crate::store::ContentStore;
use crate::types::{BatchReport, JobOutcome, JobResult};

use super::codec::ImageCodec;
use super::job::TransformJob;
use super::validate::Validator;

/// Cooperative cancellation for a running batch.
///
/// Once raised, no further jobs are scheduled. Jobs already running finish
/// normally; jobs never scheduled are reported as cancelled.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// State shared by every worker of a processor.
struct Shared<C> {
    codec: C,
    store: Arc<dyn ContentStore>,
    validator: Validator,
    max_dimension: u32,
}

/// Runs batches of [`TransformJob`]s concurrently and persists their outputs.
pub struct BatchProcessor<C: ImageCodec> {
    shared: Arc<Shared<C>>,
    parallel_workers: usize,
}

enum Pending {
    Done(JobResult),
    Running(String, JoinHandle<JobResult>),
}

impl<C: ImageCodec> BatchProcessor<C> {
    /// Create a processor writing into `store`, sized from `config`.
    pub fn new(codec: C, store: Arc<dyn ContentStore>, config: &Config) -> Self {
        Self {
            shared: Arc::new(Shared {
                codec,
                store,
                validator: Validator::new(config.limits.clone()),
                max_dimension: config.limits.max_image_dimension,
            }),
            parallel_workers: config.processing.parallel_workers.max(1),
        }
    }

    /// Override the number of jobs run at once (at least one).
    pub fn with_parallel_workers(mut self, parallel_workers: usize) -> Self {
        self.parallel_workers = parallel_workers.max(1);
        self
    }

    pub fn parallel_workers(&self) -> usize {
        self.parallel_workers
    }

    /// Process every job and return once all of them reached a terminal outcome.
    ///
    /// Results are reported in submission order.
    pub async fn process_batch(&self, jobs: Vec<TransformJob>) -> BatchReport {
        self.process_batch_with_cancel(jobs, &CancelFlag::new())
            .await
    }

    /// Like [`process_batch`](Self::process_batch), but stops scheduling new
    /// jobs once `cancel` is raised.
    pub async fn process_batch_with_cancel(
        &self,
        jobs: Vec<TransformJob>,
        cancel: &CancelFlag,
    ) -> BatchReport {
        let start = Instant::now();
        let total = jobs.len();
        tracing::info!(
            "Processing {} image(s) with {} worker(s)",
            total,
            self.parallel_workers
        );

        let semaphore = Arc::new(Semaphore::new(self.parallel_workers));
        let mut pending = Vec::with_capacity(total);

        for job in jobs {
            if cancel.is_cancelled() {
                pending.push(Pending::Done(cancelled(&job)));
                continue;
            }

            // Blocks submission while the pool is saturated.
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => {
                    let error = JobError::Worker {
                        name: job.source_name().to_string(),
                        message: e.to_string(),
                    };
                    pending.push(Pending::Done(JobResult::failed(job.source_name(), &error)));
                    continue;
                }
            };
            if cancel.is_cancelled() {
                pending.push(Pending::Done(cancelled(&job)));
                continue;
            }

            let name = job.source_name().to_string();
            let shared = self.shared.clone();
            let handle = tokio::task::spawn_blocking(move || {
                let result = shared.run(job);
                drop(permit);
                result
            });
            pending.push(Pending::Running(name, handle));
        }

        let mut results = Vec::with_capacity(total);
        for entry in pending {
            match entry {
                Pending::Done(result) => results.push(result),
                Pending::Running(name, handle) => match handle.await {
                    Ok(result) => results.push(result),
                    Err(e) => {
                        tracing::error!("Worker for {:?} panicked: {}", name, e);
                        let error = JobError::Worker {
                            name: name.clone(),
                            message: e.to_string(),
                        };
                        results.push(JobResult::failed(name, &error));
                    }
                },
            }
        }

        let report = BatchReport::new(results, start.elapsed().as_secs_f64());
        tracing::info!(
            succeeded = report.stats.succeeded,
            failed = report.stats.failed,
            "Batch finished in {:.2}s",
            report.stats.total_seconds
        );
        report
    }
}

fn cancelled(job: &TransformJob) -> JobResult {
    let error = JobError::Cancelled {
        name: job.source_name().to_string(),
    };
    JobResult::failed(job.source_name(), &error)
}

impl<C: ImageCodec> Shared<C> {
    /// Run one job to a terminal result. Executes on a blocking thread.
    fn run(&self, job: TransformJob) -> JobResult {
        let start = Instant::now();
        let name = job.source_name().to_string();

        match self.execute(&job) {
            Ok(outcome) => {
                tracing::debug!("Processed {:?} in {:?}", name, start.elapsed());
                JobResult {
                    source_name: name,
                    outcome,
                }
            }
            Err(e) => {
                tracing::warn!("Failed: {}", e);
                JobResult::failed(name, &e)
            }
        }
    }

    fn execute(&self, job: &TransformJob) -> Result<JobOutcome, JobError> {
        self.validator.validate(job)?;
        let name = job.source_name();

        for op in job.operations() {
            op.check(self.max_dimension)
                .map_err(|message| JobError::Operation {
                    name: name.to_string(),
                    operation: op.to_string(),
                    message,
                })?;
        }

        // The raster is owned by this worker and moves through each operation in turn.
        let mut raster = self
            .codec
            .decode(job.raw_bytes())
            .map_err(|e| JobError::Decode {
                name: name.to_string(),
                message: e.to_string(),
            })?;

        let (width, height) = self.codec.dimensions(&raster);
        if width > self.max_dimension || height > self.max_dimension {
            return Err(JobError::Decode {
                name: name.to_string(),
                message: format!(
                    "image is {}x{}, max dimension is {}",
                    width, height, self.max_dimension
                ),
            });
        }

        for op in job.operations() {
            tracing::trace!("  {:?}: {}", name, op);
            raster = self
                .codec
                .apply(raster, op)
                .map_err(|e| JobError::Operation {
                    name: name.to_string(),
                    operation: op.to_string(),
                    message: e.to_string(),
                })?;
        }

        let (width, height) = self.codec.dimensions(&raster);
        let bytes = self.codec.encode(&raster).map_err(|e| JobError::Encode {
            name: name.to_string(),
            message: e.to_string(),
        })?;
        drop(raster);

        // Stored before the result exists, so a success is immediately readable.
        self.store
            .write(name, &bytes)
            .map_err(|source| JobError::StorageWrite {
                name: name.to_string(),
                source,
            })?;

        Ok(JobOutcome::Success {
            output_name: name.to_string(),
            width,
            height,
            size_bytes: bytes.len() as u64,
            content_hash: content_hash(&bytes),
        })
    }
}

/// BLAKE3 hash of the encoded output.
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
