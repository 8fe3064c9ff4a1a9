//! Grisaille Core - batch image transforms with archive download.
//!
//! Uploaded images are resized and converted to grayscale concurrently, each
//! job isolated from the others, and stored under their upload name. Stored
//! outputs can later be bundled into a single `.tar.gz`.
//!
//! # Architecture
//!
//! ```text
//! uploads → TransformJobs → BatchProcessor (bounded pool) → ContentStore
//!                                                               ↓
//!                               names → ArchiveAssembler → archive bytes
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use grisaille_core::{Config, Grisaille, Upload};
//!
//! #[tokio::main]
//! async fn main() -> grisaille_core::Result<()> {
//!     let grisaille = Grisaille::new(Config::load()?)?;
//!
//!     let bytes = std::fs::read("cat.jpg")?;
//!     let report = grisaille.submit(vec![Upload::new("cat.jpg", bytes)]).await;
//!     println!("{} succeeded", report.stats.succeeded);
//!
//!     let archive = grisaille.download(report.output_names()).await?;
//!     std::fs::write("processed.tar.gz", archive)?;
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod archive;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod store;
pub mod types;

// Re-exports for convenient access
pub use archive::ArchiveAssembler;
pub use config::Config;
pub use error::{ArchiveError, ConfigError, GrisailleError, JobError, Result, StoreError};
pub use output::{OutputFormat, OutputWriter};
pub use pipeline::{
    BatchProcessor, CancelFlag, DiscoveredFile, DynamicImageCodec, FileDiscovery, ImageCodec,
    Operation, TransformJob,
};
pub use store::{ContentStore, FsContentStore, MemoryContentStore};
pub use types::{
    ArchiveRequest, ArchiveSummary, BatchReport, BatchStats, FailureKind, JobOutcome, JobResult,
    Upload,
};

use std::path::PathBuf;
use std::sync::Arc;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point tying the batch processor and archive assembler to one store.
///
/// Holds no state of its own beyond the shared components; callers such as a
/// web handler or the CLI go through [`submit`](Self::submit) and
/// [`download`](Self::download).
pub struct Grisaille<C: ImageCodec = DynamicImageCodec> {
    config: Config,
    store: Arc<dyn ContentStore>,
    processor: BatchProcessor<C>,
    assembler: Arc<ArchiveAssembler>,
}

impl Grisaille {
    /// Create an instance backed by the filesystem store and the `image` codec.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        let store = Arc::new(FsContentStore::new(config.store_dir())?);
        let codec = DynamicImageCodec::new(config.limits.max_image_dimension);
        tracing::debug!("Initializing Grisaille v{}", VERSION);
        Ok(Self::with_parts(config, codec, store))
    }
}

impl<C: ImageCodec> Grisaille<C> {
    /// Assemble an instance from explicit parts.
    pub fn with_parts(config: Config, codec: C, store: Arc<dyn ContentStore>) -> Self {
        let processor = BatchProcessor::new(codec, store.clone(), &config);
        let assembler = Arc::new(ArchiveAssembler::from_config(store.clone(), &config));
        Self {
            config,
            store,
            processor,
            assembler,
        }
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The content store outputs are written to.
    pub fn store(&self) -> &Arc<dyn ContentStore> {
        &self.store
    }

    /// Turn uploads into jobs carrying the configured operation sequence.
    pub fn jobs_for(&self, uploads: Vec<Upload>) -> Vec<TransformJob> {
        uploads
            .into_iter()
            .map(|upload| {
                TransformJob::new(
                    upload.name,
                    upload.bytes,
                    self.config.transform.operations.clone(),
                )
            })
            .collect()
    }

    /// Process a batch of uploads and store every successful output.
    pub async fn submit(&self, uploads: Vec<Upload>) -> BatchReport {
        self.submit_with_cancel(uploads, &CancelFlag::new()).await
    }

    /// Like [`submit`](Self::submit), stopping scheduling once `cancel` is raised.
    pub async fn submit_with_cancel(&self, uploads: Vec<Upload>, cancel: &CancelFlag) -> BatchReport {
        let jobs = self.jobs_for(uploads);
        self.processor.process_batch_with_cancel(jobs, cancel).await
    }

    /// Bundle previously stored outputs into one archive and return its bytes.
    pub async fn download<I, S>(&self, names: I) -> Result<Vec<u8>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ArchiveRequest::new(names);
        let assembler = self.assembler.clone();
        let bytes = tokio::task::spawn_blocking(move || assembler.build_archive(&request))
            .await
            .map_err(|e| ArchiveError::Worker(e.to_string()))??;
        Ok(bytes)
    }

    /// Bundle previously stored outputs into an archive file at `dest`.
    pub async fn export<I, S>(&self, names: I, dest: impl Into<PathBuf>) -> Result<ArchiveSummary>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let request = ArchiveRequest::new(names);
        let dest = dest.into();
        let assembler = self.assembler.clone();
        let summary = tokio::task::spawn_blocking(move || assembler.export_archive(&request, &dest))
            .await
            .map_err(|e| ArchiveError::Worker(e.to_string()))??;
        Ok(summary)
    }
}
