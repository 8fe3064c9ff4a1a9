//! Core data types exchanged with callers of the pipeline.
//!
//! These are the structured, inspectable outcomes the pipeline produces. Turning
//! them into user-facing responses is left to whoever drives the pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::JobError;

/// A raw upload: a file name plus its undecoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upload {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

/// Category of a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidInput,
    Decode,
    Operation,
    Encode,
    StorageWrite,
    Cancelled,
    Worker,
}

/// Terminal outcome of one transform job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobOutcome {
    /// The transformed image was written to the content store.
    Success {
        /// Key the image is stored under (equal to the source name)
        output_name: String,
        /// Output width in pixels
        width: u32,
        /// Output height in pixels
        height: u32,
        /// Size of the stored bytes
        size_bytes: u64,
        /// BLAKE3 hash of the stored bytes
        content_hash: String,
    },
    /// The job failed; nothing was stored for it.
    Failure { kind: FailureKind, reason: String },
}

/// Result of one job. Produced exactly once per submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub source_name: String,
    #[serde(flatten)]
    pub outcome: JobOutcome,
}

impl JobResult {
    pub(crate) fn failed(source_name: impl Into<String>, error: &JobError) -> Self {
        Self {
            source_name: source_name.into(),
            outcome: JobOutcome::Failure {
                kind: error.kind(),
                reason: error.to_string(),
            },
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.outcome, JobOutcome::Success { .. })
    }

    /// Output name for successful jobs.
    pub fn output_name(&self) -> Option<&str> {
        match &self.outcome {
            JobOutcome::Success { output_name, .. } => Some(output_name),
            JobOutcome::Failure { .. } => None,
        }
    }

    /// Failure category for failed jobs.
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match &self.outcome {
            JobOutcome::Success { .. } => None,
            JobOutcome::Failure { kind, .. } => Some(*kind),
        }
    }
}

/// Aggregate statistics for a batch run.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchStats {
    /// Jobs that stored an output
    pub succeeded: usize,

    /// Jobs that failed
    pub failed: usize,

    /// Wall-clock time for the whole batch in seconds
    pub total_seconds: f64,

    /// Completed jobs per second
    pub images_per_second: f64,
}

/// Report for a finished batch: one result per submitted job.
///
/// Results are kept in submission order.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct BatchReport {
    pub results: Vec<JobResult>,
    pub stats: BatchStats,
}

impl BatchReport {
    pub(crate) fn new(results: Vec<JobResult>, elapsed_secs: f64) -> Self {
        let succeeded = results.iter().filter(|r| r.is_success()).count();
        let failed = results.len() - succeeded;
        let images_per_second = if elapsed_secs > 0.0 {
            results.len() as f64 / elapsed_secs
        } else {
            0.0
        };
        Self {
            results,
            stats: BatchStats {
                succeeded,
                failed,
                total_seconds: elapsed_secs,
                images_per_second,
            },
        }
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Results for successful jobs.
    pub fn successes(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| r.is_success())
    }

    /// Results for failed jobs.
    pub fn failures(&self) -> impl Iterator<Item = &JobResult> {
        self.results.iter().filter(|r| !r.is_success())
    }

    /// Output names of every successful job, deduplicated and sorted.
    pub fn output_names(&self) -> BTreeSet<String> {
        self.successes()
            .filter_map(|r| r.output_name().map(str::to_string))
            .collect()
    }

    /// First result recorded for a source name.
    pub fn get(&self, source_name: &str) -> Option<&JobResult> {
        self.results.iter().find(|r| r.source_name == source_name)
    }
}

/// The set of stored outputs to bundle into one archive.
///
/// Set semantics: duplicate names collapse and iteration is sorted by name,
/// which fixes the entry order inside the archive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveRequest {
    output_names: BTreeSet<String>,
}

impl ArchiveRequest {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            output_names: names.into_iter().map(Into::into).collect(),
        }
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.output_names.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.output_names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.output_names.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for ArchiveRequest {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}

/// Summary of an archive written to disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArchiveSummary {
    /// Number of entries in the archive
    pub entries: usize,
    /// Total uncompressed size of all entries
    pub uncompressed_bytes: u64,
    /// Size of the compressed archive
    pub archive_bytes: u64,
}
