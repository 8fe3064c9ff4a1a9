//! Error types for the Grisaille pipeline.
//!
//! Per-job errors ([`JobError`]) never cross the batch boundary: the processor
//! turns them into failed [`JobResult`](crate::types::JobResult)s. Archive
//! errors ([`ArchiveError`]) abort the whole archive build.

use thiserror::Error;

use crate::types::FailureKind;

/// Top-level error type for Grisaille operations.
#[derive(Error, Debug)]
pub enum GrisailleError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Archive assembly errors
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    /// Content store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Errors raised by an [`ImageCodec`](crate::pipeline::ImageCodec).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("{0}")]
    Decode(String),

    #[error("{0}")]
    Operation(String),

    #[error("{0}")]
    Encode(String),
}

/// Failure of a single transform job.
#[derive(Error, Debug)]
pub enum JobError {
    /// The job itself is malformed (empty name, empty bytes, unsafe name, too large)
    #[error("Invalid input {name:?}: {message}")]
    InvalidInput { name: String, message: String },

    /// Bytes are not a decodable image
    #[error("Decode error for {name:?}: {message}")]
    Decode { name: String, message: String },

    /// An operation had invalid parameters or failed to apply
    #[error("Operation {operation} failed for {name:?}: {message}")]
    Operation {
        name: String,
        operation: String,
        message: String,
    },

    /// Re-encoding the transformed raster failed
    #[error("Encode error for {name:?}: {message}")]
    Encode { name: String, message: String },

    /// Persisting the encoded output failed
    #[error("Storage write failed for {name:?}: {source}")]
    StorageWrite {
        name: String,
        #[source]
        source: StoreError,
    },

    /// The batch was cancelled before this job was scheduled
    #[error("Cancelled before {name:?} was scheduled")]
    Cancelled { name: String },

    /// The worker running the job died
    #[error("Worker failed for {name:?}: {message}")]
    Worker { name: String, message: String },
}

impl JobError {
    /// Machine-readable category used in the batch report.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::InvalidInput { .. } => FailureKind::InvalidInput,
            Self::Decode { .. } => FailureKind::Decode,
            Self::Operation { .. } => FailureKind::Operation,
            Self::Encode { .. } => FailureKind::Encode,
            Self::StorageWrite { .. } => FailureKind::StorageWrite,
            Self::Cancelled { .. } => FailureKind::Cancelled,
            Self::Worker { .. } => FailureKind::Worker,
        }
    }
}

/// Content store errors.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Key cannot be used as a single file name
    #[error("Invalid store key {0:?}")]
    InvalidKey(String),

    /// Nothing is stored under the key
    #[error("Not found: {0}")]
    NotFound(String),

    /// Underlying I/O failure
    #[error("IO error for {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Archive assembly errors. Any of these discards the archive being built.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// A requested output name has no stored image
    #[error("Missing archive entry: {name}")]
    MissingEntry { name: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The blocking assembly task died
    #[error("Archive worker failed: {0}")]
    Worker(String),
}

/// Convenience type alias for Grisaille results.
pub type Result<T> = std::result::Result<T, GrisailleError>;
