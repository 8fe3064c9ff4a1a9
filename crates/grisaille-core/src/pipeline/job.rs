//! Transform jobs: one upload plus the ordered operations to apply to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single image transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// Resize to exactly `width` x `height`, cropping to preserve aspect ratio
    Resize { width: u32, height: u32 },
    /// Convert to grayscale
    Grayscale,
    /// Scale contrast; 1.0 leaves the image unchanged
    AdjustContrast { factor: f32 },
}

impl Operation {
    /// The operation sequence applied to uploads unless configured otherwise.
    pub fn default_sequence() -> Vec<Operation> {
        vec![
            Operation::Resize {
                width: 500,
                height: 500,
            },
            Operation::Grayscale,
        ]
    }

    /// Check the operation's parameters.
    ///
    /// `max_dimension` bounds resize targets so a single job cannot allocate
    /// an arbitrarily large raster.
    pub fn check(&self, max_dimension: u32) -> Result<(), String> {
        match *self {
            Operation::Resize { width, height } => {
                if width == 0 || height == 0 {
                    return Err(format!(
                        "resize dimensions must be positive, got {width}x{height}"
                    ));
                }
                if width > max_dimension || height > max_dimension {
                    return Err(format!(
                        "resize target {width}x{height} exceeds max dimension {max_dimension}"
                    ));
                }
                Ok(())
            }
            Operation::Grayscale => Ok(()),
            Operation::AdjustContrast { factor } => {
                if !factor.is_finite() || factor < 0.0 {
                    return Err(format!(
                        "contrast factor must be a non-negative number, got {factor}"
                    ));
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Resize { width, height } => write!(f, "resize({width}x{height})"),
            Operation::Grayscale => write!(f, "grayscale"),
            Operation::AdjustContrast { factor } => write!(f, "contrast({factor})"),
        }
    }
}

/// One image and the operations to apply to it, in order.
///
/// Construction never fails. Validation (name, bytes, decodability) happens in
/// the worker that runs the job, so one bad upload cannot hold up the batch.
#[derive(Debug, Clone, PartialEq)]
pub struct TransformJob {
    source_name: String,
    raw_bytes: Vec<u8>,
    operations: Vec<Operation>,
}

impl TransformJob {
    pub fn new(
        source_name: impl Into<String>,
        raw_bytes: impl Into<Vec<u8>>,
        operations: Vec<Operation>,
    ) -> Self {
        Self {
            source_name: source_name.into(),
            raw_bytes: raw_bytes.into(),
            operations,
        }
    }

    /// Name of the upload, also used verbatim as the output name.
    pub fn source_name(&self) -> &str {
        &self.source_name
    }

    pub fn raw_bytes(&self) -> &[u8] {
        &self.raw_bytes
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }
}
