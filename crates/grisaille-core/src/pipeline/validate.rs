//! Input validation before decoding.

use crate::config::LimitsConfig;
use crate::error::JobError;
use crate::store::check_key;

use super::job::TransformJob;

/// Cheap checks run on each job before any decoding happens.
pub struct Validator {
    limits: LimitsConfig,
}

impl Validator {
    /// Create a new validator with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self { limits }
    }

    /// Checks:
    /// - source name is non-empty and usable as a store key
    /// - bytes are non-empty and within the size limit
    pub fn validate(&self, job: &TransformJob) -> Result<(), JobError> {
        let name = job.source_name();
        let invalid = |message: String| JobError::InvalidInput {
            name: name.to_string(),
            message,
        };

        if name.is_empty() {
            return Err(invalid("source name is empty".to_string()));
        }
        check_key(name).map_err(|e| invalid(e.to_string()))?;

        let size = job.raw_bytes().len() as u64;
        if size == 0 {
            return Err(invalid("upload is empty".to_string()));
        }
        let max_bytes = self.limits.max_file_size_bytes();
        if size > max_bytes {
            return Err(invalid(format!(
                "upload is {} bytes, limit is {}MB",
                size, self.limits.max_file_size_mb
            )));
        }

        Ok(())
    }
}

const SIGNATURES: &[(usize, &[u8])] = &[
    (0, &[0xFF, 0xD8, 0xFF]),       // JPEG
    (0, &[0x89, b'P', b'N', b'G']), // PNG
    (0, b"GIF8"),                   // GIF
    (0, b"BM"),                     // BMP
    (0, &[b'I', b'I', 0x2A, 0x00]), // TIFF little-endian
    (0, &[b'M', b'M', 0x00, 0x2A]), // TIFF big-endian
    (0, &[0x00, 0x00, 0x01, 0x00]), // ICO
    (4, b"ftyp"),                   // HEIC/HEIF/AVIF
];

/// Check the header bytes against known image signatures.
pub fn looks_like_image(bytes: &[u8]) -> bool {
    if bytes.len() < 4 {
        return false;
    }

    // WebP: RIFF....WEBP
    if bytes.starts_with(b"RIFF") {
        return bytes.len() < 12 || &bytes[8..12] == b"WEBP";
    }

    SIGNATURES.iter().any(|(offset, magic)| {
        bytes
            .get(*offset..offset + magic.len())
            .is_some_and(|window| window == *magic)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(name: &str, bytes: Vec<u8>) -> TransformJob {
        TransformJob::new(name, bytes, vec![])
    }

    #[test]
    fn test_magic_bytes_known_formats() {
        assert!(looks_like_image(&[0xFF, 0xD8, 0xFF, 0xE0, 0, 0]));
        assert!(looks_like_image(&[0x89, b'P', b'N', b'G', 0x0D, 0x0A]));
        assert!(looks_like_image(b"RIFF\0\0\0\0WEBP"));
        assert!(looks_like_image(b"GIF89a"));
        assert!(looks_like_image(&[b'I', b'I', 0x2A, 0x00, 0, 0]));
        assert!(looks_like_image(&[0, 0, 0, 0x18, b'f', b't', b'y', b'p', b'a', b'v']));
    }

    #[test]
    fn test_magic_bytes_invalid() {
        assert!(!looks_like_image(&[0x00; 12]));
        assert!(!looks_like_image(b"RIFF\0\0\0\0WAVE"));
        assert!(!looks_like_image(&[b'I', b'I', 0x00, 0x00]));
        assert!(!looks_like_image(&b"BM"[..1]));
    }

    #[test]
    fn test_validator_rejects_empty_name_and_bytes() {
        let validator = Validator::new(LimitsConfig::default());
        assert!(matches!(
            validator.validate(&job("", vec![1])),
            Err(JobError::InvalidInput { .. })
        ));
        assert!(matches!(
            validator.validate(&job("a.png", vec![])),
            Err(JobError::InvalidInput { .. })
        ));
        assert!(validator.validate(&job("a.png", vec![1])).is_ok());
    }

    #[test]
    fn test_validator_rejects_path_like_names() {
        let validator = Validator::new(LimitsConfig::default());
        for name in ["../etc/passwd", "dir/a.png", "..", "a\\b.png"] {
            assert!(
                validator.validate(&job(name, vec![1])).is_err(),
                "{name} should be rejected"
            );
        }
    }

    #[test]
    fn test_validator_rejects_oversized_upload() {
        let validator = Validator::new(LimitsConfig {
            max_file_size_mb: 1,
            max_image_dimension: 100,
        });
        let err = validator
            .validate(&job("big.png", vec![0; 1024 * 1024 + 1]))
            .unwrap_err();
        assert!(err.to_string().contains("limit"));
    }

    #[test]
    fn test_validator_accepts_upload_under_huge_limit() {
        let validator = Validator::new(LimitsConfig {
            max_file_size_mb: 17_592_186_044_416,
            max_image_dimension: 100,
        });
        assert!(validator.validate(&job("a.png", vec![1; 64])).is_ok());
    }
}
