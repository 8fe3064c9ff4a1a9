//! Image codec seam: decode, transform and re-encode rasters.
//!
//! The pipeline only talks to [`ImageCodec`]. [`DynamicImageCodec`] is the
//! default implementation on top of the `image` crate.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::io::Cursor;

use crate::error::CodecError;

use super::job::Operation;
use super::validate::looks_like_image;

/// Decode/transform/encode capability consumed by the batch processor.
///
/// Transform methods take the raster by value and hand it back, so each
/// operation has exclusive ownership of the pixels it mutates.
pub trait ImageCodec: Send + Sync + 'static {
    /// In-memory decoded image.
    type Raster: Send + 'static;

    fn decode(&self, bytes: &[u8]) -> Result<Self::Raster, CodecError>;

    /// Width and height in pixels.
    fn dimensions(&self, raster: &Self::Raster) -> (u32, u32);

    fn resize(
        &self,
        raster: Self::Raster,
        width: u32,
        height: u32,
    ) -> Result<Self::Raster, CodecError>;

    fn grayscale(&self, raster: Self::Raster) -> Result<Self::Raster, CodecError>;

    fn adjust_contrast(&self, raster: Self::Raster, factor: f32)
        -> Result<Self::Raster, CodecError>;

    fn encode(&self, raster: &Self::Raster) -> Result<Vec<u8>, CodecError>;

    /// Apply one operation.
    fn apply(&self, raster: Self::Raster, op: &Operation) -> Result<Self::Raster, CodecError> {
        match *op {
            Operation::Resize { width, height } => self.resize(raster, width, height),
            Operation::Grayscale => self.grayscale(raster),
            Operation::AdjustContrast { factor } => self.adjust_contrast(raster, factor),
        }
    }
}

/// A decoded image together with the format it was decoded from.
///
/// Encoding writes back to the same format; there is no format conversion.
#[derive(Debug)]
pub struct DecodedImage {
    pub image: DynamicImage,
    pub format: ImageFormat,
}

/// [`ImageCodec`] backed by the `image` crate.
#[derive(Debug, Clone)]
pub struct DynamicImageCodec {
    max_dimension: u32,
}

impl Default for DynamicImageCodec {
    fn default() -> Self {
        Self::new(10000)
    }
}

impl DynamicImageCodec {
    /// Create a codec that refuses to decode images wider or taller than `max_dimension`.
    pub fn new(max_dimension: u32) -> Self {
        Self { max_dimension }
    }
}

impl ImageCodec for DynamicImageCodec {
    type Raster = DecodedImage;

    fn decode(&self, bytes: &[u8]) -> Result<DecodedImage, CodecError> {
        if !looks_like_image(bytes) {
            return Err(CodecError::Decode(
                "Unrecognized image format (invalid magic bytes)".to_string(),
            ));
        }

        let mut reader = image::ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| CodecError::Decode(format!("Cannot detect image format: {}", e)))?;
        let format = reader
            .format()
            .ok_or_else(|| CodecError::Decode("Cannot detect image format".to_string()))?;

        let mut limits = image::Limits::default();
        limits.max_image_width = Some(self.max_dimension);
        limits.max_image_height = Some(self.max_dimension);
        reader.limits(limits);

        let image = reader
            .decode()
            .map_err(|e| CodecError::Decode(e.to_string()))?;
        Ok(DecodedImage { image, format })
    }

    fn dimensions(&self, raster: &DecodedImage) -> (u32, u32) {
        raster.image.dimensions()
    }

    fn resize(
        &self,
        raster: DecodedImage,
        width: u32,
        height: u32,
    ) -> Result<DecodedImage, CodecError> {
        // Fill the target box and crop the overflow, keeping the aspect ratio.
        let image = raster
            .image
            .resize_to_fill(width, height, FilterType::Lanczos3);
        Ok(DecodedImage {
            image,
            format: raster.format,
        })
    }

    fn grayscale(&self, raster: DecodedImage) -> Result<DecodedImage, CodecError> {
        Ok(DecodedImage {
            image: raster.image.grayscale(),
            format: raster.format,
        })
    }

    fn adjust_contrast(
        &self,
        raster: DecodedImage,
        factor: f32,
    ) -> Result<DecodedImage, CodecError> {
        // `image` squares its percentage, so take the root to keep `factor` linear.
        let amount = (factor.sqrt() - 1.0) * 100.0;
        Ok(DecodedImage {
            image: raster.image.adjust_contrast(amount),
            format: raster.format,
        })
    }

    fn encode(&self, raster: &DecodedImage) -> Result<Vec<u8>, CodecError> {
        let mut buffer = Cursor::new(Vec::new());
        let result = match raster.format {
            // These encoders only take RGB(A) buffers.
            ImageFormat::Gif | ImageFormat::Ico => {
                DynamicImage::ImageRgba8(raster.image.to_rgba8()).write_to(&mut buffer, raster.format)
            }
            format => raster.image.write_to(&mut buffer, format),
        };
        result.map_err(|e| {
            CodecError::Encode(format!(
                "Cannot encode as {}: {}",
                format_to_string(raster.format),
                e
            ))
        })?;
        Ok(buffer.into_inner())
    }
}

/// Convert an ImageFormat to a string representation.
pub fn format_to_string(format: ImageFormat) -> String {
    match format {
        ImageFormat::Jpeg => "jpeg".to_string(),
        ImageFormat::Png => "png".to_string(),
        ImageFormat::WebP => "webp".to_string(),
        ImageFormat::Gif => "gif".to_string(),
        ImageFormat::Tiff => "tiff".to_string(),
        ImageFormat::Bmp => "bmp".to_string(),
        ImageFormat::Ico => "ico".to_string(),
        ImageFormat::Pnm => "pnm".to_string(),
        ImageFormat::Avif => "avif".to_string(),
        _ => "unknown".to_string(),
    }
}
