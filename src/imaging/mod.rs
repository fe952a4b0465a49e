//! Image helpers used on the way into the store: preview thumbnails and
//! byte-budget compression.

pub mod compress;
pub mod thumbnail;

use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat};
use thiserror::Error;

pub use compress::compress;
pub use thumbnail::ThumbnailDeriver;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("failed to decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode image: {0}")]
    Encode(#[source] image::ImageError),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error("unsupported image format: {0}")]
    Unsupported(String),
    #[error("cannot compress image under {budget} bytes (smallest attempt was {smallest} bytes); supply a smaller source image")]
    BudgetUnsatisfiable { budget: u64, smallest: u64 },
}

/// An in-memory image file: what collaborators hand in and get back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ImageFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, taking the MIME type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "image".to_string());
        Ok(Self::new(name, mime_for_path(path), bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

pub fn mime_for_path(path: &Path) -> String {
    ImageFormat::from_path(path)
        .map(|f| f.to_mime_type().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string())
}

/// Dimensions that fit inside a `max_edge` square, keeping the aspect ratio.
/// Images already inside the bound are returned as-is, never upscaled.
pub(crate) fn fit_within(width: u32, height: u32, max_edge: u32) -> Result<(u32, u32), ImagingError> {
    if width == 0 || height == 0 || max_edge == 0 {
        return Err(ImagingError::EmptyImage);
    }
    let longer = width.max(height);
    if longer <= max_edge {
        return Ok((width, height));
    }
    let scale = max_edge as f64 / longer as f64;
    Ok((scale_edge(width, scale), scale_edge(height, scale)))
}

pub(crate) fn scale_edge(edge: u32, scale: f64) -> u32 {
    ((edge as f64 * scale).round() as u32).max(1)
}

/// Encode as baseline JPEG, flattening any alpha channel.
pub(crate) fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>, ImagingError> {
    let rgb = img.to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, quality)
        .encode_image(&rgb)
        .map_err(ImagingError::Encode)?;
    Ok(out)
}

/// Map a `0.0..=1.0` quality factor onto the encoder's 1-100 scale.
pub(crate) fn quality_percent(factor: f32) -> u8 {
    (factor * 100.0).round().clamp(1.0, 100.0) as u8
}

#[cfg(test)]
pub(crate) mod test_images {
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb, RgbImage, Rgba};
    use std::io::Cursor;

    /// Deterministic high-entropy pixels that compress poorly.
    pub fn noise(width: u32, height: u32) -> RgbImage {
        ImageBuffer::from_fn(width, height, |x, y| {
            let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
            h ^= h >> 15;
            h = h.wrapping_mul(0x2C1B_3C6D);
            h ^= h >> 12;
            let [r, g, b, _] = h.to_le_bytes();
            Rgb([r, g, b])
        })
    }

    pub fn encode(img: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, format).unwrap();
        out.into_inner()
    }

    pub fn noisy_png(width: u32, height: u32) -> Vec<u8> {
        encode(DynamicImage::ImageRgb8(noise(width, height)), ImageFormat::Png)
    }

    pub fn pixel_png(r: u8, g: u8, b: u8) -> Vec<u8> {
        let img = ImageBuffer::from_pixel(1, 1, Rgba([r, g, b, 255]));
        encode(DynamicImage::ImageRgba8(img), ImageFormat::Png)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(400, 100, 200).unwrap(), (200, 50));
        assert_eq!(fit_within(100, 400, 200).unwrap(), (50, 200));
        assert_eq!(fit_within(50, 30, 200).unwrap(), (50, 30));
        assert_eq!(fit_within(5000, 1, 200).unwrap(), (200, 1));
        assert!(matches!(fit_within(0, 10, 200), Err(ImagingError::EmptyImage)));
    }

    #[test]
    fn test_quality_percent() {
        assert_eq!(quality_percent(0.8), 80);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(1.5), 100);
    }

    #[test]
    fn test_mime_for_path() {
        assert_eq!(mime_for_path(Path::new("a/b/photo.PNG")), "image/png");
        assert_eq!(mime_for_path(Path::new("photo.jpg")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "application/octet-stream");
    }
}
