use tracing::debug;

use super::{encode_jpeg, fit_within, quality_percent, ImagingError};
use crate::config::ThumbnailConfig;

/// Derives small JPEG previews for the gallery grid.
#[derive(Debug, Clone, Copy)]
pub struct ThumbnailDeriver {
    max_edge: u32,
    quality: u8,
}

impl ThumbnailDeriver {
    pub fn new(config: &ThumbnailConfig) -> Self {
        Self {
            max_edge: config.max_edge,
            quality: quality_percent(config.quality),
        }
    }

    /// Decode `bytes` and return a JPEG whose longer edge is at most
    /// `max_edge`.
    pub fn derive(&self, bytes: &[u8]) -> Result<Vec<u8>, ImagingError> {
        let img = image::load_from_memory(bytes).map_err(ImagingError::Decode)?;
        let (width, height) = fit_within(img.width(), img.height(), self.max_edge)?;

        let preview = if (width, height) == (img.width(), img.height()) {
            img
        } else {
            img.thumbnail_exact(width, height)
        };

        let encoded = encode_jpeg(&preview, self.quality)?;
        debug!(width, height, bytes = encoded.len(), "Derived thumbnail");
        Ok(encoded)
    }
}

impl Default for ThumbnailDeriver {
    fn default() -> Self {
        Self::new(&ThumbnailConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_images;
    use image::{DynamicImage, GenericImageView, ImageBuffer, ImageFormat, Rgba};

    fn decode(bytes: &[u8]) -> DynamicImage {
        image::load_from_memory(bytes).unwrap()
    }

    #[test]
    fn test_wide_image_scaled_to_bound() {
        let source = test_images::noisy_png(400, 100);
        let thumb = ThumbnailDeriver::default().derive(&source).unwrap();

        assert_eq!(image::guess_format(&thumb).unwrap(), ImageFormat::Jpeg);
        assert_eq!(decode(&thumb).dimensions(), (200, 50));
    }

    #[test]
    fn test_tall_image_scaled_to_bound() {
        let source = test_images::noisy_png(120, 600);
        let thumb = ThumbnailDeriver::default().derive(&source).unwrap();
        assert_eq!(decode(&thumb).dimensions(), (40, 200));
    }

    #[test]
    fn test_small_image_not_upscaled() {
        let thumb = ThumbnailDeriver::default().derive(&test_images::pixel_png(10, 20, 30)).unwrap();
        assert_eq!(decode(&thumb).dimensions(), (1, 1));
    }

    #[test]
    fn test_alpha_is_flattened() {
        let img = ImageBuffer::from_pixel(300, 300, Rgba([200u8, 10, 10, 128]));
        let source = test_images::encode(DynamicImage::ImageRgba8(img), ImageFormat::Png);

        let thumb = ThumbnailDeriver::default().derive(&source).unwrap();
        assert_eq!(decode(&thumb).dimensions(), (200, 200));
    }

    #[test]
    fn test_deterministic() {
        let source = test_images::noisy_png(320, 240);
        let deriver = ThumbnailDeriver::default();
        assert_eq!(deriver.derive(&source).unwrap(), deriver.derive(&source).unwrap());
    }

    #[test]
    fn test_undecodable_input_errors() {
        let result = ThumbnailDeriver::default().derive(b"definitely not an image");
        assert!(matches!(result, Err(ImagingError::Decode(_))));
    }

    #[test]
    fn test_custom_bound() {
        let deriver = ThumbnailDeriver::new(&ThumbnailConfig { max_edge: 64, quality: 0.5 });
        let thumb = deriver.derive(&test_images::noisy_png(256, 128)).unwrap();
        assert_eq!(decode(&thumb).dimensions(), (64, 32));
    }
}
