//! Re-encode an image until it fits a byte budget.
//!
//! Order of attempts:
//! 1. Under budget already: returned untouched.
//! 2. Longer edge capped at `max_dimension`, then each rung of the quality
//!    ladder.
//! 3. Each rung of the scale ladder at `scale_quality`.
//!
//! PNG sources are re-encoded as JPEG. Other formats keep their type, but
//! only JPEG has a quality knob, so for them the quality ladder is a single
//! pass and the scale ladder does the work.

use std::io::Cursor;
use std::path::Path;

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use tracing::debug;

use super::{encode_jpeg, fit_within, quality_percent, scale_edge, ImageFile, ImagingError};
use crate::config::CompressionConfig;

pub fn compress(file: ImageFile, config: &CompressionConfig) -> Result<ImageFile, ImagingError> {
    let budget = config.target_bytes;
    if file.bytes.len() as u64 <= budget {
        return Ok(file);
    }

    let source_format = image::guess_format(&file.bytes)
        .ok()
        .or_else(|| ImageFormat::from_mime_type(&file.mime_type));
    let format = output_format(source_format, &file.mime_type)?;

    let decoded = image::load_from_memory(&file.bytes).map_err(ImagingError::Decode)?;
    let (width, height) = fit_within(decoded.width(), decoded.height(), config.max_dimension)?;
    let img = if (width, height) == (decoded.width(), decoded.height()) {
        decoded
    } else {
        decoded.resize_exact(width, height, FilterType::Lanczos3)
    };

    let mut smallest = u64::MAX;

    for &factor in &config.quality_ladder {
        let bytes = encode(&img, format, quality_percent(factor))?;
        smallest = smallest.min(bytes.len() as u64);
        if bytes.len() as u64 <= budget {
            debug!(quality = factor, bytes = bytes.len(), budget, "Compressed by quality");
            return Ok(finish(&file.name, format, bytes));
        }
        if format != ImageFormat::Jpeg {
            break;
        }
    }

    let quality = quality_percent(config.scale_quality);
    for &factor in &config.scale_ladder {
        let scale = factor as f64;
        let resized = img.resize_exact(
            scale_edge(width, scale),
            scale_edge(height, scale),
            FilterType::Triangle,
        );
        let bytes = encode(&resized, format, quality)?;
        smallest = smallest.min(bytes.len() as u64);
        if bytes.len() as u64 <= budget {
            debug!(scale = factor, bytes = bytes.len(), budget, "Compressed by scale");
            return Ok(finish(&file.name, format, bytes));
        }
    }

    Err(ImagingError::BudgetUnsatisfiable { budget, smallest })
}

fn output_format(source: Option<ImageFormat>, mime_type: &str) -> Result<ImageFormat, ImagingError> {
    match source {
        Some(ImageFormat::Png) | Some(ImageFormat::Jpeg) => Ok(ImageFormat::Jpeg),
        Some(format) if format.writing_enabled() => Ok(format),
        Some(format) => Err(ImagingError::Unsupported(format!("{:?}", format))),
        None => Err(ImagingError::Unsupported(mime_type.to_string())),
    }
}

fn encode(img: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>, ImagingError> {
    if format == ImageFormat::Jpeg {
        return encode_jpeg(img, quality);
    }
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, format).map_err(ImagingError::Encode)?;
    Ok(out.into_inner())
}

fn finish(name: &str, format: ImageFormat, bytes: Vec<u8>) -> ImageFile {
    let name = match format.extensions_str().first() {
        Some(ext) => Path::new(name).with_extension(ext).to_string_lossy().to_string(),
        None => name.to_string(),
    };
    ImageFile::new(name, format.to_mime_type(), bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::test_images;
    use image::GenericImageView;

    fn config(target_bytes: u64) -> CompressionConfig {
        CompressionConfig {
            target_bytes,
            ..CompressionConfig::default()
        }
    }

    fn png_file(bytes: Vec<u8>) -> ImageFile {
        ImageFile::new("render.png", "image/png", bytes)
    }

    #[test]
    fn test_under_budget_is_unchanged() {
        let bytes = test_images::noisy_png(64, 64);
        let file = png_file(bytes.clone());

        let out = compress(file.clone(), &config(bytes.len() as u64)).unwrap();
        assert_eq!(out, file);
    }

    #[test]
    fn test_png_becomes_jpeg_under_budget() {
        let bytes = test_images::noisy_png(256, 256);
        let budget = bytes.len() as u64 - 1;

        let out = compress(png_file(bytes), &config(budget)).unwrap();
        assert!(out.bytes.len() as u64 <= budget);
        assert_eq!(out.mime_type, "image/jpeg");
        assert_eq!(out.name, "render.jpg");
        assert_eq!(image::guess_format(&out.bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_falls_back_to_scaling() {
        let img = DynamicImage::ImageRgb8(test_images::noise(256, 256));
        let full_quality = encode_jpeg(&img, 90).unwrap();
        let budget = full_quality.len() as u64 / 2;
        let source = test_images::noisy_png(256, 256);

        let mut cfg = config(budget);
        cfg.quality_ladder = vec![0.9];
        let out = compress(png_file(source), &cfg).unwrap();

        assert!(out.bytes.len() as u64 <= budget);
        let (w, h) = image::load_from_memory(&out.bytes).unwrap().dimensions();
        assert!(w < 256 && h < 256);
        assert_eq!(w, h);
    }

    #[test]
    fn test_dimension_cap_applies_first() {
        let bytes = test_images::noisy_png(5000, 8);
        let mut cfg = config(bytes.len() as u64 - 1);
        cfg.max_dimension = 1000;

        let out = compress(png_file(bytes), &cfg).unwrap();
        let decoded = image::load_from_memory(&out.bytes).unwrap();
        assert_eq!(decoded.dimensions(), (1000, 2));
    }

    #[test]
    fn test_unsatisfiable_budget_errors() {
        let bytes = test_images::noisy_png(64, 64);

        let result = compress(png_file(bytes), &config(100));
        match result {
            Err(ImagingError::BudgetUnsatisfiable { budget, smallest }) => {
                assert_eq!(budget, 100);
                assert!(smallest > 100);
            }
            other => panic!("expected BudgetUnsatisfiable, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_bytes_are_unsupported() {
        let file = ImageFile::new("notes.bin", "application/octet-stream", vec![7; 64]);
        let result = compress(file, &config(10));
        assert!(matches!(result, Err(ImagingError::Unsupported(_))));
    }

    #[test]
    fn test_output_format_mapping() {
        assert_eq!(output_format(Some(ImageFormat::Png), "image/png").unwrap(), ImageFormat::Jpeg);
        assert_eq!(output_format(Some(ImageFormat::Jpeg), "image/jpeg").unwrap(), ImageFormat::Jpeg);
        assert_eq!(output_format(Some(ImageFormat::Bmp), "image/bmp").unwrap(), ImageFormat::Bmp);
    }
}
