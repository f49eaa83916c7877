// src/core/frame.rs — Frame → inline JPEG payload

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::infra::errors::ActionLensError;
use crate::provider::InlineImage;

/// Size that fits inside `max_dimension` on its longest edge, aspect kept.
pub fn fit_within(width: u32, height: u32, max_dimension: u32) -> (u32, u32) {
    let longest = width.max(height);
    if max_dimension == 0 || longest <= max_dimension {
        return (width, height);
    }
    let scale = max_dimension as f64 / longest as f64;
    let w = ((width as f64 * scale).round() as u32).max(1);
    let h = ((height as f64 * scale).round() as u32).max(1);
    (w, h)
}

/// Encode packed RGB24 pixels as JPEG bytes, downscaling first if needed.
pub fn encode_jpeg(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    max_dimension: u32,
    quality: u8,
) -> Result<Vec<u8>, ActionLensError> {
    let expected = width as usize * height as usize * 3;
    let actual = pixels.len();
    let img = RgbImage::from_raw(width, height, pixels).ok_or_else(|| {
        ActionLensError::InvalidInput(format!(
            "frame buffer is {actual} bytes, expected {expected} for {width}x{height}"
        ))
    })?;

    let (w, h) = fit_within(width, height, max_dimension);
    let img = if (w, h) != (width, height) {
        imageops::resize(&img, w, h, FilterType::Triangle)
    } else {
        img
    };

    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100))
        .encode_image(&img)
        .map_err(|e| anyhow::anyhow!("JPEG encoding failed: {e}"))?;
    Ok(buf)
}

/// Encode a frame as a base64 JPEG ready for a vision request.
pub fn to_inline_image(
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    max_dimension: u32,
    quality: u8,
) -> Result<InlineImage, ActionLensError> {
    let jpeg = encode_jpeg(pixels, width, height, max_dimension, quality)?;
    Ok(InlineImage::jpeg(STANDARD.encode(jpeg)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(640, 480, 1024), (640, 480));
        assert_eq!(fit_within(1920, 1080, 1024), (1024, 576));
        assert_eq!(fit_within(1080, 1920, 960), (540, 960));
        assert_eq!(fit_within(4000, 1, 100), (100, 1));
        assert_eq!(fit_within(300, 200, 0), (300, 200));
    }

    #[test]
    fn test_encode_produces_jpeg() {
        let pixels = [200u8, 10, 10].repeat(16 * 8);
        let jpeg = encode_jpeg(pixels, 16, 8, 1024, 80).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn test_encode_downscales() {
        let pixels = vec![128u8; 64 * 32 * 3];
        let jpeg = encode_jpeg(pixels, 64, 32, 16, 80).unwrap();
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (16, 8));
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let err = encode_jpeg(vec![0u8; 10], 4, 4, 1024, 80).unwrap_err();
        assert!(matches!(err, ActionLensError::InvalidInput(_)));
    }

    #[test]
    fn test_inline_image_is_base64_jpeg() {
        let pixels = vec![0u8; 4 * 4 * 3];
        let image = to_inline_image(pixels, 4, 4, 1024, 80).unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert!(image.base64_data.starts_with("/9j/"));
    }
}
