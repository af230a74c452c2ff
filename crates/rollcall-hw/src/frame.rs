//! Frame type, YUYV/GREY to RGB conversion, dark detection and JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use std::time::Instant;

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A decoded RGB frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
    pub timestamp: Instant,
    /// Lens covered or scene unlit.
    pub is_dark: bool,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        let is_dark = is_dark_frame(&image, DARK_FRAME_THRESHOLD);
        Self {
            image,
            sequence,
            timestamp: Instant::now(),
            is_dark,
        }
    }

    /// Decode an encoded still (JPEG, PNG, …).
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes).map_err(FrameError::Decode)?;
        Ok(Self::new(image.to_rgb8(), 0))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Average luma (0.0–255.0).
    pub fn avg_brightness(&self) -> f32 {
        let pixels = (self.image.width() * self.image.height()) as usize;
        if pixels == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p) as f32).sum::<f32>() / pixels as f32
    }

    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, FrameError> {
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.clamp(1, 100))
            .encode_image(&self.image)
            .map_err(FrameError::Encode)?;
        Ok(out)
    }
}

/// BT.601 luma.
pub fn luma(pixel: &Rgb<u8>) -> u8 {
    let [r, g, b] = pixel.0;
    ((77 * r as u32 + 150 * g as u32 + 29 * b as u32) >> 8) as u8
}

/// Convert packed YUYV (4:2:2) to RGB with BT.601 limited-range coefficients.
///
/// Each 4 bytes [Y0, U, Y1, V] carry two pixels sharing chroma.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (u, v) = (chunk[1] as i32 - 128, chunk[3] as i32 - 128);
        for y in [chunk[0], chunk[2]] {
            let c = 298 * (y as i32 - 16);
            rgb.push(((c + 409 * v + 128) >> 8).clamp(0, 255) as u8);
            rgb.push(((c - 100 * u - 208 * v + 128) >> 8).clamp(0, 255) as u8);
            rgb.push(((c + 516 * u + 128) >> 8).clamp(0, 255) as u8);
        }
    }
    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Replicate 8-bit grey into three channels.
pub fn grey_to_rgb(grey: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height) as usize;
    if grey.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: grey.len(),
        });
    }
    Ok(RgbImage::from_fn(width, height, |x, y| {
        let v = grey[(y * width + x) as usize];
        Rgb([v, v, v])
    }))
}

/// True if more than `threshold_pct` of pixels have luma below 32.
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = (image.width() * image.height()) as usize;
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p) < 32).count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame could not be decoded: {0}")]
    Decode(ImageError),
    #[error("frame could not be encoded: {0}")]
    Encode(ImageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_white_and_black() {
        // 2x1: Y0=235 (white), Y1=16 (black), neutral chroma
        let rgb = yuyv_to_rgb(&[235, 128, 16, 128], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // High V pushes red up and green down.
        let rgb = yuyv_to_rgb(&[82, 90, 82, 240], 2, 1).unwrap();
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 200 && g < 40 && b < 40, "got {r},{g},{b}");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_grey_to_rgb() {
        let rgb = grey_to_rgb(&[10, 200], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
        assert!(grey_to_rgb(&[1], 2, 1).is_err());
    }

    #[test]
    fn test_dark_frames() {
        assert!(is_dark_frame(&RgbImage::new(10, 10), DARK_FRAME_THRESHOLD));
        assert!(is_dark_frame(&RgbImage::new(0, 0), DARK_FRAME_THRESHOLD));
        assert!(!is_dark_frame(
            &RgbImage::from_pixel(10, 10, Rgb([128, 128, 128])),
            DARK_FRAME_THRESHOLD
        ));

        // 94% dark, 6% bright → not dark
        let mut image = RgbImage::new(100, 1);
        for x in 94..100 {
            image.put_pixel(x, 0, Rgb([200, 200, 200]));
        }
        assert!(!is_dark_frame(&image, DARK_FRAME_THRESHOLD));
    }

    #[test]
    fn test_jpeg_encode_decodes_back() {
        let frame = Frame::new(RgbImage::from_pixel(32, 16, Rgb([120, 60, 30])), 7);
        let jpeg = frame.encode_jpeg(90).unwrap();
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = Frame::decode(&jpeg).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
        assert!((decoded.avg_brightness() - frame.avg_brightness()).abs() < 5.0);
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(Frame::decode(b"nope"), Err(FrameError::Decode(_))));
    }
}
