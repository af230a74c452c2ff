//! Synthetic detector and encoder for tests.
//!
//! Every solid-coloured patch on a black background is one "face"; its
//! descriptor is the patch colour scaled to [0, 1]. PNG round-trips are
//! lossless, so enrolled photos re-encode to identical descriptors.

use crate::analyzer::{Analyzer, AnalyzerError, FaceDetector, FaceEncoder};
use crate::types::{BoundingBox, Descriptor};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

pub const RED: [u8; 3] = [255, 0, 0];
pub const GREEN: [u8; 3] = [0, 255, 0];
pub const BLUE: [u8; 3] = [0, 0, 255];
pub const YELLOW: [u8; 3] = [255, 255, 0];

const CANVAS_SIZE: u32 = 64;
const MARKER_SIZE: u32 = 8;
const BACKGROUND_CUTOFF: u8 = 16;

pub struct MarkerDetector;

impl FaceDetector for MarkerDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzerError> {
        // (colour, min_x, min_y, max_x, max_y) in first-seen order
        let mut markers: Vec<([u8; 3], u32, u32, u32, u32)> = Vec::new();

        for (x, y, pixel) in image.enumerate_pixels() {
            if pixel.0.iter().all(|&c| c < BACKGROUND_CUTOFF) {
                continue;
            }
            match markers.iter_mut().find(|m| m.0 == pixel.0) {
                Some(m) => {
                    m.1 = m.1.min(x);
                    m.2 = m.2.min(y);
                    m.3 = m.3.max(x);
                    m.4 = m.4.max(y);
                }
                None => markers.push((pixel.0, x, y, x, y)),
            }
        }

        Ok(markers
            .into_iter()
            .map(|(_, x0, y0, x1, y1)| BoundingBox {
                x: x0 as f32,
                y: y0 as f32,
                width: (x1 - x0 + 1) as f32,
                height: (y1 - y0 + 1) as f32,
                confidence: 1.0,
                landmarks: None,
            })
            .collect())
    }
}

pub struct MarkerEncoder;

impl FaceEncoder for MarkerEncoder {
    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, AnalyzerError> {
        let (cx, cy) = face.center();
        let x = (cx.floor() as u32).min(image.width().saturating_sub(1));
        let y = (cy.floor() as u32).min(image.height().saturating_sub(1));
        let Rgb([r, g, b]) = *image.get_pixel(x, y);
        Ok(Descriptor::new(vec![
            r as f32 / 255.0,
            g as f32 / 255.0,
            b as f32 / 255.0,
        ]))
    }
}

pub fn marker_analyzer() -> Analyzer {
    Analyzer::new(Box::new(MarkerDetector), Box::new(MarkerEncoder))
}

/// Black 64×64 canvas with an 8×8 patch of each colour at (x, y).
pub fn marker_image(markers: &[([u8; 3], u32, u32)]) -> RgbImage {
    let mut image = RgbImage::new(CANVAS_SIZE, CANVAS_SIZE);
    for &(colour, x0, y0) in markers {
        for y in y0..(y0 + MARKER_SIZE).min(CANVAS_SIZE) {
            for x in x0..(x0 + MARKER_SIZE).min(CANVAS_SIZE) {
                image.put_pixel(x, y, Rgb(colour));
            }
        }
    }
    image
}

/// [`marker_image`] encoded as PNG.
pub fn marker_png(markers: &[([u8; 3], u32, u32)]) -> Vec<u8> {
    let mut buf = Cursor::new(Vec::new());
    marker_image(markers)
        .write_to(&mut buf, ImageFormat::Png)
        .expect("PNG encoding into memory cannot fail");
    buf.into_inner()
}

/// One centred marker: the typical enrollment photo.
pub fn portrait_png(colour: [u8; 3]) -> Vec<u8> {
    marker_png(&[(colour, 28, 28)])
}
