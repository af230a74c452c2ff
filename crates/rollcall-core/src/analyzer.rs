//! Detection and encoding capabilities.
//!
//! The gallery and frame processor only see these traits; the ONNX models
//! in [`crate::detector`] and [`crate::recognizer`] are one implementation.

use crate::detector::ScrfdDetector;
use crate::recognizer::ArcFaceEncoder;
use crate::types::{BoundingBox, DetectedFace, Descriptor};
use image::RgbImage;
use std::path::{Path, PathBuf};
use thiserror::Error;

const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0}; download from insightface and place in the model directory")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Finds face regions in an RGB frame.
pub trait FaceDetector: Send {
    /// Regions in detection order (highest confidence first for ONNX models).
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzerError>;
}

/// Reduces one detected face to a descriptor.
pub trait FaceEncoder: Send {
    fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, AnalyzerError>;
}

/// A detector paired with the encoder whose descriptors the gallery stores.
pub struct Analyzer {
    detector: Box<dyn FaceDetector>,
    encoder: Box<dyn FaceEncoder>,
}

impl Analyzer {
    pub fn new(detector: Box<dyn FaceDetector>, encoder: Box<dyn FaceEncoder>) -> Self {
        Self { detector, encoder }
    }

    /// Load the SCRFD detector and ArcFace encoder from `model_dir`.
    pub fn load_onnx(model_dir: &Path) -> Result<Self, AnalyzerError> {
        let detector = ScrfdDetector::load(&model_dir.join(SCRFD_MODEL_FILE))?;
        let encoder = ArcFaceEncoder::load(&model_dir.join(ARCFACE_MODEL_FILE))?;
        Ok(Self::new(Box::new(detector), Box::new(encoder)))
    }

    pub fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, AnalyzerError> {
        self.detector.detect(image)
    }

    pub fn encode(&mut self, image: &RgbImage, face: &BoundingBox) -> Result<Descriptor, AnalyzerError> {
        self.encoder.encode(image, face)
    }

    /// Detect every face, then encode each one, preserving detection order.
    pub fn analyze(&mut self, image: &RgbImage) -> Result<Vec<DetectedFace>, AnalyzerError> {
        let regions = self.detector.detect(image)?;
        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            let descriptor = self.encoder.encode(image, &region)?;
            faces.push(DetectedFace { region, descriptor });
        }
        Ok(faces)
    }
}

/// Per-user data root: `$XDG_DATA_HOME/rollcall`, else `~/.local/share/rollcall`.
pub fn data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall")
}

/// Default model directory: `<data_dir>/models`.
pub fn default_model_dir() -> PathBuf {
    data_dir().join("models")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{marker_analyzer, marker_image, RED, YELLOW};

    #[test]
    fn test_analyze_keeps_detection_order() {
        let mut analyzer = marker_analyzer();
        let image = marker_image(&[(YELLOW, 4, 4), (RED, 40, 40)]);
        let faces = analyzer.analyze(&image).unwrap();
        assert_eq!(faces.len(), 2);
        assert_eq!(faces[0].descriptor.values, vec![1.0, 1.0, 0.0]);
        assert_eq!(faces[1].descriptor.values, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_model_dir_lives_under_data_dir() {
        assert!(data_dir().ends_with("rollcall"));
        assert_eq!(default_model_dir(), data_dir().join("models"));
    }

    #[test]
    fn test_load_onnx_missing_models() {
        let dir = tempfile::tempdir().unwrap();
        let result = Analyzer::load_onnx(dir.path());
        assert!(matches!(result, Err(AnalyzerError::ModelNotFound(_))));
    }
}
