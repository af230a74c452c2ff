//! Per-frame recognition: detect → encode → match → mark present.

use crate::analyzer::{Analyzer, AnalyzerError};
use crate::gallery::{EnrollError, EnrollMode, GalleryStore, LoadError};
use crate::ledger::AttendanceLedger;
use crate::types::{BoundingBox, MatchResult};
use image::{ImageError, RgbImage};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("frame could not be decoded: {0}")]
    FrameDecode(#[from] ImageError),
    #[error("face analysis failed: {0}")]
    Analyzer(#[from] AnalyzerError),
}

/// One detected face and who it matched.
#[derive(Debug, Clone, Serialize)]
pub struct Recognition {
    pub region: BoundingBox,
    pub result: MatchResult,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameReport {
    /// In detection order.
    pub recognitions: Vec<Recognition>,
    /// At least one entry went from absent to present.
    pub attendance_updated: bool,
}

impl FrameReport {
    pub fn faces_detected(&self) -> usize {
        self.recognitions.len()
    }

    pub fn recognized(&self) -> impl Iterator<Item = &MatchResult> {
        self.recognitions.iter().map(|r| &r.result).filter(|r| r.is_known())
    }
}

/// Owns the analyzer; the only recognition write path into the ledger.
pub struct FrameProcessor {
    analyzer: Analyzer,
    gallery: Arc<GalleryStore>,
    ledger: Arc<AttendanceLedger>,
}

impl FrameProcessor {
    pub fn new(analyzer: Analyzer, gallery: Arc<GalleryStore>, ledger: Arc<AttendanceLedger>) -> Self {
        Self {
            analyzer,
            gallery,
            ledger,
        }
    }

    pub fn gallery(&self) -> &Arc<GalleryStore> {
        &self.gallery
    }

    pub fn ledger(&self) -> &Arc<AttendanceLedger> {
        &self.ledger
    }

    /// Recognize every face in `frame` and mark matched identities present.
    pub fn process(&mut self, frame: &RgbImage) -> Result<FrameReport, ProcessError> {
        let faces = self.analyzer.analyze(frame)?;

        let mut report = FrameReport::default();
        for face in faces {
            let result = self.gallery.match_descriptor(&face.descriptor);
            if let Some(name) = &result.identity {
                report.attendance_updated |= self.ledger.mark_present(name);
            }
            tracing::debug!(name = result.name(), confidence = result.confidence, "face matched");
            report.recognitions.push(Recognition {
                region: face.region,
                result,
            });
        }
        Ok(report)
    }

    /// [`process`](Self::process) for an encoded (JPEG/PNG/…) frame.
    pub fn process_encoded(&mut self, bytes: &[u8]) -> Result<FrameReport, ProcessError> {
        let frame = image::load_from_memory(bytes)?.to_rgb8();
        self.process(&frame)
    }

    pub fn enroll(&mut self, name: &str, photo: &[u8], mode: EnrollMode) -> Result<(), EnrollError> {
        self.gallery.enroll(&mut self.analyzer, name, photo, mode)
    }

    pub fn reload_gallery(&mut self) -> Result<usize, LoadError> {
        self.gallery.reload(&mut self.analyzer)
    }
}
