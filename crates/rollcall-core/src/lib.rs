//! rollcall-core: face gallery, frame recognition, and attendance ledger.
//!
//! Detection and encoding are pluggable ([`FaceDetector`], [`FaceEncoder`]);
//! the bundled implementations run SCRFD and ArcFace via ONNX Runtime.

pub mod alignment;
pub mod analyzer;
pub mod detector;
pub mod gallery;
pub mod ledger;
pub mod processor;
pub mod recognizer;
#[cfg(any(test, feature = "test-support"))]
pub mod testing;
pub mod types;

pub use analyzer::{data_dir, default_model_dir, Analyzer, AnalyzerError, FaceDetector, FaceEncoder};
pub use gallery::{EnrollError, EnrollMode, GalleryStore, IdentitySummary, LoadError, StoreError};
pub use ledger::{AttendanceEntry, AttendanceLedger, Presence, SessionSnapshot};
pub use processor::{FrameProcessor, FrameReport, ProcessError, Recognition};
pub use types::{BoundingBox, Descriptor, DetectedFace, Identity, MatchPolicy, MatchResult, UNKNOWN};
