//! rollcall-hw: camera capture and frame sources.
//!
//! Provides V4L2-based RGB capture and the [`FrameSource`] abstraction the
//! daemon's capture loop consumes.

pub mod camera;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, DeviceInfo, PixelFormat};
pub use frame::{Frame, FrameError};
pub use source::{FrameSource, LiveCamera, SubmittedFrame};
