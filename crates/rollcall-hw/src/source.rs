//! Frame sources: a live camera pull loop or a single submitted frame.

use crate::camera::{payload, Camera, CameraError};
use crate::frame::{Frame, FrameError};
use std::io;
use std::time::Duration;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;

/// A live device that delivers nothing for this long is treated as gone.
pub const DEQUEUE_TIMEOUT: Duration = Duration::from_secs(5);

/// Produces frames until the stream ends.
pub trait FrameSource: Send {
    /// Next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Frame>;

    /// Why the stream ended, if it ended on a device error.
    fn take_error(&mut self) -> Option<CameraError> {
        None
    }
}

/// Blocking pull loop over a V4L2 device.
///
/// A device error or a stall longer than [`DEQUEUE_TIMEOUT`] ends the stream;
/// a single undecodable buffer does not.
pub struct LiveCamera {
    camera: Camera,
    stream: MmapStream<'static>,
    warmup: usize,
    failure: Option<CameraError>,
}

impl LiveCamera {
    /// Open `device_path` and start streaming. The first `warmup` frames are
    /// discarded.
    pub fn open(device_path: &str, warmup: usize) -> Result<Self, CameraError> {
        let camera = Camera::open(device_path)?;
        let mut stream = camera.stream()?;
        stream.set_timeout(DEQUEUE_TIMEOUT);
        Ok(Self {
            camera,
            stream,
            warmup,
            failure: None,
        })
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }
}

impl FrameSource for LiveCamera {
    fn next_frame(&mut self) -> Option<Frame> {
        if self.failure.is_some() {
            return None;
        }
        loop {
            let (buf, meta) = match self.stream.next() {
                Ok(next) => next,
                Err(e) => {
                    let failure = stream_error(&self.camera.device_path, e);
                    tracing::error!(device = %self.camera.device_path, error = %failure, "capture stream ended");
                    self.failure = Some(failure);
                    return None;
                }
            };

            if self.warmup > 0 {
                self.warmup -= 1;
                tracing::trace!(seq = meta.sequence, "discarding warmup frame");
                continue;
            }

            match self.camera.to_rgb(payload(buf, meta.bytesused)) {
                Ok(image) => return Some(Frame::new(image, meta.sequence)),
                Err(e) => {
                    // Truncated MJPEG buffers show up under load; skip them.
                    tracing::debug!(seq = meta.sequence, error = %e, "dropping corrupt frame");
                }
            }
        }
    }

    fn take_error(&mut self) -> Option<CameraError> {
        self.failure.take()
    }
}

fn stream_error(device_path: &str, e: io::Error) -> CameraError {
    match e.kind() {
        io::ErrorKind::TimedOut => CameraError::DeviceUnavailable(format!(
            "{device_path}: no frame within {}s",
            DEQUEUE_TIMEOUT.as_secs()
        )),
        _ => CameraError::CaptureFailed(e.to_string()),
    }
}

/// A caller-provided frame, yielded exactly once.
pub struct SubmittedFrame {
    frame: Option<Frame>,
}

impl SubmittedFrame {
    pub fn new(frame: Frame) -> Self {
        Self { frame: Some(frame) }
    }

    /// Decode an uploaded still.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        Frame::decode(bytes).map(Self::new)
    }
}

impl FrameSource for SubmittedFrame {
    fn next_frame(&mut self) -> Option<Frame> {
        self.frame.take()
    }
}
