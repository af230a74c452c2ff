//! V4L2 camera capture via the `v4l` crate.

use crate::frame::{self, Frame, FrameError};
use image::RgbImage;
use std::path::Path;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

/// Capture buffers queued with the driver.
const BUFFER_COUNT: u32 = 4;

const EBUSY: i32 = 16;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera unavailable: {0}")]
    DeviceUnavailable(String),
    #[error("device busy: {0}")]
    DeviceBusy(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Motion JPEG; each buffer is a complete JPEG.
    Mjpeg,
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    const PREFERRED: [PixelFormat; 3] = [PixelFormat::Mjpeg, PixelFormat::Yuyv, PixelFormat::Grey];

    pub fn fourcc(self) -> FourCC {
        match self {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv => FourCC::new(b"YUYV"),
            PixelFormat::Grey => FourCC::new(b"GREY"),
        }
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PREFERRED.into_iter().find(|f| f.fourcc() == fourcc)
    }
}

/// V4L2 camera device handle.
pub struct Camera {
    device: Device,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pixel_format: PixelFormat,
}

impl Camera {
    /// Open a V4L2 camera device by path (e.g., "/dev/video0") at 640x480.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        Self::open_with_size(device_path, 640, 480)
    }

    /// Open and negotiate the first supported format near `width`x`height`.
    pub fn open_with_size(device_path: &str, width: u32, height: u32) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceUnavailable(format!("{device_path}: no such device")));
        }

        let device = Device::with_path(device_path).map_err(|e| match e.raw_os_error() {
            Some(EBUSY) => CameraError::DeviceBusy(device_path.to_string()),
            _ => CameraError::DeviceUnavailable(format!("{device_path}: {e}")),
        })?;

        let caps = device
            .query_caps()
            .map_err(|e| CameraError::DeviceUnavailable(format!("{device_path}: capability query: {e}")))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }
        tracing::info!(device = device_path, card = %caps.card, driver = %caps.driver, "camera opened");

        let mut fmt = device
            .format()
            .map_err(|e| CameraError::FormatNegotiationFailed(format!("reading current format: {e}")))?;

        // Drivers silently substitute formats they don't support, so keep
        // asking until one of ours comes back.
        for wanted in PixelFormat::PREFERRED {
            fmt.fourcc = wanted.fourcc();
            fmt.width = width;
            fmt.height = height;

            let negotiated = match device.set_format(&fmt) {
                Ok(negotiated) => negotiated,
                Err(e) => {
                    tracing::debug!(fourcc = ?wanted.fourcc(), error = %e, "format rejected");
                    continue;
                }
            };
            let Some(pixel_format) = PixelFormat::from_fourcc(negotiated.fourcc) else {
                continue;
            };

            tracing::info!(
                device = device_path,
                format = ?pixel_format,
                width = negotiated.width,
                height = negotiated.height,
                "capture format negotiated"
            );
            return Ok(Self {
                device,
                width: negotiated.width,
                height: negotiated.height,
                device_path: device_path.to_string(),
                pixel_format,
            });
        }

        Err(CameraError::FormatNegotiationFailed(
            "no supported pixel format (need MJPG, YUYV, or GREY)".into(),
        ))
    }

    pub fn pixel_format(&self) -> PixelFormat {
        self.pixel_format
    }

    /// Start a memory-mapped capture stream.
    pub fn stream(&self) -> Result<MmapStream<'static>, CameraError> {
        MmapStream::with_buffers(&self.device, BufType::VideoCapture, BUFFER_COUNT)
            .map_err(|e| CameraError::CaptureFailed(format!("mmap stream setup: {e}")))
    }

    /// Convert a raw driver buffer to RGB based on the negotiated format.
    pub fn to_rgb(&self, buf: &[u8]) -> Result<RgbImage, FrameError> {
        match self.pixel_format {
            PixelFormat::Mjpeg => image::load_from_memory(buf)
                .map(|img| img.to_rgb8())
                .map_err(FrameError::Decode),
            PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, self.width, self.height),
            PixelFormat::Grey => frame::grey_to_rgb(buf, self.width, self.height),
        }
    }

    /// Capture one frame, discarding the first `skip` buffers while
    /// auto-exposure settles.
    pub fn capture_frame(&self, skip: usize) -> Result<Frame, CameraError> {
        let mut stream = self.stream()?;
        let dequeue = |e: std::io::Error| CameraError::CaptureFailed(format!("dequeue: {e}"));
        for _ in 0..skip {
            stream.next().map_err(dequeue)?;
        }

        let (buf, meta) = stream.next().map_err(dequeue)?;
        let image = self.to_rgb(payload(buf, meta.bytesused))?;
        Ok(Frame::new(image, meta.sequence))
    }

    /// Probe `/dev/video0` through `/dev/video15` for capture-capable nodes.
    pub fn list_devices() -> Vec<DeviceInfo> {
        (0..16)
            .map(|i| format!("/dev/video{i}"))
            .filter(|path| Path::new(path).exists())
            .filter_map(|path| {
                let caps = Device::with_path(&path).and_then(|dev| dev.query_caps()).ok()?;
                caps.capabilities
                    .contains(v4l::capability::Flags::VIDEO_CAPTURE)
                    .then(|| DeviceInfo {
                        path,
                        name: caps.card,
                        driver: caps.driver,
                        bus: caps.bus,
                    })
            })
            .collect()
    }
}

/// The filled part of a driver buffer. Some drivers leave `bytesused` at 0.
pub(crate) fn payload(buf: &[u8], bytesused: u32) -> &[u8] {
    match bytesused as usize {
        0 => buf,
        n => &buf[..n.min(buf.len())],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_round_trip() {
        for format in PixelFormat::PREFERRED {
            assert_eq!(PixelFormat::from_fourcc(format.fourcc()), Some(format));
        }
        assert_eq!(PixelFormat::from_fourcc(FourCC::new(b"Y16 ")), None);
    }

    #[test]
    fn test_mjpeg_preferred() {
        assert_eq!(PixelFormat::PREFERRED[0], PixelFormat::Mjpeg);
    }

    #[test]
    fn test_payload_trims_to_bytesused() {
        let buf = [1u8, 2, 3, 4];
        assert_eq!(payload(&buf, 2), &[1, 2]);
        assert_eq!(payload(&buf, 0), &buf);
        assert_eq!(payload(&buf, 99), &buf);
    }

    #[test]
    fn test_missing_device() {
        let err = Camera::open("/dev/rollcall-no-such-video").err().unwrap();
        assert!(matches!(err, CameraError::DeviceUnavailable(_)));
    }
}
