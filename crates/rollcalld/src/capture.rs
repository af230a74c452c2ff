//! Live capture loop: camera → viewers (JPEG) and → engine (recognition).

use crate::engine::EngineHandle;
use axum::body::Bytes;
use rollcall_hw::{CameraError, FrameSource, LiveCamera};
use serde::{Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use thiserror::Error;
use tokio::sync::watch;

/// Opens a fresh frame source each time capture (re)starts.
pub type SourceOpener = Box<dyn Fn() -> Result<Box<dyn FrameSource>, CameraError> + Send + Sync>;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("live capture is disabled")]
    Disabled,
    #[error(transparent)]
    Camera(#[from] CameraError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureState {
    Disabled,
    Stopped,
    Running,
    Failed(String),
}

impl fmt::Display for CaptureState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureState::Disabled => f.write_str("disabled"),
            CaptureState::Stopped => f.write_str("stopped"),
            CaptureState::Running => f.write_str("running"),
            CaptureState::Failed(reason) => write!(f, "failed: {reason}"),
        }
    }
}

impl Serialize for CaptureState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct Worker {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Owns the capture thread. Restartable; stopping joins the thread.
pub struct CaptureController {
    opener: Option<SourceOpener>,
    engine: EngineHandle,
    jpeg_quality: u8,
    viewers: watch::Sender<Option<Bytes>>,
    state: Arc<Mutex<CaptureState>>,
    worker: Mutex<Option<Worker>>,
}

impl CaptureController {
    pub fn new(opener: Option<SourceOpener>, engine: EngineHandle, jpeg_quality: u8) -> Self {
        let initial = if opener.is_some() {
            CaptureState::Stopped
        } else {
            CaptureState::Disabled
        };
        let (viewers, _) = watch::channel(None);
        Self {
            opener,
            engine,
            jpeg_quality,
            viewers,
            state: Arc::new(Mutex::new(initial)),
            worker: Mutex::new(None),
        }
    }

    /// Capture from a V4L2 device, discarding `warmup` frames on each start.
    pub fn camera(device: String, warmup: usize, engine: EngineHandle, jpeg_quality: u8) -> Self {
        let opener: SourceOpener = Box::new(move || {
            LiveCamera::open(&device, warmup).map(|camera| Box::new(camera) as Box<dyn FrameSource>)
        });
        Self::new(Some(opener), engine, jpeg_quality)
    }

    pub fn disabled(engine: EngineHandle) -> Self {
        Self::new(None, engine, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.opener.is_some()
    }

    pub fn state(&self) -> CaptureState {
        lock(&self.state).clone()
    }

    /// Latest JPEG frame for live viewers; `None` until the first frame.
    pub fn subscribe(&self) -> watch::Receiver<Option<Bytes>> {
        self.viewers.subscribe()
    }

    /// Open the source and start the capture thread. No-op if running.
    ///
    /// Blocks while the device opens.
    pub fn start(&self) -> Result<(), CaptureError> {
        let opener = self.opener.as_ref().ok_or(CaptureError::Disabled)?;
        let mut worker = lock(&self.worker);
        if worker.as_ref().is_some_and(|w| !w.thread.is_finished()) {
            return Ok(());
        }

        let source = match opener() {
            Ok(source) => source,
            Err(e) => {
                tracing::error!(error = %e, "failed to start live capture");
                *lock(&self.state) = CaptureState::Failed(e.to_string());
                return Err(e.into());
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let ctx = CaptureLoop {
            source,
            stop: Arc::clone(&stop),
            engine: self.engine.clone(),
            viewers: self.viewers.clone(),
            state: Arc::clone(&self.state),
            jpeg_quality: self.jpeg_quality,
        };
        *lock(&self.state) = CaptureState::Running;
        let thread = std::thread::Builder::new()
            .name("rollcall-capture".into())
            .spawn(move || ctx.run())
            .map_err(|e| {
                *lock(&self.state) = CaptureState::Failed(e.to_string());
                CaptureError::Camera(CameraError::CaptureFailed(e.to_string()))
            })?;
        *worker = Some(Worker { stop, thread });
        tracing::info!("live capture started");
        Ok(())
    }

    /// Signal the capture thread and wait for it to exit.
    ///
    /// Blocks until the source yields or gives up on a stalled device
    /// (see [`rollcall_hw::source::DEQUEUE_TIMEOUT`]).
    pub fn stop(&self) {
        let Some(worker) = lock(&self.worker).take() else {
            return;
        };
        worker.stop.store(true, Ordering::Relaxed);
        if worker.thread.join().is_err() {
            tracing::error!("capture thread panicked");
        }
        let mut state = lock(&self.state);
        if *state == CaptureState::Running {
            *state = CaptureState::Stopped;
        }
    }

    pub fn restart(&self) -> Result<(), CaptureError> {
        if !self.is_enabled() {
            return Err(CaptureError::Disabled);
        }
        tracing::info!("restarting live capture");
        self.stop();
        self.start()
    }
}

impl Drop for CaptureController {
    fn drop(&mut self) {
        self.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct CaptureLoop {
    source: Box<dyn FrameSource>,
    stop: Arc<AtomicBool>,
    engine: EngineHandle,
    viewers: watch::Sender<Option<Bytes>>,
    state: Arc<Mutex<CaptureState>>,
    jpeg_quality: u8,
}

impl CaptureLoop {
    fn run(mut self) {
        let mut frames = 0u64;
        let mut dark = 0u64;

        let ended = loop {
            if self.stop.load(Ordering::Relaxed) {
                break CaptureState::Stopped;
            }
            let Some(frame) = self.source.next_frame() else {
                break match self.source.take_error() {
                    Some(e) => CaptureState::Failed(e.to_string()),
                    None => CaptureState::Stopped,
                };
            };
            frames += 1;

            match frame.encode_jpeg(self.jpeg_quality) {
                Ok(jpeg) => {
                    self.viewers.send_replace(Some(Bytes::from(jpeg)));
                }
                Err(e) => tracing::debug!(seq = frame.sequence, error = %e, "live view encode failed"),
            }

            if frame.is_dark {
                dark += 1;
                tracing::trace!(seq = frame.sequence, "skipping dark frame");
                continue;
            }
            self.engine.submit_live(frame);
        };

        match &ended {
            CaptureState::Failed(reason) => {
                tracing::error!(frames, dark, reason = %reason, "live capture failed")
            }
            _ if self.stop.load(Ordering::Relaxed) => tracing::info!(frames, dark, "live capture stopped"),
            _ => tracing::warn!(frames, dark, "camera stream ended"),
        }
        *lock(&self.state) = ended;
    }
}
