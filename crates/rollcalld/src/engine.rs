use rollcall_core::{EnrollError, EnrollMode, FrameProcessor, FrameReport, LoadError, ProcessError};
use rollcall_hw::Frame;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

/// Pending requests from HTTP handlers and the capture loop.
const QUEUE_DEPTH: usize = 8;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Process(#[from] ProcessError),
    #[error(transparent)]
    Enroll(#[from] EnrollError),
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent to the engine thread.
enum EngineRequest {
    Recognize {
        frame: Frame,
        reply: oneshot::Sender<Result<FrameReport, ProcessError>>,
    },
    Enroll {
        name: String,
        photo: Vec<u8>,
        mode: EnrollMode,
        reply: oneshot::Sender<Result<(), EnrollError>>,
    },
    Reload {
        reply: oneshot::Sender<Result<usize, LoadError>>,
    },
    /// A new frame is waiting in the live slot.
    LiveFrameReady,
}

/// Single-slot mailbox: a newer frame replaces an unprocessed one.
#[derive(Default)]
struct LiveSlot {
    latest: Mutex<Option<Frame>>,
}

impl LiveSlot {
    /// Returns true if a stale frame was dropped.
    fn put(&self, frame: Frame) -> bool {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(frame)
            .is_some()
    }

    fn take(&self) -> Option<Frame> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).take()
    }
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    live: Arc<LiveSlot>,
}

impl EngineHandle {
    /// Recognize faces in a submitted frame and update attendance.
    pub async fn recognize(&self, frame: Frame) -> Result<FrameReport, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.call(EngineRequest::Recognize { frame, reply }, rx).await
    }

    pub async fn enroll(&self, name: String, photo: Vec<u8>, mode: EnrollMode) -> Result<(), EngineError> {
        let (reply, rx) = oneshot::channel();
        self.call(
            EngineRequest::Enroll {
                name,
                photo,
                mode,
                reply,
            },
            rx,
        )
        .await
    }

    /// Rebuild the gallery from persisted photos.
    pub async fn reload(&self) -> Result<usize, EngineError> {
        let (reply, rx) = oneshot::channel();
        self.call(EngineRequest::Reload { reply }, rx).await
    }

    /// Hand a live frame to the engine without waiting.
    ///
    /// Never blocks: if the engine is still busy the previous live frame is
    /// dropped in favour of this one.
    pub fn submit_live(&self, frame: Frame) {
        let sequence = frame.sequence;
        if self.live.put(frame) {
            tracing::trace!(seq = sequence, "dropped stale live frame");
        }
        // A full queue already guarantees the slot is drained soon.
        let _ = self.tx.try_send(EngineRequest::LiveFrameReady);
    }

    async fn call<T, E>(
        &self,
        request: EngineRequest,
        rx: oneshot::Receiver<Result<T, E>>,
    ) -> Result<T, EngineError>
    where
        EngineError: From<E>,
    {
        self.tx
            .send(request)
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        let result = rx.await.map_err(|_| EngineError::ChannelClosed)?;
        Ok(result?)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The engine owns the processor (and with it the analyzer models); every
/// detection and encoding runs here, one request at a time. After each
/// request the live slot is drained so a burst of submissions cannot starve
/// the camera feed, or the other way round.
pub fn spawn_engine(mut processor: FrameProcessor) -> std::io::Result<EngineHandle> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(QUEUE_DEPTH);
    let live = Arc::new(LiveSlot::default());
    let slot = Arc::clone(&live);

    std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Recognize { frame, reply } => {
                        let result = processor.process(&frame.image);
                        if let Ok(report) = &result {
                            tracing::info!(
                                faces = report.faces_detected(),
                                recognized = report.recognized().count(),
                                updated = report.attendance_updated,
                                "submitted frame processed"
                            );
                        }
                        let _ = reply.send(result);
                    }
                    EngineRequest::Enroll {
                        name,
                        photo,
                        mode,
                        reply,
                    } => {
                        let _ = reply.send(processor.enroll(&name, &photo, mode));
                    }
                    EngineRequest::Reload { reply } => {
                        let _ = reply.send(processor.reload_gallery());
                    }
                    EngineRequest::LiveFrameReady => {}
                }

                if let Some(frame) = slot.take() {
                    run_live(&mut processor, &frame);
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, live })
}

fn run_live(processor: &mut FrameProcessor, frame: &Frame) {
    match processor.process(&frame.image) {
        Ok(report) => {
            for result in report.recognized() {
                tracing::debug!(
                    seq = frame.sequence,
                    name = result.name(),
                    confidence = result.confidence,
                    "live match"
                );
            }
            if report.attendance_updated {
                tracing::info!(seq = frame.sequence, "attendance updated from live feed");
            }
        }
        Err(e) => tracing::warn!(seq = frame.sequence, error = %e, "live frame processing failed"),
    }
}
