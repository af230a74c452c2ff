//! HTTP surface.

use crate::capture::{CaptureController, CaptureError, CaptureState};
use crate::engine::{EngineError, EngineHandle};
use crate::session::{SessionController, SessionStatus};
use axum::body::{Body, Bytes};
use axum::extract::multipart::MultipartError;
use axum::extract::{DefaultBodyLimit, Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures::Stream;
use rollcall_core::{
    BoundingBox, EnrollError, EnrollMode, FrameReport, GalleryStore, IdentitySummary, ProcessError,
};
use rollcall_hw::{FrameError, FrameSource, SubmittedFrame};
use serde::Serialize;
use serde_json::json;
use std::convert::Infallible;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;

/// Uploaded photos and frames.
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub engine: EngineHandle,
    pub gallery: Arc<GalleryStore>,
    pub session: Arc<SessionController>,
    pub capture: Arc<CaptureController>,
    pub request_timeout: Duration,
    /// Flips to `true` once the daemon starts shutting down.
    pub shutdown: watch::Receiver<bool>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/api/attendance", get(attendance))
        .route("/api/attendance/reset", post(reset_attendance))
        .route("/api/frames", post(submit_frame))
        .route("/api/learners", get(list_learners).post(enroll_learner))
        .route("/api/learners/:name", delete(remove_learner))
        .route("/api/gallery/reload", post(reload_gallery))
        .route("/api/camera/restart", post(restart_camera))
        .route("/video_feed", get(video_feed))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("no face found in image")]
    NoFaceFound,
    #[error("image contains {0} faces, expected exactly one")]
    AmbiguousFace(usize),
    #[error("{0}")]
    InvalidRequest(String),
    #[error("unknown learner: {0}")]
    UnknownLearner(String),
    #[error("request timed out")]
    Timeout,
    #[error("{0}")]
    Unavailable(String),
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::NoFaceFound | ApiError::AmbiguousFace(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::UnknownLearner(_) => StatusCode::NOT_FOUND,
            ApiError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            ApiError::NoFaceFound => "no_face_found",
            ApiError::AmbiguousFace(_) => "ambiguous_face",
            ApiError::InvalidRequest(_) => "invalid_request",
            ApiError::UnknownLearner(_) => "unknown_learner",
            ApiError::Timeout => "timeout",
            ApiError::Unavailable(_) => "unavailable",
            ApiError::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }
        let body = json!({ "error": self.code(), "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Enroll(EnrollError::NoFaceFound) => ApiError::NoFaceFound,
            EngineError::Enroll(EnrollError::AmbiguousFace(n)) => ApiError::AmbiguousFace(n),
            EngineError::Enroll(e @ (EnrollError::InvalidName(_) | EnrollError::Decode(_))) => {
                ApiError::InvalidRequest(e.to_string())
            }
            EngineError::Process(e @ ProcessError::FrameDecode(_)) => ApiError::InvalidRequest(e.to_string()),
            closed @ EngineError::ChannelClosed => ApiError::Unavailable(closed.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<FrameError> for ApiError {
    fn from(e: FrameError) -> Self {
        ApiError::InvalidRequest(e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError::InvalidRequest(e.body_text())
    }
}

impl From<CaptureError> for ApiError {
    fn from(e: CaptureError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

#[derive(Serialize)]
struct StatusBody {
    #[serde(flatten)]
    session: SessionStatus,
    camera: CaptureState,
}

#[derive(Serialize)]
struct Recognized {
    name: String,
    confidence: f32,
}

#[derive(Serialize)]
struct FaceBody {
    name: String,
    confidence: f32,
    region: BoundingBox,
}

#[derive(Serialize)]
struct FrameBody {
    faces_detected: usize,
    recognized: Vec<Recognized>,
    attendance_updated: bool,
    /// Every face in detection order, unknown ones included.
    faces: Vec<FaceBody>,
}

impl From<FrameReport> for FrameBody {
    fn from(report: FrameReport) -> Self {
        let recognized = report
            .recognized()
            .map(|r| Recognized {
                name: r.name().to_string(),
                confidence: r.confidence,
            })
            .collect();
        FrameBody {
            faces_detected: report.faces_detected(),
            recognized,
            attendance_updated: report.attendance_updated,
            faces: report
                .recognitions
                .into_iter()
                .map(|r| FaceBody {
                    name: r.result.name().to_string(),
                    confidence: r.result.confidence,
                    region: r.region,
                })
                .collect(),
        }
    }
}

fn message(text: impl Into<String>) -> Json<serde_json::Value> {
    Json(json!({ "message": text.into() }))
}

async fn within<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, EngineError>>,
) -> Result<T, ApiError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| ApiError::Timeout)?
        .map_err(ApiError::from)
}

async fn attendance(State(state): State<AppState>) -> Json<StatusBody> {
    Json(StatusBody {
        session: state.session.get_status(),
        camera: state.capture.state(),
    })
}

async fn reset_attendance(State(state): State<AppState>) -> Json<serde_json::Value> {
    let learners = state.session.reset();
    message(format!("attendance reset for {learners} learners"))
}

async fn submit_frame(State(state): State<AppState>, mut multipart: Multipart) -> Result<Json<FrameBody>, ApiError> {
    let mut upload = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("frame") {
            upload = Some(field.bytes().await?);
        }
    }
    let upload = upload.ok_or_else(|| ApiError::InvalidRequest("missing multipart field `frame`".into()))?;

    let mut source = tokio::task::spawn_blocking(move || SubmittedFrame::decode(&upload)).await??;
    let frame = source
        .next_frame()
        .ok_or_else(|| ApiError::InvalidRequest("empty frame".into()))?;

    let report = within(state.request_timeout, state.engine.recognize(frame)).await?;
    Ok(Json(report.into()))
}

async fn list_learners(State(state): State<AppState>) -> Json<Vec<IdentitySummary>> {
    Json(state.gallery.identities())
}

async fn enroll_learner(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<serde_json::Value>, ApiError> {
    let mut name = None;
    let mut photo = None;
    let mut mode = EnrollMode::Append;
    while let Some(field) = multipart.next_field().await? {
        let field_name = field.name().map(str::to_owned);
        match field_name.as_deref() {
            Some("name") => name = Some(field.text().await?.trim().to_string()),
            Some("photo") => photo = Some(field.bytes().await?.to_vec()),
            Some("mode") => mode = parse_mode(&field.text().await?)?,
            _ => {}
        }
    }
    let name = name.ok_or_else(|| ApiError::InvalidRequest("missing multipart field `name`".into()))?;
    let photo = photo.ok_or_else(|| ApiError::InvalidRequest("missing multipart field `photo`".into()))?;

    within(state.request_timeout, state.engine.enroll(name.clone(), photo, mode)).await?;
    Ok(message(format!("enrolled {name}")))
}

fn parse_mode(raw: &str) -> Result<EnrollMode, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "append" => Ok(EnrollMode::Append),
        "replace" => Ok(EnrollMode::Replace),
        other => Err(ApiError::InvalidRequest(format!(
            "unknown enrollment mode {other:?} (expected append or replace)"
        ))),
    }
}

async fn remove_learner(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let gallery = Arc::clone(&state.gallery);
    let lookup = name.clone();
    let removed = tokio::task::spawn_blocking(move || gallery.remove(&lookup))
        .await?
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !removed {
        return Err(ApiError::UnknownLearner(name));
    }
    Ok(message(format!("removed {name}")))
}

async fn reload_gallery(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let loaded = within(state.request_timeout, state.engine.reload()).await?;
    Ok(Json(json!({ "loaded": loaded })))
}

async fn restart_camera(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let capture = Arc::clone(&state.capture);
    tokio::task::spawn_blocking(move || capture.restart()).await??;
    Ok(message("camera restarted"))
}

async fn video_feed(State(state): State<AppState>) -> Result<Response, ApiError> {
    if !state.capture.is_enabled() {
        return Err(CaptureError::Disabled.into());
    }
    Ok((
        [
            (header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(mjpeg_stream(state.capture.subscribe(), state.shutdown.clone())),
    )
        .into_response())
}

/// The current frame goes out first, then one part per new frame. Ends at
/// shutdown or when the capture controller goes away.
fn mjpeg_stream(
    rx: watch::Receiver<Option<Bytes>>,
    shutdown: watch::Receiver<bool>,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Send + 'static {
    futures::stream::unfold((rx, shutdown, true), |(mut rx, mut shutdown, first)| async move {
        loop {
            if *shutdown.borrow() {
                return None;
            }
            if !first {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            return None;
                        }
                    }
                    _ = shutdown.wait_for(|stopping| *stopping) => return None,
                }
            }
            let latest = rx.borrow_and_update().clone();
            match latest {
                Some(jpeg) => return Some((Ok(mjpeg_part(&jpeg)), (rx, shutdown, false))),
                None if first => return Some((Ok(Bytes::new()), (rx, shutdown, false))),
                None => continue,
            }
        }
    })
}

fn mjpeg_part(jpeg: &[u8]) -> Bytes {
    let mut part = format!(
        "--frame\r\nContent-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
        jpeg.len()
    )
    .into_bytes();
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    Bytes::from(part)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::spawn_engine;
    use axum::http::{Method, Request};
    use futures::StreamExt;
    use rollcall_core::testing::{marker_analyzer, marker_png, portrait_png, BLUE, GREEN, RED};
    use rollcall_core::{AttendanceLedger, FrameProcessor, MatchPolicy};
    use serde_json::Value;
    use tower::ServiceExt;

    const BOUNDARY: &str = "rollcall-test-boundary";

    struct TestApp {
        _dir: tempfile::TempDir,
        _shutdown: watch::Sender<bool>,
        router: Router,
    }

    fn app() -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let gallery = Arc::new(GalleryStore::open(dir.path(), MatchPolicy::default()).unwrap());
        let ledger = Arc::new(AttendanceLedger::new());
        let engine = spawn_engine(FrameProcessor::new(
            marker_analyzer(),
            Arc::clone(&gallery),
            Arc::clone(&ledger),
        ))
        .unwrap();
        let (shutdown_tx, shutdown) = watch::channel(false);
        let state = AppState {
            capture: Arc::new(CaptureController::disabled(engine.clone())),
            session: Arc::new(SessionController::new(Arc::clone(&gallery), ledger)),
            gallery,
            engine,
            request_timeout: Duration::from_secs(5),
            shutdown,
        };
        TestApp {
            _dir: dir,
            _shutdown: shutdown_tx,
            router: router(state),
        }
    }

    enum Part<'a> {
        Text(&'a str, &'a str),
        File(&'a str, &'a [u8]),
    }

    fn multipart(parts: &[Part<'_>]) -> Vec<u8> {
        let mut body = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n").as_bytes(),
                    );
                }
                Part::File(name, bytes) => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{name}\"; filename=\"upload.png\"\r\n\
                             Content-Type: image/png\r\n\r\n"
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(bytes);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    impl TestApp {
        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.router.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
            (status, value)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::get(uri).body(Body::empty()).unwrap()).await
        }

        async fn post(&self, uri: &str) -> (StatusCode, Value) {
            self.send(Request::post(uri).body(Body::empty()).unwrap()).await
        }

        async fn post_multipart(&self, uri: &str, parts: &[Part<'_>]) -> (StatusCode, Value) {
            let request = Request::post(uri)
                .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
                .body(Body::from(multipart(parts)))
                .unwrap();
            self.send(request).await
        }

        async fn enroll(&self, name: &str, photo: &[u8]) -> (StatusCode, Value) {
            self.post_multipart("/api/learners", &[Part::Text("name", name), Part::File("photo", photo)])
                .await
        }
    }

    fn entry_states(status: &Value) -> Vec<(String, String)> {
        status["entries"]
            .as_array()
            .unwrap()
            .iter()
            .map(|e| (e["name"].as_str().unwrap().to_string(), e["state"].as_str().unwrap().to_string()))
            .collect()
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        let response = app
            .router
            .clone()
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"OK");
    }

    #[tokio::test]
    async fn test_attendance_flow() {
        let app = app();
        assert_eq!(app.enroll("alice", &portrait_png(RED)).await.0, StatusCode::OK);
        assert_eq!(app.enroll("bob", &portrait_png(GREEN)).await.0, StatusCode::OK);

        let (status, body) = app.post("/api/attendance/reset").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "attendance reset for 2 learners");

        let (status, report) = app
            .post_multipart("/api/frames", &[Part::File("frame", &marker_png(&[(BLUE, 2, 2), (RED, 30, 30)]))])
            .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(report["faces_detected"], 2);
        assert_eq!(report["attendance_updated"], true);
        assert_eq!(report["recognized"].as_array().unwrap().len(), 1);
        assert_eq!(report["recognized"][0]["name"], "alice");
        assert_eq!(report["recognized"][0]["confidence"], 1.0);
        assert_eq!(report["faces"][0]["name"], "Unknown");

        let (_, status) = app.get("/api/attendance").await;
        assert_eq!(
            entry_states(&status),
            vec![("alice".into(), "present".into()), ("bob".into(), "absent".into())]
        );
        assert!(status["period_label"].as_str().unwrap().starts_with("PERIOD: 1  DATE: "));
        assert_eq!(status["camera"], "disabled");
        assert!(status["entries"][0]["marked_at"].is_string());
    }

    #[tokio::test]
    async fn test_enrollment_rejections() {
        let app = app();
        let (status, body) = app.enroll("alice", &marker_png(&[])).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "no_face_found");

        let (status, body) = app
            .enroll("alice", &marker_png(&[(RED, 0, 0), (GREEN, 40, 40)]))
            .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "ambiguous_face");

        let (status, _) = app.enroll("../etc", &portrait_png(RED)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = app
            .post_multipart("/api/learners", &[Part::Text("name", "alice")])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, learners) = app.get("/api/learners").await;
        assert_eq!(learners, serde_json::json!([]));
    }

    #[tokio::test]
    async fn test_enroll_modes() {
        let app = app();
        app.enroll("alice", &portrait_png(RED)).await;
        app.enroll("alice", &portrait_png(RED)).await;
        let (_, learners) = app.get("/api/learners").await;
        assert_eq!(learners, serde_json::json!([{ "name": "alice", "descriptors": 2 }]));

        let (status, _) = app
            .post_multipart(
                "/api/learners",
                &[
                    Part::Text("name", "alice"),
                    Part::Text("mode", "replace"),
                    Part::File("photo", &portrait_png(RED)),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        let (_, learners) = app.get("/api/learners").await;
        assert_eq!(learners[0]["descriptors"], 1);

        let (status, _) = app
            .post_multipart(
                "/api/learners",
                &[
                    Part::Text("name", "alice"),
                    Part::Text("mode", "merge"),
                    Part::File("photo", &portrait_png(RED)),
                ],
            )
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_frame_errors() {
        let app = app();
        let (status, body) = app
            .post_multipart("/api/frames", &[Part::File("frame", b"not an image")])
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "invalid_request");

        let (status, _) = app.post_multipart("/api/frames", &[Part::Text("other", "x")]).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_remove_and_reload() {
        let app = app();
        app.enroll("alice", &portrait_png(RED)).await;
        app.enroll("bob", &portrait_png(GREEN)).await;

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/learners/alice")
            .body(Body::empty())
            .unwrap();
        assert_eq!(app.send(request).await.0, StatusCode::OK);

        let request = Request::builder()
            .method(Method::DELETE)
            .uri("/api/learners/alice")
            .body(Body::empty())
            .unwrap();
        let (status, body) = app.send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "unknown_learner");

        let (status, body) = app.post("/api/gallery/reload").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["loaded"], 1);
    }

    #[tokio::test]
    async fn test_camera_endpoints_when_disabled() {
        let app = app();
        let (status, body) = app.post("/api/camera/restart").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "unavailable");

        let (status, _) = app.get("/video_feed").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_mjpeg_part_framing() {
        let part = mjpeg_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        let header = b"--frame\r\nContent-Type: image/jpeg\r\nContent-Length: 4\r\n\r\n";
        assert!(part.starts_with(header));
        assert!(part.ends_with(b"\xFF\xD9\r\n"));
    }

    #[tokio::test]
    async fn test_engine_errors_map_to_status() {
        assert_eq!(ApiError::from(EngineError::ChannelClosed).status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            ApiError::from(EngineError::Enroll(EnrollError::InvalidName(String::new()))).status(),
            StatusCode::BAD_REQUEST
        );
        let slow = within(Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EngineError>(())
        });
        assert!(matches!(slow.await, Err(ApiError::Timeout)));
    }

    #[tokio::test]
    async fn test_mjpeg_stream_follows_latest_frame() {
        let (tx, rx) = watch::channel(Some(Bytes::from_static(b"one")));
        let (_stop, shutdown) = watch::channel(false);
        let mut parts = Box::pin(mjpeg_stream(rx, shutdown));
        let first = parts.next().await.unwrap().unwrap();
        assert!(first.starts_with(b"--frame\r\n"));
        assert!(first.ends_with(b"one\r\n"));

        tx.send_replace(Some(Bytes::from_static(b"two")));
        let second = parts.next().await.unwrap().unwrap();
        assert!(second.ends_with(b"two\r\n"));

        drop(tx);
        assert!(parts.next().await.is_none());
    }

    #[tokio::test]
    async fn test_mjpeg_stream_ends_on_shutdown() {
        let (_frames, rx) = watch::channel(Some(Bytes::from_static(b"one")));
        let (stop, shutdown) = watch::channel(false);
        let mut parts = Box::pin(mjpeg_stream(rx, shutdown));
        assert!(parts.next().await.is_some());

        // The viewer is parked waiting for a new frame that never comes.
        let waiting = tokio::spawn(async move { parts.next().await.is_none() });
        tokio::task::yield_now().await;
        stop.send_replace(true);
        let ended = tokio::time::timeout(Duration::from_secs(5), waiting).await.unwrap().unwrap();
        assert!(ended);
    }

    #[tokio::test]
    async fn test_mjpeg_stream_after_shutdown_is_empty() {
        let (_frames, rx) = watch::channel(Some(Bytes::from_static(b"one")));
        let (_stop, shutdown) = watch::channel(true);
        let mut parts = Box::pin(mjpeg_stream(rx, shutdown));
        assert!(parts.next().await.is_none());
    }
}
