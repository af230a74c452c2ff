use anyhow::{Context, Result};
use rollcall_core::{Analyzer, AttendanceLedger, FrameProcessor, GalleryStore};
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod api;
mod capture;
mod config;
mod engine;
mod session;

use capture::CaptureController;
use config::Config;
use session::SessionController;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env()?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        bind = %config.bind_addr,
        gallery = %config.gallery_dir.display(),
        camera = %config.camera_device,
        camera_enabled = config.camera_enabled,
        "rollcalld starting"
    );

    // Load models and open the gallery synchronously (fail-fast)
    let analyzer = Analyzer::load_onnx(&config.model_dir)
        .with_context(|| format!("loading models from {}", config.model_dir.display()))?;
    tracing::info!(path = %config.model_dir.display(), "face models loaded");

    let gallery = Arc::new(
        GalleryStore::open(&config.gallery_dir, config.match_policy())
            .with_context(|| format!("opening gallery at {}", config.gallery_dir.display()))?,
    );
    let ledger = Arc::new(AttendanceLedger::new());
    let engine = engine::spawn_engine(FrameProcessor::new(
        analyzer,
        Arc::clone(&gallery),
        Arc::clone(&ledger),
    ))
    .context("spawning engine thread")?;

    let loaded = engine.reload().await?;
    let session = Arc::new(SessionController::new(Arc::clone(&gallery), ledger));
    session.reset();
    tracing::info!(learners = loaded, "first session seeded");

    let capture = Arc::new(if config.camera_enabled {
        CaptureController::camera(
            config.camera_device.clone(),
            config.warmup_frames,
            engine.clone(),
            config.jpeg_quality,
        )
    } else {
        tracing::info!("live capture disabled via ROLLCALL_CAMERA_ENABLED=0");
        CaptureController::disabled(engine.clone())
    });
    if capture.is_enabled() {
        let starter = Arc::clone(&capture);
        if let Err(e) = tokio::task::spawn_blocking(move || starter.start()).await? {
            tracing::warn!(error = %e, "camera unavailable; frame submission still works, restart capture once fixed");
        }
    }

    let (shutdown_tx, shutdown) = watch::channel(false);
    let app = api::router(api::AppState {
        engine,
        gallery,
        session,
        capture: Arc::clone(&capture),
        request_timeout: config.request_timeout(),
        shutdown,
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "rollcalld ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            // Long-lived live-view streams end on this.
            shutdown_tx.send_replace(true);
        })
        .await?;

    tracing::info!("rollcalld shutting down");
    tokio::task::spawn_blocking(move || capture.stop()).await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
}
