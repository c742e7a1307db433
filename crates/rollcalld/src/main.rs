//! rollcalld — face-recognition attendance daemon.
//!
//! Owns the camera, the recognition pipeline, and the attendance
//! database; exposes a D-Bus control surface on the session bus.

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod cooldown;
mod dbus_interface;
mod decider;
mod engine;
mod status;
mod store;

use config::Config;
use dbus_interface::AttendanceService;
use decider::{AttendanceDecider, DeciderPolicy};
use engine::EngineSettings;
use rollcall_core::{FaceExtractor, VarianceDetector};
use rollcall_hw::{FeedbackSink, FrameSource, TerminalFeedback};
use status::TrainingStatusHandle;
use store::{AttendanceStore, SqliteStore};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::from_env();
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "rollcalld starting");

    for dir in [
        config.corpus_dir.as_path(),
        config.model_path.parent().unwrap_or(config.corpus_dir.as_path()),
        config.db_path.parent().unwrap_or(config.corpus_dir.as_path()),
    ] {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
    }

    let store: Arc<dyn AttendanceStore> =
        Arc::new(SqliteStore::open(&config.db_path).context("failed to open attendance database")?);
    let feedback: Arc<dyn FeedbackSink> = Arc::new(TerminalFeedback);
    let extractor = Arc::new(FaceExtractor::new(Box::new(VarianceDetector::default())));
    let decider = Arc::new(AttendanceDecider::new(
        store.clone(),
        feedback.clone(),
        DeciderPolicy {
            confidence_threshold: config.confidence_threshold,
            cooldown_success: config.cooldown_success,
            cooldown_duplicate: config.cooldown_duplicate,
            cooldown_unknown: config.cooldown_unknown,
        },
    ));
    let training = Arc::new(TrainingStatusHandle::new(config.train_status_path.clone()));

    let source = FrameSource::new(
        config.capture_strategy,
        config.camera_index,
        config.capture_width,
        config.capture_height,
        config.capture_timeout,
    );

    let (engine, engine_join) = engine::spawn_engine(
        EngineSettings {
            alignment_delay: config.alignment_delay,
            capture_backoff: config.capture_backoff,
            loop_interval: config.loop_interval,
            enroll_samples: config.enroll_samples,
            enroll_interval: config.enroll_interval,
            corpus_dir: config.corpus_dir.clone(),
            model_path: config.model_path.clone(),
        },
        Box::new(source),
        extractor,
        decider,
        feedback,
        training,
    );

    let service = AttendanceService::new(engine.clone(), store);
    let _conn = zbus::connection::Builder::session()
        .context("failed to connect to session bus")?
        .name("org.rollcall.Attendance1")?
        .serve_at("/org/rollcall/Attendance1", service)?
        .build()
        .await
        .context("failed to register D-Bus service")?;

    tracing::info!("rollcalld ready");
    tokio::signal::ctrl_c().await?;

    tracing::info!("rollcalld shutting down");
    engine.stop();
    if engine_join.join().is_err() {
        tracing::error!("engine thread panicked during shutdown");
    }
    Ok(())
}
