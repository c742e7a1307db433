use crate::engine::{EngineError, EngineHandle, PipelineState};
use crate::store::AttendanceStore;
use chrono::Local;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
///
/// Structured results cross the bus as JSON strings so clients don't
/// need the daemon's type definitions.
pub struct AttendanceService {
    engine: EngineHandle,
    store: Arc<dyn AttendanceStore>,
}

impl AttendanceService {
    pub fn new(engine: EngineHandle, store: Arc<dyn AttendanceStore>) -> Self {
        Self { engine, store }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Start one recognition episode. Returns "ok" or "busy".
    async fn trigger(&self) -> zbus::fdo::Result<String> {
        tracing::info!("trigger requested");
        match self.engine.trigger() {
            Ok(()) => Ok("ok".into()),
            Err(EngineError::Busy) => Ok("busy".into()),
            Err(e) => Err(zbus::fdo::Error::Failed(e.to_string())),
        }
    }

    /// Decision of the most recently completed scan as JSON, or an
    /// empty string when no scan has completed since the last trigger.
    async fn last_result(&self) -> zbus::fdo::Result<String> {
        match self.engine.last_result() {
            Some(decision) => serde_json::to_string(&decision)
                .map_err(|e| zbus::fdo::Error::Failed(e.to_string())),
            None => Ok(String::new()),
        }
    }

    /// Launch the background training job. Returns "started" or
    /// "already_running".
    async fn start_training(&self) -> zbus::fdo::Result<String> {
        tracing::info!("training requested");
        match self.engine.start_training() {
            Ok(()) => Ok("started".into()),
            Err(EngineError::TrainingActive) => Ok("already_running".into()),
            Err(e) => Err(zbus::fdo::Error::Failed(e.to_string())),
        }
    }

    /// Current training status as JSON.
    async fn train_status(&self) -> zbus::fdo::Result<String> {
        serde_json::to_string(&self.engine.train_status())
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Register (or rename) a user row for `identity`.
    async fn register_user(&self, identity: &str, name: &str) -> zbus::fdo::Result<()> {
        tracing::info!(identity, name, "register_user requested");
        self.store
            .register_user(identity, name)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Capture enrollment images for `identity` from the live camera.
    /// Returns "ok" or "busy".
    async fn enroll_capture(&self, identity: &str) -> zbus::fdo::Result<String> {
        tracing::info!(identity, "enroll_capture requested");
        match self.engine.enroll_capture(identity) {
            Ok(()) => Ok("ok".into()),
            Err(EngineError::Busy) => Ok("busy".into()),
            Err(e) => Err(zbus::fdo::Error::Failed(e.to_string())),
        }
    }

    /// Drop the cached classifier; the next scan reloads from disk.
    async fn reload_model(&self) -> zbus::fdo::Result<()> {
        self.engine.reload_model();
        Ok(())
    }

    /// Most recent attendance rows as a JSON array, newest first.
    async fn recent_attendance(&self, limit: u32) -> zbus::fdo::Result<String> {
        let rows = self
            .store
            .recent_attendance(limit as usize)
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&rows).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Latest preview frame as PNG bytes. Empty until the first
    /// successful acquisition.
    async fn preview_frame(&self) -> zbus::fdo::Result<Vec<u8>> {
        Ok(self.engine.preview_png().unwrap_or_default())
    }

    /// Daemon status information as JSON.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = match self.engine.state() {
            PipelineState::Idle => "idle",
            PipelineState::Aligning => "aligning",
            PipelineState::Scanning => "scanning",
        };
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "pipeline": state,
            "training_running": self.engine.train_status().running,
            "time": Local::now().to_rfc3339(),
        })
        .to_string())
    }
}
