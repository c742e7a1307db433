//! Shared training status: single writer (the active training job),
//! many readers (the request layer polls it).
//!
//! The status is mirrored to a small JSON file so pollers see a sane
//! value across daemon restarts.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrainingStatus {
    pub running: bool,
    /// 0–100.
    pub progress: u8,
    pub message: String,
}

impl TrainingStatus {
    pub fn idle() -> Self {
        Self {
            running: false,
            progress: 0,
            message: "Idle".to_string(),
        }
    }
}

/// Process-scoped training status with a persisted mirror.
pub struct TrainingStatusHandle {
    current: Mutex<TrainingStatus>,
    path: PathBuf,
}

impl TrainingStatusHandle {
    /// Reset to Idle at process start, stale file included.
    pub fn new(path: PathBuf) -> Self {
        let handle = Self {
            current: Mutex::new(TrainingStatus::idle()),
            path,
        };
        handle.persist(&TrainingStatus::idle());
        handle
    }

    pub fn snapshot(&self) -> TrainingStatus {
        self.current.lock().unwrap().clone()
    }

    pub fn is_running(&self) -> bool {
        self.current.lock().unwrap().running
    }

    pub fn set(&self, running: bool, progress: u8, message: &str) {
        let status = TrainingStatus {
            running,
            progress,
            message: message.to_string(),
        };
        *self.current.lock().unwrap() = status.clone();
        self.persist(&status);
    }

    /// Mirror to disk, write-then-rename. Best effort: a full disk must
    /// not take the training job down with it.
    fn persist(&self, status: &TrainingStatus) {
        let write = || -> std::io::Result<()> {
            let tmp = self.path.with_extension("json.tmp");
            std::fs::write(&tmp, serde_json::to_vec(status)?)?;
            std::fs::rename(&tmp, &self.path)
        };
        if let Err(e) = write() {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to persist training status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starts_idle_and_overwrites_stale_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_status.json");
        std::fs::write(&path, r#"{"running":true,"progress":55,"message":"stale"}"#).unwrap();

        let handle = TrainingStatusHandle::new(path.clone());
        assert_eq!(handle.snapshot(), TrainingStatus::idle());

        let on_disk: TrainingStatus =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk, TrainingStatus::idle());
    }

    #[test]
    fn test_set_updates_snapshot_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("train_status.json");
        let handle = TrainingStatusHandle::new(path.clone());

        handle.set(true, 40, "Processed 2/4 identities");
        assert!(handle.is_running());
        assert_eq!(handle.snapshot().progress, 40);

        let on_disk: TrainingStatus =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(on_disk.message, "Processed 2/4 identities");
    }

    #[test]
    fn test_unwritable_path_does_not_panic() {
        let handle =
            TrainingStatusHandle::new(PathBuf::from("/nonexistent-dir/train_status.json"));
        handle.set(true, 10, "still fine");
        assert_eq!(handle.snapshot().progress, 10);
    }
}
