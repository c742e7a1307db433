//! Frame acquisition via external capture helper processes.
//!
//! The Pi camera stack is prone to wedging under continuous use, so
//! acquisition shells out to the short-lived `rpicam-*` helpers instead
//! of holding a device handle open. Every attempt is bounded by a hard
//! timeout and the helper is killed and reaped on all exit paths.

use crate::frame::{self, Frame};
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::mpsc;
use std::time::{Duration, Instant};
use thiserror::Error;

// --- Capture helper invocation constants ---
const VIDEO_HELPER: &str = "rpicam-vid";
const STILL_HELPER: &str = "rpicam-still";
/// Shutter/settle time passed to the helper, milliseconds.
const HELPER_SHUTTER_MS: u32 = 250;
/// Grace period for a helper to exit after closing stdout.
const REAP_GRACE: Duration = Duration::from_millis(500);

#[derive(Error, Debug)]
pub enum AcquisitionError {
    #[error("camera device busy")]
    DeviceBusy,
    #[error("capture timed out after {0:?}")]
    Timeout(Duration),
    #[error("frame decode failed: {0}")]
    Decode(String),
    #[error("capture helper failed: {0}")]
    HelperFailed(String),
    #[error("failed to spawn capture helper {helper}: {source}")]
    Spawn {
        helper: String,
        source: std::io::Error,
    },
}

/// Which capture helper produces the frame.
///
/// Callers must not depend on the strategy in use; both yield the same
/// grayscale [`Frame`] contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStrategy {
    /// Single YUV420 frame from the video helper. Fast, no JPEG pass.
    RawStream,
    /// JPEG still from the still helper, decoded via the `image` crate.
    StillImage,
}

impl CaptureStrategy {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(Self::RawStream),
            "still" => Some(Self::StillImage),
            _ => None,
        }
    }
}

/// Contract for anything that can produce frames for the engine loop.
pub trait FrameAcquirer: Send {
    fn acquire(&self) -> Result<Frame, AcquisitionError>;

    /// Best-effort recovery of a wedged device. Must never block for
    /// long and must never fail loudly.
    fn reset(&self) {}
}

/// Subprocess-backed frame source.
pub struct FrameSource {
    strategy: CaptureStrategy,
    camera_index: u32,
    width: u32,
    height: u32,
    timeout: Duration,
}

impl FrameSource {
    pub fn new(
        strategy: CaptureStrategy,
        camera_index: u32,
        width: u32,
        height: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            strategy,
            camera_index,
            width,
            height,
            timeout,
        }
    }

    fn video_command(&self) -> Command {
        let mut cmd = Command::new(VIDEO_HELPER);
        cmd.args(["--nopreview", "--camera"])
            .arg(self.camera_index.to_string())
            .arg("--width")
            .arg(self.width.to_string())
            .arg("--height")
            .arg(self.height.to_string())
            .args(["--frames", "1", "--timeout"])
            .arg(HELPER_SHUTTER_MS.to_string())
            .args(["--codec", "yuv420", "-o", "-"]);
        cmd
    }

    fn still_command(&self) -> Command {
        let mut cmd = Command::new(STILL_HELPER);
        cmd.args(["--nopreview", "--camera"])
            .arg(self.camera_index.to_string())
            .arg("--width")
            .arg(self.width.to_string())
            .arg("--height")
            .arg(self.height.to_string())
            .arg("--timeout")
            .arg(HELPER_SHUTTER_MS.to_string())
            .args(["--encoding", "jpg", "-o", "-"]);
        cmd
    }

    /// Run a capture helper with a hard deadline, returning its stdout.
    ///
    /// The child is a scoped resource: on timeout or any error path the
    /// guard kills and reaps it, so no helper process is ever leaked.
    fn run_helper(&self, mut cmd: Command) -> Result<Vec<u8>, AcquisitionError> {
        let helper = cmd.get_program().to_string_lossy().into_owned();
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let child = cmd.spawn().map_err(|source| AcquisitionError::Spawn {
            helper: helper.clone(),
            source,
        })?;
        let mut guard = HelperGuard::new(child);

        let Some(mut stdout) = guard.child.stdout.take() else {
            return Err(AcquisitionError::HelperFailed(
                "helper stdout not captured".into(),
            ));
        };
        let Some(mut stderr) = guard.child.stderr.take() else {
            return Err(AcquisitionError::HelperFailed(
                "helper stderr not captured".into(),
            ));
        };

        // Drain stdout off-thread: a full frame exceeds the pipe buffer,
        // so reading inline while polling the child would deadlock.
        let (out_tx, out_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stdout.read_to_end(&mut buf);
            let _ = out_tx.send(buf);
        });
        let (err_tx, err_rx) = mpsc::channel();
        std::thread::spawn(move || {
            let mut buf = String::new();
            let _ = stderr.read_to_string(&mut buf);
            let _ = err_tx.send(buf);
        });

        let bytes = match out_rx.recv_timeout(self.timeout) {
            Ok(bytes) => bytes,
            Err(_) => {
                tracing::warn!(helper, timeout = ?self.timeout, "capture helper timed out; killing");
                return Err(AcquisitionError::Timeout(self.timeout));
            }
        };

        let status = guard.reap(REAP_GRACE);
        let stderr_text = err_rx
            .recv_timeout(Duration::from_millis(200))
            .unwrap_or_default();

        match status {
            Some(s) if s.success() => Ok(bytes),
            Some(_) if stderr_text.to_lowercase().contains("busy") => {
                Err(AcquisitionError::DeviceBusy)
            }
            Some(s) => Err(AcquisitionError::HelperFailed(format!(
                "{helper} exited with {s}: {}",
                stderr_text.trim()
            ))),
            None => Err(AcquisitionError::Timeout(self.timeout)),
        }
    }
}

impl FrameAcquirer for FrameSource {
    fn acquire(&self) -> Result<Frame, AcquisitionError> {
        match self.strategy {
            CaptureStrategy::RawStream => {
                let raw = self.run_helper(self.video_command())?;
                let gray = frame::yuv420_to_grayscale(&raw, self.width, self.height)
                    .map_err(|e| AcquisitionError::Decode(e.to_string()))?;
                Frame::from_grayscale(gray, self.width, self.height)
                    .map_err(|e| AcquisitionError::Decode(e.to_string()))
            }
            CaptureStrategy::StillImage => {
                let jpeg = self.run_helper(self.still_command())?;
                let img = image::load_from_memory(&jpeg)
                    .map_err(|e| AcquisitionError::Decode(format!("JPEG decode: {e}")))?
                    .to_luma8();
                // The helper may not honor the requested geometry exactly,
                // so take dimensions from the decoded image.
                let (w, h) = (img.width(), img.height());
                Frame::from_grayscale(img.into_raw(), w, h)
                    .map_err(|e| AcquisitionError::Decode(e.to_string()))
            }
        }
    }

    /// Kill any wedged capture helpers left over from a previous attempt
    /// (or a previous process). Best effort; failures are only logged.
    fn reset(&self) {
        for helper in [VIDEO_HELPER, STILL_HELPER] {
            let result = Command::new("pkill")
                .args(["-9", "-x", helper])
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status();
            if let Err(e) = result {
                tracing::debug!(helper, error = %e, "pkill unavailable during camera reset");
            }
        }
        tracing::debug!("camera reset issued");
    }
}

/// Owns a capture helper child process; kills and reaps it on drop
/// unless it has already been reaped.
struct HelperGuard {
    child: Child,
    reaped: bool,
}

impl HelperGuard {
    fn new(child: Child) -> Self {
        Self {
            child,
            reaped: false,
        }
    }

    /// Poll for exit until `grace` elapses. Returns the exit status if
    /// the child terminated; `None` means the drop path will kill it.
    fn reap(&mut self, grace: Duration) -> Option<ExitStatus> {
        let deadline = Instant::now() + grace;
        loop {
            match self.child.try_wait() {
                Ok(Some(status)) => {
                    self.reaped = true;
                    return Some(status);
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(10));
                }
                Err(_) => return None,
            }
        }
    }
}

impl Drop for HelperGuard {
    fn drop(&mut self) {
        if !self.reaped {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_source(timeout_ms: u64) -> FrameSource {
        FrameSource::new(
            CaptureStrategy::RawStream,
            0,
            640,
            480,
            Duration::from_millis(timeout_ms),
        )
    }

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(script);
        cmd
    }

    #[test]
    fn test_run_helper_collects_stdout() {
        let src = test_source(2000);
        let out = src.run_helper(sh("printf 'frame-bytes'")).unwrap();
        assert_eq!(out, b"frame-bytes");
    }

    #[test]
    fn test_run_helper_timeout_kills_child() {
        let src = test_source(100);
        let started = Instant::now();
        let err = src.run_helper(sh("sleep 30")).unwrap_err();
        assert!(matches!(err, AcquisitionError::Timeout(_)));
        // The guard must not wait out the child's natural lifetime.
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_run_helper_maps_busy_stderr() {
        let src = test_source(2000);
        let err = src
            .run_helper(sh("echo 'device or resource busy' >&2; exit 1"))
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::DeviceBusy));
    }

    #[test]
    fn test_run_helper_reports_failure_with_stderr() {
        let src = test_source(2000);
        let err = src
            .run_helper(sh("echo 'no cameras available' >&2; exit 2"))
            .unwrap_err();
        match err {
            AcquisitionError::HelperFailed(msg) => {
                assert!(msg.contains("no cameras available"), "got: {msg}");
            }
            other => panic!("expected HelperFailed, got {other:?}"),
        }
    }

    #[test]
    fn test_run_helper_spawn_error() {
        let src = test_source(2000);
        let err = src
            .run_helper(Command::new("rollcall-no-such-helper"))
            .unwrap_err();
        assert!(matches!(err, AcquisitionError::Spawn { .. }));
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!(CaptureStrategy::parse("raw"), Some(CaptureStrategy::RawStream));
        assert_eq!(CaptureStrategy::parse("still"), Some(CaptureStrategy::StillImage));
        assert_eq!(CaptureStrategy::parse("v4l2"), None);
    }
}
