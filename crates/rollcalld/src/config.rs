use rollcall_hw::CaptureStrategy;
use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Camera index passed to the capture helper.
    pub camera_index: u32,
    /// Capture strategy: raw YUV stream or JPEG still.
    pub capture_strategy: CaptureStrategy,
    pub capture_width: u32,
    pub capture_height: u32,
    /// Hard deadline for one acquisition attempt.
    pub capture_timeout: Duration,
    /// Backoff between acquisition attempts after a failure.
    pub capture_backoff: Duration,
    /// Pacing sleep between acquisition loop iterations.
    pub loop_interval: Duration,
    /// Directory of per-identity enrollment image folders.
    pub corpus_dir: PathBuf,
    /// Path of the persisted classifier model.
    pub model_path: PathBuf,
    /// Path of the training status file (polled across restarts).
    pub train_status_path: PathBuf,
    /// Path to the SQLite attendance database.
    pub db_path: PathBuf,
    /// Minimum confidence for an accepted identification.
    ///
    /// Deployed values differ: 0.5 on the bench rig, 0.35 on the
    /// low-light classroom install. There is no documented rationale
    /// for either, hence a tunable rather than a constant.
    pub confidence_threshold: f32,
    /// Feedback cooldown windows per decision kind.
    pub cooldown_success: Duration,
    pub cooldown_duplicate: Duration,
    pub cooldown_unknown: Duration,
    /// Delay between a trigger and scanning, giving the subject time
    /// to position their face.
    pub alignment_delay: Duration,
    /// Number of images saved per enrollment capture session.
    pub enroll_samples: usize,
    /// Interval between enrollment samples.
    pub enroll_interval: Duration,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("ROLLCALL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share/rollcall")
            });

        let strategy = std::env::var("ROLLCALL_CAPTURE_STRATEGY")
            .ok()
            .and_then(|s| CaptureStrategy::parse(&s))
            .unwrap_or(CaptureStrategy::RawStream);

        Self {
            camera_index: env_u32("ROLLCALL_CAMERA_INDEX", 0),
            capture_strategy: strategy,
            capture_width: env_u32("ROLLCALL_CAPTURE_WIDTH", 640),
            capture_height: env_u32("ROLLCALL_CAPTURE_HEIGHT", 480),
            capture_timeout: Duration::from_millis(env_u64("ROLLCALL_CAPTURE_TIMEOUT_MS", 4000)),
            capture_backoff: Duration::from_millis(env_u64("ROLLCALL_CAPTURE_BACKOFF_MS", 1000)),
            loop_interval: Duration::from_millis(env_u64("ROLLCALL_LOOP_INTERVAL_MS", 50)),
            corpus_dir: std::env::var("ROLLCALL_CORPUS_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("corpus")),
            model_path: std::env::var("ROLLCALL_MODEL_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("model.json")),
            train_status_path: std::env::var("ROLLCALL_TRAIN_STATUS_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("train_status.json")),
            db_path: std::env::var("ROLLCALL_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|_| data_dir.join("attendance.db")),
            confidence_threshold: env_f32("ROLLCALL_CONFIDENCE_THRESHOLD", 0.5),
            cooldown_success: Duration::from_secs(env_u64("ROLLCALL_COOLDOWN_SUCCESS_SECS", 5)),
            cooldown_duplicate: Duration::from_secs(env_u64("ROLLCALL_COOLDOWN_DUPLICATE_SECS", 5)),
            cooldown_unknown: Duration::from_secs(env_u64("ROLLCALL_COOLDOWN_UNKNOWN_SECS", 3)),
            alignment_delay: Duration::from_secs(env_u64("ROLLCALL_ALIGNMENT_DELAY_SECS", 10)),
            enroll_samples: env_usize("ROLLCALL_ENROLL_SAMPLES", 50),
            enroll_interval: Duration::from_millis(env_u64("ROLLCALL_ENROLL_INTERVAL_MS", 100)),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
