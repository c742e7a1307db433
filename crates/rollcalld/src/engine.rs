//! Recognition engine: acquisition loop and pipeline state machine.
//!
//! One long-lived worker thread owns the frame source and runs until
//! the stop flag is raised. The request layer talks to it only through
//! small lock-protected values (state, latest frame, last result) and
//! the shared training status — no lock is ever held across a capture
//! or an inference call.

use crate::decider::{AttendanceDecider, Decision};
use crate::status::TrainingStatusHandle;
use chrono::Local;
use image::GrayImage;
use rollcall_core::{train_classifier, ClassifierModel, FaceExtractor};
use rollcall_hw::{FeedbackSink, Frame, FrameAcquirer};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("pipeline busy")]
    Busy,
    #[error("training already running")]
    TrainingActive,
    #[error("failed to prepare enrollment folder: {0}")]
    EnrollFolder(std::io::Error),
}

/// Pipeline phase. One authoritative value behind a mutex; both the
/// recognition trigger and enrollment capture funnel through it, so the
/// two can never run concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    /// Fixed delay giving the subject time to position their face.
    Aligning,
    /// The next acquired frame gets exactly one recognition attempt.
    Scanning,
}

/// Engine tunables, split from the daemon [`crate::config::Config`] so
/// tests can construct them directly.
pub struct EngineSettings {
    pub alignment_delay: Duration,
    pub capture_backoff: Duration,
    /// Pacing sleep per loop iteration.
    pub loop_interval: Duration,
    pub enroll_samples: usize,
    pub enroll_interval: Duration,
    pub corpus_dir: PathBuf,
    pub model_path: PathBuf,
}

/// Lazily loaded classifier. `attempted` distinguishes "not yet looked
/// at disk" from "looked and found nothing" so an untrained deployment
/// doesn't re-stat the model file on every frame.
struct ModelCache {
    attempted: bool,
    model: Option<ClassifierModel>,
}

/// State shared between the worker thread and request-layer handles.
struct EngineShared {
    state: Mutex<PipelineState>,
    latest_frame: Mutex<Option<Frame>>,
    last_result: Mutex<Option<Decision>>,
    model: Mutex<ModelCache>,
    stop: AtomicBool,
}

/// Clone-safe handle to the engine, exposed to the request layer.
#[derive(Clone)]
pub struct EngineHandle {
    shared: Arc<EngineShared>,
    settings: Arc<EngineSettings>,
    extractor: Arc<FaceExtractor>,
    feedback: Arc<dyn FeedbackSink>,
    training: Arc<TrainingStatusHandle>,
}

/// Spawn the engine on a dedicated OS thread.
///
/// Issues a camera reset first (helpers wedged by a previous process
/// must not poison the first acquisition), then enters the loop.
pub fn spawn_engine(
    settings: EngineSettings,
    source: Box<dyn FrameAcquirer>,
    extractor: Arc<FaceExtractor>,
    decider: Arc<AttendanceDecider>,
    feedback: Arc<dyn FeedbackSink>,
    training: Arc<TrainingStatusHandle>,
) -> (EngineHandle, std::thread::JoinHandle<()>) {
    let shared = Arc::new(EngineShared {
        state: Mutex::new(PipelineState::Idle),
        latest_frame: Mutex::new(None),
        last_result: Mutex::new(None),
        model: Mutex::new(ModelCache {
            attempted: false,
            model: None,
        }),
        stop: AtomicBool::new(false),
    });

    let handle = EngineHandle {
        shared: shared.clone(),
        settings: Arc::new(settings),
        extractor: extractor.clone(),
        feedback: feedback.clone(),
        training,
    };

    let worker = Worker {
        shared,
        settings: handle.settings.clone(),
        extractor,
        decider,
        feedback,
        source,
    };

    let join = std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || worker.run())
        .expect("failed to spawn engine thread");

    (handle, join)
}

impl EngineHandle {
    /// Start one recognition episode: Idle → Aligning now, Aligning →
    /// Scanning after the alignment delay. Rejected while not Idle.
    pub fn trigger(&self) -> Result<(), EngineError> {
        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != PipelineState::Idle {
                tracing::debug!(state = ?*state, "trigger rejected: busy");
                return Err(EngineError::Busy);
            }
            *state = PipelineState::Aligning;
        }
        *self.shared.last_result.lock().unwrap() = None;
        self.feedback.system_message("Get Ready", "Aligning...");
        tracing::info!("scan triggered; aligning");

        let shared = self.shared.clone();
        let delay = self.settings.alignment_delay;
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            // Unconditional: the alignment timer is the only writer
            // that can follow a trigger.
            *shared.state.lock().unwrap() = PipelineState::Scanning;
        });
        Ok(())
    }

    /// Capture enrollment images for `identity` from the shared preview
    /// buffer: align, then sample at a fixed interval into the corpus
    /// folder. Rejected while not Idle.
    pub fn enroll_capture(&self, identity: &str) -> Result<(), EngineError> {
        let folder = self.settings.corpus_dir.join(identity);
        std::fs::create_dir_all(&folder).map_err(EngineError::EnrollFolder)?;

        {
            let mut state = self.shared.state.lock().unwrap();
            if *state != PipelineState::Idle {
                tracing::debug!(state = ?*state, identity, "enrollment rejected: busy");
                return Err(EngineError::Busy);
            }
            *state = PipelineState::Aligning;
        }
        self.feedback.system_message("Enrollment", "Look at camera");
        tracing::info!(identity, "enrollment capture started");

        let shared = self.shared.clone();
        let settings = self.settings.clone();
        let feedback = self.feedback.clone();
        let identity = identity.to_string();
        std::thread::spawn(move || {
            std::thread::sleep(settings.alignment_delay);

            let mut saved = 0usize;
            let session = Local::now().timestamp_millis();
            for i in 0..settings.enroll_samples {
                if shared.stop.load(Ordering::SeqCst) {
                    break;
                }
                let frame = shared.latest_frame.lock().unwrap().clone();
                if let Some(frame) = frame {
                    let path = folder.join(format!("{session}_{i:03}.jpg"));
                    match GrayImage::from_raw(frame.width, frame.height, frame.data) {
                        Some(img) => match img.save(&path) {
                            Ok(()) => saved += 1,
                            Err(e) => {
                                tracing::warn!(path = %path.display(), error = %e, "enrollment image write failed")
                            }
                        },
                        None => tracing::warn!("preview frame buffer inconsistent; sample skipped"),
                    }
                }
                std::thread::sleep(settings.enroll_interval);
            }

            *shared.state.lock().unwrap() = PipelineState::Idle;
            feedback.system_message("Enrollment done", &format!("{saved} images"));
            tracing::info!(identity, saved, "enrollment capture finished");
        });
        Ok(())
    }

    /// Launch the background training job. Single-flight: rejected
    /// while a previous run is still active.
    pub fn start_training(&self) -> Result<(), EngineError> {
        if self.training.is_running() {
            return Err(EngineError::TrainingActive);
        }
        self.training.set(true, 0, "Starting");

        let training = self.training.clone();
        let extractor = self.extractor.clone();
        let settings = self.settings.clone();
        std::thread::Builder::new()
            .name("rollcall-train".into())
            .spawn(move || {
                let result = train_classifier(
                    &settings.corpus_dir,
                    &extractor,
                    &settings.model_path,
                    &|progress, message| training.set(true, progress, message),
                );
                match result {
                    Ok(outcome) if outcome.trained => {
                        tracing::info!(
                            identities = outcome.identities,
                            samples = outcome.samples,
                            "training finished"
                        );
                        training.set(false, 100, "Training complete");
                    }
                    Ok(_) => training.set(false, 0, "No training data found"),
                    Err(e) => {
                        tracing::error!(error = %e, "training failed");
                        training.set(false, 0, &format!("Training failed: {e}"));
                    }
                }
            })
            .expect("failed to spawn training thread");
        Ok(())
    }

    /// Drop the cached classifier so the next scan reloads from disk.
    ///
    /// Reload is deliberately explicit: finishing a training run does
    /// not swap the in-memory model behind the pipeline's back.
    pub fn reload_model(&self) {
        let mut cache = self.shared.model.lock().unwrap();
        cache.attempted = false;
        cache.model = None;
        tracing::info!("classifier reload requested");
    }

    pub fn last_result(&self) -> Option<Decision> {
        self.shared.last_result.lock().unwrap().clone()
    }

    pub fn train_status(&self) -> crate::status::TrainingStatus {
        self.training.snapshot()
    }

    pub fn state(&self) -> PipelineState {
        *self.shared.state.lock().unwrap()
    }

    /// Latest preview frame, PNG-encoded.
    pub fn preview_png(&self) -> Option<Vec<u8>> {
        let frame = self.shared.latest_frame.lock().unwrap().clone()?;
        let img = GrayImage::from_raw(frame.width, frame.height, frame.data)?;
        let mut buf = Vec::new();
        image::DynamicImage::ImageLuma8(img)
            .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .ok()?;
        Some(buf)
    }

    /// Ask the worker to exit at the top of its next iteration.
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::SeqCst);
    }
}

struct Worker {
    shared: Arc<EngineShared>,
    settings: Arc<EngineSettings>,
    extractor: Arc<FaceExtractor>,
    decider: Arc<AttendanceDecider>,
    feedback: Arc<dyn FeedbackSink>,
    source: Box<dyn FrameAcquirer>,
}

impl Worker {
    fn run(self) {
        // Helpers wedged by a previous process hold the device busy.
        self.source.reset();
        self.feedback.system_message("System Online", "Ready to Scan");
        tracing::info!("engine loop started");

        while !self.shared.stop.load(Ordering::SeqCst) {
            match self.source.acquire() {
                Ok(frame) => {
                    *self.shared.latest_frame.lock().unwrap() = Some(frame.clone());

                    if *self.shared.state.lock().unwrap() == PipelineState::Scanning {
                        let decision = self.recognize(&frame);
                        tracing::info!(decision = ?decision, "scan complete");
                        *self.shared.last_result.lock().unwrap() = Some(decision);
                        // Exactly one recognition attempt per trigger.
                        *self.shared.state.lock().unwrap() = PipelineState::Idle;
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "frame acquisition failed; resetting camera");
                    self.source.reset();
                    std::thread::sleep(self.settings.capture_backoff);
                }
            }
            std::thread::sleep(self.settings.loop_interval);
        }

        self.source.reset();
        self.feedback.system_message("System Offline", "");
        tracing::info!("engine loop exiting");
    }

    /// One recognition attempt. Every failure becomes a [`Decision`];
    /// nothing here may take the loop down.
    fn recognize(&self, frame: &Frame) -> Decision {
        let Some(embedding) = self.extractor.extract(&frame.data, frame.width, frame.height)
        else {
            return self.decider.no_face();
        };

        let Some(model) = self.classifier() else {
            return Decision::Error {
                reason: "classifier not trained".to_string(),
            };
        };

        let verdict = model.predict(&embedding);
        tracing::debug!(
            identity = %verdict.identity,
            confidence = verdict.confidence,
            "classifier verdict"
        );
        self.decider.decide(&verdict.identity, verdict.confidence, Local::now())
    }

    fn classifier(&self) -> Option<ClassifierModel> {
        let mut cache = self.shared.model.lock().unwrap();
        if !cache.attempted {
            cache.model = ClassifierModel::load(&self.settings.model_path);
            cache.attempted = true;
            match &cache.model {
                Some(m) => {
                    tracing::info!(classes = m.classes().len(), "classifier loaded")
                }
                None => tracing::warn!(
                    path = %self.settings.model_path.display(),
                    "no trained classifier on disk"
                ),
            }
        }
        cache.model.clone()
    }
}
