//! Background training job: walk the enrollment corpus, extract face
//! signatures, fit the classifier, persist atomically.
//!
//! The job never partially overwrites a working model: an empty corpus
//! terminates before any write, and persistence is write-then-rename.

use crate::classifier::{ClassifierModel, ModelError};
use crate::extractor::FaceExtractor;
use crate::types::FaceEmbedding;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Share of the progress bar spent on signature extraction; the
/// remainder covers fitting and persistence.
const EXTRACTION_PROGRESS_SPAN: usize = 80;
const FITTING_PROGRESS: u8 = 85;

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum TrainerError {
    #[error("failed to read corpus directory {path}: {source}")]
    CorpusUnreadable {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Persist(#[from] ModelError),
}

/// Summary of a completed training run.
#[derive(Debug, Clone, Copy)]
pub struct TrainingOutcome {
    pub identities: usize,
    pub samples: usize,
    /// False when the corpus yielded no extractable samples and the
    /// prior model (if any) was left untouched.
    pub trained: bool,
}

/// Progress reporting callback: (percent 0–100, human-readable message).
pub type ProgressFn<'a> = &'a (dyn Fn(u8, &str) + Send + Sync);

/// Run one training pass over `corpus_dir`.
///
/// Each subdirectory is one identity; its raster images are decoded and
/// pushed through the extractor. Images with no detectable face are
/// skipped silently — that is a property of the corpus, not an error.
pub fn train_classifier(
    corpus_dir: &Path,
    extractor: &FaceExtractor,
    model_path: &Path,
    progress: ProgressFn,
) -> Result<TrainingOutcome, TrainerError> {
    let identity_dirs = list_identity_dirs(corpus_dir)?;
    let total = identity_dirs.len();
    tracing::info!(corpus = %corpus_dir.display(), identities = total, "training started");

    let mut samples: Vec<(FaceEmbedding, String)> = Vec::new();
    for (processed, dir) in identity_dirs.iter().enumerate() {
        let identity = dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let before = samples.len();
        collect_identity_samples(dir, &identity, extractor, &mut samples);
        tracing::debug!(
            identity,
            extracted = samples.len() - before,
            "processed identity folder"
        );

        let pct = ((processed + 1) * EXTRACTION_PROGRESS_SPAN / total) as u8;
        progress(pct, &format!("Processed {}/{} identities", processed + 1, total));
    }

    if samples.is_empty() {
        tracing::warn!(corpus = %corpus_dir.display(), "no extractable training samples");
        progress(0, "No training data found");
        return Ok(TrainingOutcome {
            identities: total,
            samples: 0,
            trained: false,
        });
    }

    progress(FITTING_PROGRESS, "Fitting classifier");
    let model = ClassifierModel::fit(&samples);
    model.save(model_path)?;
    progress(100, "Training complete");

    Ok(TrainingOutcome {
        identities: model.classes().len(),
        samples: samples.len(),
        trained: true,
    })
}

/// Identity folders, sorted by name for reproducible progress and
/// class ordering.
fn list_identity_dirs(corpus_dir: &Path) -> Result<Vec<PathBuf>, TrainerError> {
    let entries = std::fs::read_dir(corpus_dir).map_err(|source| TrainerError::CorpusUnreadable {
        path: corpus_dir.to_path_buf(),
        source,
    })?;

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();
    dirs.sort();
    Ok(dirs)
}

fn collect_identity_samples(
    dir: &Path,
    identity: &str,
    extractor: &FaceExtractor,
    samples: &mut Vec<(FaceEmbedding, String)>,
) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        tracing::warn!(dir = %dir.display(), "identity folder unreadable; skipping");
        return;
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| has_image_extension(p))
        .collect();
    files.sort();

    for path in files {
        let img = match image::open(&path) {
            Ok(img) => img.to_luma8(),
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "undecodable corpus image skipped");
                continue;
            }
        };
        let (w, h) = (img.width(), img.height());
        if let Some(emb) = extractor.extract(img.as_raw(), w, h) {
            samples.push((emb, identity.to_string()));
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceDetector, FaceRegion};
    use image::GrayImage;
    use std::sync::Mutex;

    /// Treats the whole frame as one face, so every decodable image
    /// yields a sample.
    struct FullFrameDetector;

    impl FaceDetector for FullFrameDetector {
        fn detect(&self, _gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
            vec![FaceRegion { x: 0, y: 0, width, height }]
        }
    }

    /// Never finds a face.
    struct BlindDetector;

    impl FaceDetector for BlindDetector {
        fn detect(&self, _gray: &[u8], _w: u32, _h: u32) -> Vec<FaceRegion> {
            Vec::new()
        }
    }

    fn write_corpus_image(dir: &Path, name: &str, seed: u8) {
        let img = GrayImage::from_fn(48, 48, |x, y| {
            image::Luma([((x * 3 + y * 5) as u8).wrapping_add(seed)])
        });
        img.save(dir.join(name)).unwrap();
    }

    fn run(
        corpus: &Path,
        model: &Path,
        detector: Box<dyn FaceDetector>,
    ) -> (Result<TrainingOutcome, TrainerError>, Vec<(u8, String)>) {
        let extractor = FaceExtractor::new(detector);
        let calls = Mutex::new(Vec::new());
        let result = train_classifier(corpus, &extractor, model, &|p, m| {
            calls.lock().unwrap().push((p, m.to_string()));
        });
        (result, calls.into_inner().unwrap())
    }

    #[test]
    fn test_training_fits_and_persists_model() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["S100", "S200"] {
            let folder = dir.path().join(id);
            std::fs::create_dir(&folder).unwrap();
            for i in 0..3 {
                write_corpus_image(&folder, &format!("{i}.png"), if id == "S100" { 0 } else { 120 });
            }
        }
        let model_path = dir.path().join("model.json");

        let (result, calls) = run(dir.path(), &model_path, Box::new(FullFrameDetector));
        let outcome = result.unwrap();
        assert!(outcome.trained);
        assert_eq!(outcome.identities, 2);
        assert_eq!(outcome.samples, 6);

        let model = ClassifierModel::load(&model_path).unwrap();
        assert_eq!(model.classes(), &["S100".to_string(), "S200".to_string()]);

        assert!(calls.iter().any(|(p, _)| *p == FITTING_PROGRESS));
        assert_eq!(calls.last().unwrap(), &(100, "Training complete".to_string()));
    }

    #[test]
    fn test_empty_corpus_leaves_prior_model_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let model_path = dir.path().join("model.json");
        std::fs::write(&model_path, b"prior-model-bytes").unwrap();

        let (result, calls) = run(dir.path(), &model_path, Box::new(FullFrameDetector));
        let outcome = result.unwrap();
        assert!(!outcome.trained);
        assert_eq!(std::fs::read(&model_path).unwrap(), b"prior-model-bytes");
        assert_eq!(calls.last().unwrap(), &(0, "No training data found".to_string()));
    }

    #[test]
    fn test_faceless_corpus_reports_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("S1");
        std::fs::create_dir(&folder).unwrap();
        write_corpus_image(&folder, "a.png", 7);
        let model_path = dir.path().join("model.json");

        let (result, calls) = run(dir.path(), &model_path, Box::new(BlindDetector));
        assert!(!result.unwrap().trained);
        assert!(!model_path.exists());
        assert_eq!(calls.last().unwrap().1, "No training data found");
    }

    #[test]
    fn test_undecodable_and_foreign_files_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("S1");
        std::fs::create_dir(&folder).unwrap();
        write_corpus_image(&folder, "good.png", 3);
        std::fs::write(folder.join("broken.jpg"), b"not a jpeg").unwrap();
        std::fs::write(folder.join("notes.txt"), b"ignore me").unwrap();
        let model_path = dir.path().join("model.json");

        let (result, _) = run(dir.path(), &model_path, Box::new(FullFrameDetector));
        let outcome = result.unwrap();
        assert!(outcome.trained);
        assert_eq!(outcome.samples, 1);
    }

    #[test]
    fn test_missing_corpus_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let model_path = dir.path().join("model.json");
        let (result, _) = run(&missing, &model_path, Box::new(FullFrameDetector));
        assert!(matches!(result, Err(TrainerError::CorpusUnreadable { .. })));
    }

    #[test]
    fn test_per_identity_progress_spans_extraction_budget() {
        let dir = tempfile::tempdir().unwrap();
        for id in ["a", "b", "c", "d"] {
            let folder = dir.path().join(id);
            std::fs::create_dir(&folder).unwrap();
            write_corpus_image(&folder, "0.png", 1);
        }
        let model_path = dir.path().join("model.json");

        let (_, calls) = run(dir.path(), &model_path, Box::new(FullFrameDetector));
        let extraction: Vec<u8> = calls
            .iter()
            .filter(|(_, m)| m.starts_with("Processed"))
            .map(|(p, _)| *p)
            .collect();
        assert_eq!(extraction, vec![20, 40, 60, 80]);
    }
}
