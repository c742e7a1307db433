//! rollcall-core — Face signature extraction, classification, training.
//!
//! The concrete vision algorithm is pluggable behind [`FaceDetector`];
//! the crate ships a deterministic local-contrast detector, the fixed
//! crop/normalize extraction pipeline, a nearest-centroid classifier
//! with atomic persistence, and the background training job.

pub mod classifier;
pub mod detector;
pub mod extractor;
pub mod trainer;
pub mod types;

pub use classifier::{ClassifierModel, ModelError};
pub use detector::VarianceDetector;
pub use extractor::FaceExtractor;
pub use trainer::{train_classifier, TrainerError, TrainingOutcome};
pub use types::{Classification, FaceDetector, FaceEmbedding, FaceRegion, EMBEDDING_DIM};
