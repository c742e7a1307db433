//! Nearest-centroid face classifier with atomic model persistence.
//!
//! One centroid per enrolled identity, fitted from extracted signatures.
//! Confidence is the softmax-normalized cosine-similarity share of the
//! winning class: a relative membership score in [0,1], not a
//! calibrated probability.

use crate::types::{Classification, FaceEmbedding};
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Sharpness of the similarity-to-confidence mapping. Cosine scores
/// live in [-1,1]; dividing by this before the softmax spreads them out.
const SOFTMAX_TEMPERATURE: f32 = 0.05;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("model serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Trained classifier artifact. Opaque and versionless on disk; each
/// successful training run replaces it wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierModel {
    dim: usize,
    /// Class order is first-encountered during fitting. Tie-breaks on
    /// equal scores resolve to the earliest class in this ordering —
    /// stable within one loaded model, implementation-defined across
    /// retrains.
    classes: Vec<String>,
    centroids: Vec<Vec<f32>>,
}

impl ClassifierModel {
    /// Fit one centroid per identity from labeled signatures.
    ///
    /// Panics on an empty sample set or mixed embedding dimensions;
    /// both are caller contract violations (the training job filters
    /// its corpus before fitting).
    pub fn fit(samples: &[(FaceEmbedding, String)]) -> Self {
        assert!(!samples.is_empty(), "cannot fit a classifier on zero samples");
        let dim = samples[0].0.values().len();

        let mut classes: Vec<String> = Vec::new();
        let mut sums: Vec<Array1<f32>> = Vec::new();
        let mut counts: Vec<usize> = Vec::new();

        for (emb, label) in samples {
            assert_eq!(emb.values().len(), dim, "mixed embedding dimensions in training set");
            let idx = match classes.iter().position(|c| c == label) {
                Some(idx) => idx,
                None => {
                    classes.push(label.clone());
                    sums.push(Array1::zeros(dim));
                    counts.push(0);
                    classes.len() - 1
                }
            };
            sums[idx] += &ArrayView1::from(emb.values());
            counts[idx] += 1;
        }

        let centroids = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &n)| (sum / n as f32).to_vec())
            .collect();

        tracing::info!(classes = classes.len(), samples = samples.len(), "fitted classifier");
        Self { dim, classes, centroids }
    }

    /// Classify a signature against the enrolled identities.
    ///
    /// A dimension mismatch is a contract violation between extractor
    /// and model, so it panics rather than surfacing per-request.
    pub fn predict(&self, emb: &FaceEmbedding) -> Classification {
        assert_eq!(
            emb.values().len(),
            self.dim,
            "embedding dimension {} does not match model dimension {}",
            emb.values().len(),
            self.dim
        );

        let probe = ArrayView1::from(emb.values());
        let probe_norm = probe.dot(&probe).sqrt();

        let scores: Vec<f32> = self
            .centroids
            .iter()
            .map(|c| {
                let centroid = ArrayView1::from(c.as_slice());
                let denom = probe_norm * centroid.dot(&centroid).sqrt();
                if denom > 0.0 { probe.dot(&centroid) / denom } else { 0.0 }
            })
            .collect();

        // Softmax share of the best class; strict > keeps the first
        // class on ties.
        let best = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        let exps: Vec<f32> = scores
            .iter()
            .map(|s| ((s - best) / SOFTMAX_TEMPERATURE).exp())
            .collect();
        let total: f32 = exps.iter().sum();

        let mut best_idx = 0;
        for (i, s) in scores.iter().enumerate() {
            if *s > scores[best_idx] {
                best_idx = i;
            }
        }

        Classification {
            identity: self.classes[best_idx].clone(),
            confidence: exps[best_idx] / total,
        }
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Load a persisted model. Missing or unreadable files mean
    /// "untrained" — a normal state, not an error.
    pub fn load(path: &Path) -> Option<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "model file unreadable; treating as untrained");
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(model) => Some(model),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "model file corrupt; treating as untrained");
                None
            }
        }
    }

    /// Persist atomically: write a sibling temp file, then rename over
    /// the destination. A crashed training run never leaves a
    /// half-written model in place.
    pub fn save(&self, path: &Path) -> Result<(), ModelError> {
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp, path)?;
        tracing::info!(path = %path.display(), classes = self.classes.len(), "model persisted");
        Ok(())
    }
}
