use serde::{Deserialize, Serialize};

/// Side length of the normalized face crop. The embedding dimension is
/// tied to it; a classifier trained at one crop size is invalid for any
/// other.
pub const CROP_SIZE: u32 = 32;

/// Fixed face-signature dimension: a flattened CROP_SIZE x CROP_SIZE
/// grayscale crop.
pub const EMBEDDING_DIM: usize = (CROP_SIZE * CROP_SIZE) as usize;

/// Pixel-space bounding box for a detected face region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl FaceRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Fixed-length face signature: a [0,1]-normalized flattened crop.
/// Immutable once produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FaceEmbedding {
    values: Vec<f32>,
}

impl FaceEmbedding {
    /// Wrap raw values. Dimension mismatch here is a contract violation
    /// between extractor and caller, so it is asserted, not returned.
    pub fn new(values: Vec<f32>) -> Self {
        assert_eq!(
            values.len(),
            EMBEDDING_DIM,
            "face embedding must be {EMBEDDING_DIM}-dimensional"
        );
        Self { values }
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }
}

/// Classifier verdict for one embedding.
///
/// `confidence` is a relative class-membership score in [0,1], not a
/// calibrated probability; only its ordering and a fixed threshold are
/// meaningful.
#[derive(Debug, Clone)]
pub struct Classification {
    /// Opaque identity token (corpus folder name / user id).
    pub identity: String,
    pub confidence: f32,
}

/// Contract for the pluggable face-detection algorithm.
///
/// Implementations must be deterministic for a given input buffer so
/// extraction stays reproducible under test.
pub trait FaceDetector: Send + Sync {
    /// Return zero or more candidate face regions in a grayscale frame.
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_area() {
        let r = FaceRegion { x: 0, y: 0, width: 10, height: 20 };
        assert_eq!(r.area(), 200);
    }

    #[test]
    fn test_embedding_accepts_correct_dim() {
        let e = FaceEmbedding::new(vec![0.5; EMBEDDING_DIM]);
        assert_eq!(e.values().len(), EMBEDDING_DIM);
    }

    #[test]
    #[should_panic(expected = "face embedding must be")]
    fn test_embedding_rejects_wrong_dim() {
        let _ = FaceEmbedding::new(vec![0.5; EMBEDDING_DIM - 1]);
    }
}
