//! Face signature extraction: detect, crop, normalize, flatten.

use crate::types::{FaceDetector, FaceEmbedding, FaceRegion, CROP_SIZE};
use image::imageops::{self, FilterType};
use image::GrayImage;

/// Reduces a grayscale frame to a fixed-length face signature.
///
/// Normalization is fixed for a deployment: bilinear resize of the face
/// crop to `CROP_SIZE` square, pixel intensities scaled to [0,1]. A
/// classifier trained on this normalization is invalid for any other.
pub struct FaceExtractor {
    detector: Box<dyn FaceDetector>,
}

impl FaceExtractor {
    pub fn new(detector: Box<dyn FaceDetector>) -> Self {
        Self { detector }
    }

    /// Extract the signature of the most prominent face, or `None` when
    /// no face is found.
    ///
    /// When the detector reports several regions, the largest bounding
    /// box by area wins (first-encountered on ties), so behavior is
    /// reproducible for a deterministic detector. Pure with respect to
    /// its input.
    pub fn extract(&self, gray: &[u8], width: u32, height: u32) -> Option<FaceEmbedding> {
        assert_eq!(
            gray.len(),
            (width * height) as usize,
            "frame buffer does not match {width}x{height}"
        );

        let regions = self.detector.detect(gray, width, height);
        let face = largest_region(&regions)?;

        // Clamp to frame bounds; detectors may overshoot at the edges.
        let x = face.x.min(width.saturating_sub(1));
        let y = face.y.min(height.saturating_sub(1));
        let w = face.width.min(width - x);
        let h = face.height.min(height - y);
        if w == 0 || h == 0 {
            return None;
        }

        let img = GrayImage::from_raw(width, height, gray.to_vec())
            .expect("buffer length asserted above");
        let crop = imageops::crop_imm(&img, x, y, w, h).to_image();
        let resized = imageops::resize(&crop, CROP_SIZE, CROP_SIZE, FilterType::Triangle);

        let values = resized.into_raw().iter().map(|&p| p as f32 / 255.0).collect();
        Some(FaceEmbedding::new(values))
    }
}

fn largest_region(regions: &[FaceRegion]) -> Option<FaceRegion> {
    let mut best: Option<FaceRegion> = None;
    for r in regions {
        match best {
            Some(b) if r.area() <= b.area() => {}
            _ => best = Some(*r),
        }
    }
    best
}
