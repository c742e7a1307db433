//! Built-in local-contrast face detector.
//!
//! Production deployments are expected to plug a real detector in
//! behind the [`FaceDetector`] trait; this built-in implementation is a
//! deterministic sliding-window contrast scan that is good enough for
//! fixture-driven rigs and for bring-up without a vision model. A face
//! against the flat background of an attendance kiosk reads as a
//! high-variance window; an empty scene does not.

use crate::types::{FaceDetector, FaceRegion};

// --- Scan constants ---
/// Window side = shortest frame side divided by each of these.
const SCALE_DIVISORS: [u32; 2] = [2, 3];
/// Windows smaller than this are noise, not faces.
const MIN_WINDOW: u32 = 16;
/// Default pixel-intensity standard deviation for a candidate window.
const DEFAULT_MIN_STDDEV: f32 = 32.0;

/// Sliding-window detector keyed on local pixel variance.
pub struct VarianceDetector {
    min_stddev: f32,
}

impl VarianceDetector {
    pub fn new(min_stddev: f32) -> Self {
        Self { min_stddev }
    }
}

impl Default for VarianceDetector {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_STDDEV)
    }
}

impl FaceDetector for VarianceDetector {
    fn detect(&self, gray: &[u8], width: u32, height: u32) -> Vec<FaceRegion> {
        let w = width as usize;
        let h = height as usize;
        if w == 0 || h == 0 || gray.len() < w * h {
            return Vec::new();
        }

        let mut regions = Vec::new();
        let shortest = width.min(height);

        // Fixed scale and scan order keeps output deterministic.
        for divisor in SCALE_DIVISORS {
            let window = shortest / divisor;
            if window < MIN_WINDOW {
                continue;
            }
            let step = (window / 2).max(1);

            let mut y = 0u32;
            while y + window <= height {
                let mut x = 0u32;
                while x + window <= width {
                    if window_stddev(gray, w, x, y, window) >= self.min_stddev {
                        regions.push(FaceRegion {
                            x,
                            y,
                            width: window,
                            height: window,
                        });
                    }
                    x += step;
                }
                y += step;
            }
        }

        regions
    }
}

fn window_stddev(gray: &[u8], row_stride: usize, x: u32, y: u32, window: u32) -> f32 {
    let n = (window * window) as f32;
    let mut sum = 0.0f32;
    let mut sum_sq = 0.0f32;

    for row in y..y + window {
        let base = row as usize * row_stride + x as usize;
        for &p in &gray[base..base + window as usize] {
            let v = p as f32;
            sum += v;
            sum_sq += v * v;
        }
    }

    let mean = sum / n;
    (sum_sq / n - mean * mean).max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 64x64 flat frame with an optional high-contrast checkered patch.
    fn frame_with_patch(patch: Option<(u32, u32, u32)>) -> Vec<u8> {
        let mut gray = vec![100u8; 64 * 64];
        if let Some((px, py, side)) = patch {
            for y in py..py + side {
                for x in px..px + side {
                    gray[(y * 64 + x) as usize] = if (x + y) % 2 == 0 { 255 } else { 0 };
                }
            }
        }
        gray
    }

    #[test]
    fn test_flat_frame_yields_no_regions() {
        let gray = frame_with_patch(None);
        let regions = VarianceDetector::default().detect(&gray, 64, 64);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_patch_is_detected() {
        let gray = frame_with_patch(Some((16, 16, 32)));
        let regions = VarianceDetector::default().detect(&gray, 64, 64);
        assert!(!regions.is_empty());
        // At least one region overlaps the patch.
        assert!(regions
            .iter()
            .any(|r| r.x < 48 && r.x + r.width > 16 && r.y < 48 && r.y + r.height > 16));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let gray = frame_with_patch(Some((8, 8, 24)));
        let det = VarianceDetector::default();
        assert_eq!(det.detect(&gray, 64, 64), det.detect(&gray, 64, 64));
    }

    #[test]
    fn test_short_buffer_yields_nothing() {
        let regions = VarianceDetector::default().detect(&[0u8; 10], 64, 64);
        assert!(regions.is_empty());
    }

    #[test]
    fn test_window_stddev_flat_is_zero() {
        let gray = vec![7u8; 32 * 32];
        assert_eq!(window_stddev(&gray, 32, 0, 0, 32), 0.0);
    }
}
