//! Frame type and pixel-format conversion.

/// A captured grayscale camera frame.
///
/// Owned by the caller that requested it; `Clone` exists so the engine
/// can publish a copy into the shared preview buffer.
#[derive(Clone)]
pub struct Frame {
    /// Grayscale pixel data (width * height bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: std::time::Instant,
}

impl Frame {
    /// Build a frame from an already-converted grayscale buffer.
    ///
    /// Fails if the buffer does not hold exactly `width * height` bytes.
    pub fn from_grayscale(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let expected = (width * height) as usize;
        if data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            timestamp: std::time::Instant::now(),
        })
    }
}

/// Extract the luma plane from planar YUV420 (I420) output.
///
/// The video capture helper emits I420: a full-resolution Y plane
/// followed by quarter-resolution U and V planes (1.5 bytes/pixel
/// total). Grayscale = the first `width * height` bytes.
pub fn yuv420_to_grayscale(yuv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = (width * height) as usize;
    let expected = pixels * 3 / 2;
    if yuv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuv.len(),
        });
    }
    Ok(yuv[..pixels].to_vec())
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid frame buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuv420_extracts_y_plane() {
        // 2x2 image: 4 Y bytes + 1 U + 1 V
        let yuv = vec![10, 20, 30, 40, 128, 128];
        let gray = yuv420_to_grayscale(&yuv, 2, 2).unwrap();
        assert_eq!(gray, vec![10, 20, 30, 40]);
    }

    #[test]
    fn test_yuv420_truncated_buffer() {
        // 2x2 needs 6 bytes, only 5 present
        let yuv = vec![10, 20, 30, 40, 128];
        assert!(yuv420_to_grayscale(&yuv, 2, 2).is_err());
    }

    #[test]
    fn test_yuv420_ignores_trailing_bytes() {
        let yuv = vec![1, 2, 3, 4, 128, 128, 99, 99];
        let gray = yuv420_to_grayscale(&yuv, 2, 2).unwrap();
        assert_eq!(gray, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_from_grayscale_length_check() {
        assert!(Frame::from_grayscale(vec![0; 4], 2, 2).is_ok());
        assert!(Frame::from_grayscale(vec![0; 3], 2, 2).is_err());
    }
}
