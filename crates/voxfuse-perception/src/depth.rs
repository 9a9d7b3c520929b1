//! Strict depth-image decoding.
//!
//! The pipeline accepts exactly one pixel encoding for inbound depth frames.
//! Anything else – a different encoding, or a buffer that does not match the
//! claimed geometry – is rejected rather than reinterpreted, so a
//! misconfigured camera fails loudly instead of fusing garbage.

use voxfuse_types::{DepthFrame, DepthMap, FusionError, PixelEncoding};

/// Validates and decodes raw depth frames into [`DepthMap`]s.
#[derive(Debug, Clone, Copy)]
pub struct FrameConverter {
    expected: PixelEncoding,
}

impl FrameConverter {
    /// A converter that accepts only `expected` (the pipeline uses
    /// [`PixelEncoding::Mono16`]).
    pub fn new(expected: PixelEncoding) -> Self {
        Self { expected }
    }

    /// Decode `frame` into a fresh [`DepthMap`].  The input is never mutated.
    ///
    /// # Errors
    ///
    /// - [`FusionError::UnsupportedEncoding`] when the frame claims any
    ///   encoding other than the expected one.
    /// - [`FusionError::CorruptBuffer`] when the buffer length does not match
    ///   `cols * rows` samples of the expected encoding.
    pub fn convert(&self, frame: &DepthFrame) -> Result<DepthMap, FusionError> {
        if frame.encoding != self.expected {
            return Err(FusionError::UnsupportedEncoding {
                expected: self.expected,
                actual: frame.encoding,
            });
        }

        let expected_len = frame.cols as usize * frame.rows as usize * 2;
        if frame.data.len() != expected_len {
            return Err(FusionError::CorruptBuffer {
                expected: expected_len,
                actual: frame.data.len(),
            });
        }

        let depths = frame
            .data
            .chunks_exact(2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .collect();

        Ok(DepthMap {
            cols: frame.cols,
            rows: frame.rows,
            depths,
        })
    }
}

impl Default for FrameConverter {
    fn default() -> Self {
        Self::new(PixelEncoding::Mono16)
    }
}
