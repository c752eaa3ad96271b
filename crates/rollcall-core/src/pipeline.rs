//! Detection + embedding as one step: RGB raster in, face encodings out.

use crate::detector::{DetectorError, FaceDetector};
use crate::recognizer::{FaceRecognizer, RecognizerError};
use crate::types::FaceEncoding;
use std::path::Path;
use thiserror::Error;

pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
}

/// Locates every face in a packed RGB raster and computes its embedding.
///
/// Results are ordered by detector confidence, highest first.
pub trait FaceEncoder {
    fn encode(&mut self, rgb: &[u8], width: u32, height: u32)
        -> Result<Vec<FaceEncoding>, EncodeError>;
}

/// SCRFD + ArcFace running on ONNX Runtime.
pub struct OnnxFaceEncoder {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceEncoder {
    /// Load both models from `model_dir`. Fails fast if either is missing.
    pub fn load(model_dir: &Path) -> Result<Self, EncodeError> {
        let scrfd = model_dir.join(SCRFD_MODEL_FILE);
        let arcface = model_dir.join(ARCFACE_MODEL_FILE);
        let detector = FaceDetector::load(&scrfd.to_string_lossy())?;
        let recognizer = FaceRecognizer::load(&arcface.to_string_lossy())?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceEncoder for OnnxFaceEncoder {
    fn encode(
        &mut self,
        rgb: &[u8],
        width: u32,
        height: u32,
    ) -> Result<Vec<FaceEncoding>, EncodeError> {
        let faces = self.detector.detect(rgb, width, height)?;
        tracing::trace!(count = faces.len(), width, height, "faces detected");

        let mut encodings = Vec::with_capacity(faces.len());
        for bbox in faces {
            let embedding = self.recognizer.extract(rgb, width, height, &bbox)?;
            encodings.push(FaceEncoding { bbox, embedding });
        }
        Ok(encodings)
    }
}
