//! ONNX Runtime face analyzer: SCRFD detection + ArcFace recognition.

mod alignment;
mod detector;
mod recognizer;

pub use detector::FaceDetector;
pub use recognizer::FaceRecognizer;

use crate::analyzer::{AnalyzerError, FaceAnalyzer};
use crate::types::FaceAnalysis;
use image::RgbImage;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OnnxError {
    #[error("model file not found: {0} (download from insightface and place in the model directory)")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("face has no landmarks; detector must return landmarks for alignment")]
    NoLandmarks,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

impl From<OnnxError> for AnalyzerError {
    fn from(e: OnnxError) -> Self {
        match e {
            OnnxError::ModelNotFound(path) => AnalyzerError::ModelNotFound(path),
            other => AnalyzerError::InferenceFailed(other.to_string()),
        }
    }
}

/// [`FaceAnalyzer`] backed by the SCRFD and ArcFace ONNX models.
pub struct OnnxFaceAnalyzer {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
}

impl OnnxFaceAnalyzer {
    pub fn load(scrfd_path: &Path, arcface_path: &Path) -> Result<Self, OnnxError> {
        let detector = FaceDetector::load(scrfd_path)?;
        let recognizer = FaceRecognizer::load(arcface_path)?;
        Ok(Self {
            detector,
            recognizer,
        })
    }
}

impl FaceAnalyzer for OnnxFaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<FaceAnalysis, AnalyzerError> {
        let regions = self.detector.detect(image)?;
        let mut embeddings = Vec::with_capacity(regions.len());
        for face in &regions {
            embeddings.push(self.recognizer.extract(image, face)?);
        }
        Ok(FaceAnalysis {
            regions,
            embeddings,
        })
    }
}
