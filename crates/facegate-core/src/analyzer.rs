//! Face detection + embedding capability.
//!
//! The engine never looks inside a detector or recognizer; it only sees the
//! regions and embeddings an implementation reports for an RGB image.

use crate::types::FaceAnalysis;
use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AnalyzerError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("no face analysis backend available: {0}")]
    Unavailable(String),
}

/// Detect faces in an image and embed each of them.
///
/// Implementations may hold inference sessions that require exclusive
/// access, hence `&mut self`.
pub trait FaceAnalyzer {
    fn analyze(&mut self, image: &RgbImage) -> Result<FaceAnalysis, AnalyzerError>;
}

impl<T: FaceAnalyzer + ?Sized> FaceAnalyzer for Box<T> {
    fn analyze(&mut self, image: &RgbImage) -> Result<FaceAnalysis, AnalyzerError> {
        (**self).analyze(image)
    }
}
