//! facegate-core: face authorization engine.
//!
//! Validates a probe photo, extracts face embeddings through a pluggable
//! [`FaceAnalyzer`], and matches them against a gallery of enrolled faces
//! to produce an accept/reject decision.

pub mod analyzer;
pub mod authorizer;
pub mod config;
pub mod extractor;
pub mod gallery;
pub mod matcher;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod types;
pub mod validator;

pub use analyzer::{AnalyzerError, FaceAnalyzer};
pub use authorizer::{Authorizer, ErrorKind, VerificationResult, VerifyError};
pub use config::{BusKind, Config, ConfigError, DBUS_NAME, DBUS_PATH};
pub use extractor::{EmbeddingExtractor, Extraction, ExtractionError};
pub use gallery::{
    list_enrollment_files, load_gallery, Gallery, GalleryEntry, GalleryLoad, GalleryWarning,
    GalleryWarningKind,
};
pub use matcher::{EuclideanMatcher, MatchOutcome, Matcher, ARCFACE_TOLERANCE, DEFAULT_TOLERANCE};
pub use types::{BoundingBox, Embedding, FaceAnalysis};
pub use validator::{is_allowed_file, ImageSource, ImageValidator, NormalizedImage, ValidationError};

#[cfg(feature = "onnx")]
pub use onnx::OnnxFaceAnalyzer;

/// The analyzer binaries use: the ONNX backend when compiled in.
#[cfg(feature = "onnx")]
pub fn default_analyzer(config: &Config) -> Result<Box<dyn FaceAnalyzer + Send>, AnalyzerError> {
    Ok(Box::new(OnnxFaceAnalyzer::load(
        &config.scrfd_model_path(),
        &config.arcface_model_path(),
    )?))
}

/// The analyzer binaries use: the ONNX backend when compiled in.
#[cfg(not(feature = "onnx"))]
pub fn default_analyzer(_config: &Config) -> Result<Box<dyn FaceAnalyzer + Send>, AnalyzerError> {
    Err(AnalyzerError::Unavailable(
        "facegate was built without the `onnx` feature".into(),
    ))
}
