//! The authorization pipeline: validate → extract → face-count gate → match.
//!
//! [`Authorizer::verify`] always returns a [`VerificationResult`]; every
//! failure along the way, including a panic in the capability or matcher,
//! is turned into a denial with a human-readable message.

use crate::analyzer::FaceAnalyzer;
use crate::extractor::{EmbeddingExtractor, ExtractionError};
use crate::gallery::{self, Gallery, GalleryLoad};
use crate::matcher::{EuclideanMatcher, MatchOutcome, Matcher, DEFAULT_TOLERANCE};
use crate::validator::{ImageSource, ImageValidator, ValidationError};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use thiserror::Error;

pub const MSG_NO_FACE: &str = "No face detected in the image";
pub const MSG_MULTIPLE_FACES: &str =
    "Multiple faces detected. Please upload an image with a single face";
pub const MSG_EMPTY_GALLERY: &str = "No authorized faces available for comparison";
const MSG_INTERNAL_PREFIX: &str = "Error during face verification";

/// Why a verification did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    UnsupportedFormat,
    InsufficientResolution,
    DetectionFailure,
    NoFaceDetected,
    MultipleFacesDetected,
    EmptyGallery,
    InternalError,
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Extraction(#[from] ExtractionError),
    #[error("No face detected in the image")]
    NoFaceDetected,
    #[error("Multiple faces detected. Please upload an image with a single face")]
    MultipleFacesDetected(usize),
    #[error("timed out after {0}s")]
    TimedOut(u64),
    #[error("{0}")]
    Internal(String),
}

impl VerifyError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            VerifyError::Validation(ValidationError::UnsupportedFormat(_)) => {
                ErrorKind::UnsupportedFormat
            }
            VerifyError::Validation(ValidationError::InsufficientResolution { .. }) => {
                ErrorKind::InsufficientResolution
            }
            VerifyError::Validation(ValidationError::Decode { .. }) | VerifyError::Extraction(_) => {
                ErrorKind::DetectionFailure
            }
            VerifyError::Validation(ValidationError::Io { .. })
            | VerifyError::TimedOut(_)
            | VerifyError::Internal(_) => ErrorKind::InternalError,
            VerifyError::NoFaceDetected => ErrorKind::NoFaceDetected,
            VerifyError::MultipleFacesDetected(_) => ErrorKind::MultipleFacesDetected,
        }
    }

    /// The message shown to the person at the door.
    ///
    /// Precondition failures use their own text; faults inside the pipeline
    /// are prefixed with "Error during face verification".
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::UnsupportedFormat
            | ErrorKind::InsufficientResolution
            | ErrorKind::NoFaceDetected
            | ErrorKind::MultipleFacesDetected
            | ErrorKind::EmptyGallery => self.to_string(),
            ErrorKind::DetectionFailure | ErrorKind::InternalError => {
                format!("{MSG_INTERNAL_PREFIX}: {self}")
            }
        }
    }
}

/// Outcome of one verify call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub authorized: bool,
    pub message: String,
    /// Fraction in [0, 1]; set on success.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    /// Distance to the best (or closest) gallery entry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub matched_source: Option<String>,
    /// Set when the call was rejected before a comparison could be made.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
}

impl VerificationResult {
    fn rejected(message: String, error: ErrorKind) -> Self {
        Self {
            authorized: false,
            message,
            confidence: None,
            distance: None,
            matched_source: None,
            error: Some(error),
        }
    }

    pub fn from_error(err: &VerifyError) -> Self {
        Self::rejected(err.user_message(), err.kind())
    }

    pub fn from_outcome(outcome: MatchOutcome) -> Self {
        match outcome {
            MatchOutcome::EmptyGallery => {
                Self::rejected(MSG_EMPTY_GALLERY.to_string(), ErrorKind::EmptyGallery)
            }
            MatchOutcome::Authorized {
                source_file_name,
                distance,
                confidence,
                ..
            } => Self {
                authorized: true,
                message: format!("Access Granted (Confidence: {:.2}%)", confidence * 100.0),
                confidence: Some(confidence),
                distance: Some(distance),
                matched_source: Some(source_file_name),
                error: None,
            },
            MatchOutcome::Denied {
                closest_distance, ..
            } => {
                // No comparable entry (e.g. every embedding had another dimension).
                let distance = closest_distance.is_finite().then_some(closest_distance);
                let message = match distance {
                    Some(d) => format!("Access Denied (Best match distance: {d:.2})"),
                    None => "Access Denied".to_string(),
                };
                Self {
                    authorized: false,
                    message,
                    confidence: None,
                    distance,
                    matched_source: None,
                    error: None,
                }
            }
        }
    }

    /// Short spoken/printed form: "Access Granted" or "Access Denied".
    pub fn verdict(&self) -> &'static str {
        if self.authorized {
            "Access Granted"
        } else {
            "Access Denied"
        }
    }
}

/// Composes validator, extractor and matcher into a single verify call.
pub struct Authorizer<A, M = EuclideanMatcher> {
    validator: ImageValidator,
    extractor: EmbeddingExtractor<A>,
    matcher: M,
    tolerance: f32,
}

impl<A: FaceAnalyzer> Authorizer<A, EuclideanMatcher> {
    pub fn new(analyzer: A) -> Self {
        Self::with_matcher(analyzer, EuclideanMatcher)
    }
}

impl<A: FaceAnalyzer, M: Matcher> Authorizer<A, M> {
    pub fn with_matcher(analyzer: A, matcher: M) -> Self {
        Self {
            validator: ImageValidator::default(),
            extractor: EmbeddingExtractor::new(analyzer),
            matcher,
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_validator(mut self, validator: ImageValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn tolerance(&self) -> f32 {
        self.tolerance
    }

    pub fn validator(&self) -> &ImageValidator {
        &self.validator
    }

    /// Build the gallery from an enrollment directory. Never fails.
    pub fn load_gallery(&mut self, dir: &Path) -> GalleryLoad {
        match panic::catch_unwind(AssertUnwindSafe(|| {
            gallery::load_gallery(dir, &self.validator, &mut self.extractor)
        })) {
            Ok(load) => load,
            Err(_) => {
                tracing::error!(dir = %dir.display(), "gallery load panicked; continuing with empty gallery");
                GalleryLoad::default()
            }
        }
    }

    /// Verify a probe image against the gallery.
    pub fn verify(&mut self, source: &ImageSource, gallery: &Gallery) -> VerificationResult {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.try_verify(source, gallery)));

        let result = match outcome {
            Ok(Ok(outcome)) => VerificationResult::from_outcome(outcome),
            Ok(Err(err)) => VerificationResult::from_error(&err),
            Err(_) => VerificationResult::from_error(&VerifyError::Internal(
                "verification pipeline panicked".into(),
            )),
        };

        tracing::info!(
            image = %source.name(),
            authorized = result.authorized,
            message = %result.message,
            "verification finished"
        );
        result
    }

    /// The pipeline with failures as errors instead of denials.
    pub fn try_verify(
        &mut self,
        source: &ImageSource,
        gallery: &Gallery,
    ) -> Result<MatchOutcome, VerifyError> {
        let normalized = self.validator.validate(source)?;
        let extraction = self.extractor.extract(&normalized)?;

        let probe = match extraction.face_count {
            0 => return Err(VerifyError::NoFaceDetected),
            1 => extraction
                .single()
                .ok_or_else(|| VerifyError::Internal("missing embedding for detected face".into()))?,
            n => return Err(VerifyError::MultipleFacesDetected(n)),
        };

        Ok(self.matcher.compare(probe, gallery, self.tolerance))
    }
}
