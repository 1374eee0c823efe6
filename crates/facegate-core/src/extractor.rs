//! Embedding extraction around a [`FaceAnalyzer`].
//!
//! Capability errors and panics are contained here and reported as
//! [`ExtractionError::DetectionFailure`], so a single bad image never takes
//! down a batch load or a verify call.

use crate::analyzer::FaceAnalyzer;
use crate::types::Embedding;
use crate::validator::NormalizedImage;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("face detection failed: {0}")]
    DetectionFailure(String),
}

/// Faces found in one image.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub face_count: usize,
    pub embeddings: Vec<Embedding>,
}

impl Extraction {
    /// The embedding of the only face, if exactly one was found.
    pub fn single(&self) -> Option<&Embedding> {
        if self.face_count == 1 {
            self.embeddings.first()
        } else {
            None
        }
    }
}

pub struct EmbeddingExtractor<A> {
    analyzer: A,
}

impl<A: FaceAnalyzer> EmbeddingExtractor<A> {
    pub fn new(analyzer: A) -> Self {
        Self { analyzer }
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn extract(&mut self, image: &NormalizedImage) -> Result<Extraction, ExtractionError> {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.analyzer.analyze(&image.image)));

        let analysis = match outcome {
            Ok(Ok(analysis)) => analysis,
            Ok(Err(e)) => {
                tracing::warn!(image = %image.source_name, error = %e, "face analysis failed");
                return Err(ExtractionError::DetectionFailure(e.to_string()));
            }
            Err(payload) => {
                let reason = panic_message(payload.as_ref());
                tracing::error!(image = %image.source_name, reason = %reason, "face analyzer panicked");
                return Err(ExtractionError::DetectionFailure(format!(
                    "analyzer panicked: {reason}"
                )));
            }
        };

        let face_count = analysis.face_count();
        if analysis.embeddings.len() < face_count {
            return Err(ExtractionError::DetectionFailure(format!(
                "analyzer reported {face_count} face(s) but {} embedding(s)",
                analysis.embeddings.len()
            )));
        }

        tracing::debug!(image = %image.source_name, face_count, "faces extracted");

        Ok(Extraction {
            face_count,
            embeddings: analysis.embeddings,
        })
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerError;
    use crate::types::{BoundingBox, FaceAnalysis};
    use image::RgbImage;

    enum Behavior {
        Faces(usize),
        Fail,
        Panic,
        Truncated,
    }

    struct FakeAnalyzer(Behavior);

    fn region() -> BoundingBox {
        BoundingBox {
            x: 0.0,
            y: 0.0,
            width: 20.0,
            height: 20.0,
            confidence: 0.99,
            landmarks: None,
        }
    }

    impl FaceAnalyzer for FakeAnalyzer {
        fn analyze(&mut self, _image: &RgbImage) -> Result<FaceAnalysis, AnalyzerError> {
            match self.0 {
                Behavior::Faces(n) => Ok(FaceAnalysis {
                    regions: (0..n).map(|_| region()).collect(),
                    embeddings: (0..n).map(|i| Embedding::new(vec![i as f32, 1.0])).collect(),
                }),
                Behavior::Fail => Err(AnalyzerError::InferenceFailed("bad tensor".into())),
                Behavior::Panic => panic!("session poisoned"),
                Behavior::Truncated => Ok(FaceAnalysis {
                    regions: vec![region(), region()],
                    embeddings: vec![Embedding::new(vec![0.0])],
                }),
            }
        }
    }

    fn image() -> NormalizedImage {
        NormalizedImage {
            source_name: "probe.png".into(),
            image: RgbImage::new(64, 64),
            converted: false,
        }
    }

    #[test]
    fn test_single_face() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Faces(1)));
        let extraction = extractor.extract(&image()).unwrap();
        assert_eq!(extraction.face_count, 1);
        assert_eq!(extraction.single().map(|e| e.values.clone()), Some(vec![0.0, 1.0]));
    }

    #[test]
    fn test_no_single_when_many_faces() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Faces(3)));
        let extraction = extractor.extract(&image()).unwrap();
        assert_eq!(extraction.face_count, 3);
        assert_eq!(extraction.embeddings.len(), 3);
        assert!(extraction.single().is_none());
    }

    #[test]
    fn test_zero_faces() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Faces(0)));
        let extraction = extractor.extract(&image()).unwrap();
        assert_eq!(extraction.face_count, 0);
        assert!(extraction.single().is_none());
    }

    #[test]
    fn test_analyzer_error_is_detection_failure() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Fail));
        let err = extractor.extract(&image()).unwrap_err();
        assert_eq!(err.to_string(), "face detection failed: inference failed: bad tensor");
    }

    #[test]
    fn test_analyzer_panic_is_contained() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Panic));
        let ExtractionError::DetectionFailure(msg) = extractor.extract(&image()).unwrap_err();
        assert!(msg.contains("session poisoned"), "got {msg}");
    }

    #[test]
    fn test_missing_embeddings_rejected() {
        let mut extractor = EmbeddingExtractor::new(FakeAnalyzer(Behavior::Truncated));
        assert!(extractor.extract(&image()).is_err());
    }
}
