use serde::{Deserialize, Serialize};

/// Region of a detected face, with optional five-point landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Biometric vector for one detected face.
///
/// Immutable once produced by a [`FaceAnalyzer`](crate::FaceAnalyzer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self {
            values,
            model_version: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.values.len()
    }

    /// Euclidean distance between two embeddings. Lower = more similar.
    ///
    /// Returns `None` when the dimensions differ.
    pub fn euclidean_distance(&self, other: &Embedding) -> Option<f32> {
        if self.values.len() != other.values.len() {
            return None;
        }
        let sum: f32 = self
            .values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum();
        Some(sum.sqrt())
    }
}

/// Output of one pass of the face capability over an image.
///
/// `embeddings` follow the order of `regions`; no geometric order is implied.
#[derive(Debug, Clone, Default)]
pub struct FaceAnalysis {
    pub regions: Vec<BoundingBox>,
    pub embeddings: Vec<Embedding>,
}

impl FaceAnalysis {
    pub fn face_count(&self) -> usize {
        self.regions.len()
    }
}
