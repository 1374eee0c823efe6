use crate::gallery::Gallery;
use crate::types::Embedding;

/// Default match tolerance. Lower = stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.6;

/// Tolerance suited to L2-normalized ArcFace embeddings.
///
/// For unit vectors `d = sqrt(2 - 2 cos)`, so 1.1 corresponds to a cosine
/// similarity of about 0.40. [`DEFAULT_TOLERANCE`] only admits cos >= 0.82,
/// which genuine ArcFace pairs rarely reach.
pub const ARCFACE_TOLERANCE: f32 = 1.1;

/// Result of comparing one probe embedding against a gallery.
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome {
    /// There was nothing to compare against.
    EmptyGallery,
    Authorized {
        /// Gallery index of the closest entry.
        index: usize,
        source_file_name: String,
        distance: f32,
        /// `1 - distance`, clamped to [0, 1].
        confidence: f32,
    },
    Denied {
        closest_index: Option<usize>,
        /// Minimum distance over the whole gallery (`INFINITY` if no entry
        /// was comparable).
        closest_distance: f32,
    },
}

impl MatchOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, MatchOutcome::Authorized { .. })
    }
}

/// Strategy for comparing a probe embedding against a gallery of enrolled faces.
pub trait Matcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchOutcome;
}

/// Euclidean distance matcher.
///
/// Every entry is compared and tested against the tolerance on its own; no
/// early exit. The best entry is the global minimum distance, and ties go to
/// the first entry in gallery order.
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn compare(&self, probe: &Embedding, gallery: &Gallery, tolerance: f32) -> MatchOutcome {
        if gallery.is_empty() {
            return MatchOutcome::EmptyGallery;
        }

        let mut any_within_tolerance = false;
        let mut best: Option<(usize, f32)> = None;

        for (i, entry) in gallery.iter().enumerate() {
            let distance = match probe.euclidean_distance(&entry.embedding) {
                Some(d) => d,
                None => {
                    tracing::warn!(
                        file = %entry.source_file_name,
                        probe_dim = probe.dimension(),
                        entry_dim = entry.embedding.dimension(),
                        "embedding dimension mismatch; entry cannot match"
                    );
                    f32::INFINITY
                }
            };

            if distance <= tolerance {
                any_within_tolerance = true;
            }

            let is_better = match best {
                None => !distance.is_nan(),
                Some((_, best_distance)) => distance < best_distance,
            };
            if is_better {
                best = Some((i, distance));
            }
        }

        match best {
            Some((index, distance)) if any_within_tolerance => {
                let entry = &gallery.entries()[index];
                MatchOutcome::Authorized {
                    index,
                    source_file_name: entry.source_file_name.clone(),
                    distance,
                    confidence: (1.0 - distance).clamp(0.0, 1.0),
                }
            }
            _ => MatchOutcome::Denied {
                closest_index: best.map(|(i, _)| i),
                closest_distance: best.map(|(_, d)| d).unwrap_or(f32::INFINITY),
            },
        }
    }
}
