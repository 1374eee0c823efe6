//! Enrollment gallery: loading authorized faces from a directory.
//!
//! Loading never fails outright. Every file that cannot be enrolled is
//! skipped with a [`GalleryWarning`], so the result is an empty or partial
//! gallery rather than an error.

use crate::analyzer::FaceAnalyzer;
use crate::extractor::EmbeddingExtractor;
use crate::types::Embedding;
use crate::validator::{is_allowed_file, ImageSource, ImageValidator};
use serde::Serialize;
use std::fmt;
use std::path::Path;

/// One authorized face.
#[derive(Debug, Clone, Serialize)]
pub struct GalleryEntry {
    pub source_file_name: String,
    pub embedding: Embedding,
}

/// Ordered set of authorized faces.
///
/// Every entry comes from an image that contained exactly one face. The
/// gallery is built wholesale and not mutated afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Gallery {
    entries: Vec<GalleryEntry>,
}

impl Gallery {
    pub fn new(entries: Vec<GalleryEntry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, GalleryEntry> {
        self.entries.iter()
    }

    pub fn embeddings(&self) -> Vec<&Embedding> {
        self.entries.iter().map(|e| &e.embedding).collect()
    }

    pub fn source_file_names(&self) -> Vec<&str> {
        self.entries
            .iter()
            .map(|e| e.source_file_name.as_str())
            .collect()
    }
}

impl<'a> IntoIterator for &'a Gallery {
    type Item = &'a GalleryEntry;
    type IntoIter = std::slice::Iter<'a, GalleryEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GalleryWarningKind {
    DirectoryMissing,
    Unreadable(String),
    InvalidImage(String),
    DetectionFailed(String),
    NoFace,
    MultipleFaces(usize),
}

/// Why a file (or the whole directory) was left out of the gallery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GalleryWarning {
    pub file: Option<String>,
    pub reason: GalleryWarningKind,
}

impl fmt::Display for GalleryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self.file.as_deref().unwrap_or("<gallery>");
        match &self.reason {
            GalleryWarningKind::DirectoryMissing => {
                write!(f, "enrollment directory does not exist")
            }
            GalleryWarningKind::Unreadable(e) => write!(f, "{file}: unreadable: {e}"),
            GalleryWarningKind::InvalidImage(e) => write!(f, "{file}: {e}"),
            GalleryWarningKind::DetectionFailed(e) => write!(f, "{file}: {e}"),
            GalleryWarningKind::NoFace => write!(f, "{file}: no face detected"),
            GalleryWarningKind::MultipleFaces(n) => {
                write!(f, "{file}: multiple faces ({n}), enrollment needs exactly one")
            }
        }
    }
}

/// Result of one gallery load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GalleryLoad {
    pub gallery: Gallery,
    pub warnings: Vec<GalleryWarning>,
    /// Files ignored because their extension is not an image type we accept.
    pub skipped_extensions: usize,
}

/// Sorted names of the enrollable files in `dir`.
///
/// Missing or unreadable directories yield an empty list.
pub fn list_enrollment_files(dir: &Path) -> Vec<String> {
    let Ok(read_dir) = std::fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut names: Vec<String> = read_dir
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_file())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| is_allowed_file(name))
        .collect();
    names.sort();
    names
}

/// Build the gallery from every enrollable image in `dir`.
///
/// Files are processed in sorted name order so gallery order, and therefore
/// match tie-breaks, do not depend on the platform's directory listing.
pub fn load_gallery<A: FaceAnalyzer>(
    dir: &Path,
    validator: &ImageValidator,
    extractor: &mut EmbeddingExtractor<A>,
) -> GalleryLoad {
    let mut load = GalleryLoad::default();

    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!(dir = %dir.display(), "enrollment directory does not exist");
            load.warnings.push(GalleryWarning {
                file: None,
                reason: GalleryWarningKind::DirectoryMissing,
            });
            return load;
        }
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "cannot read enrollment directory");
            load.warnings.push(GalleryWarning {
                file: None,
                reason: GalleryWarningKind::Unreadable(e.to_string()),
            });
            return load;
        }
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "skipping unreadable directory entry");
                load.warnings.push(GalleryWarning {
                    file: None,
                    reason: GalleryWarningKind::Unreadable(e.to_string()),
                });
                continue;
            }
        };
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                let lossy = raw.to_string_lossy().into_owned();
                tracing::warn!(file = %lossy, "skipping file name that is not valid UTF-8");
                load.warnings.push(GalleryWarning {
                    file: Some(lossy),
                    reason: GalleryWarningKind::Unreadable("file name is not valid UTF-8".into()),
                });
                continue;
            }
        };
        // Follows symlinks, so linked photos enroll and dangling links surface.
        match std::fs::metadata(entry.path()) {
            Ok(meta) if meta.is_file() => files.push((name, None)),
            Ok(_) => continue,
            Err(e) => files.push((name, Some(e.to_string()))),
        }
    }
    files.sort();

    let mut entries = Vec::new();
    for (name, metadata_error) in files {
        if !is_allowed_file(&name) {
            tracing::debug!(file = %name, "skipping file with unsupported extension");
            load.skipped_extensions += 1;
            continue;
        }
        if let Some(e) = metadata_error {
            tracing::warn!(file = %name, error = %e, "skipping unreadable enrollment file");
            load.warnings.push(GalleryWarning {
                file: Some(name),
                reason: GalleryWarningKind::Unreadable(e),
            });
            continue;
        }

        let source = ImageSource::path(dir.join(&name));
        let normalized = match validator.validate(&source) {
            Ok(img) => img,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping invalid enrollment image");
                load.warnings.push(GalleryWarning {
                    file: Some(name),
                    reason: GalleryWarningKind::InvalidImage(e.to_string()),
                });
                continue;
            }
        };

        let extraction = match extractor.extract(&normalized) {
            Ok(extraction) => extraction,
            Err(e) => {
                load.warnings.push(GalleryWarning {
                    file: Some(name),
                    reason: GalleryWarningKind::DetectionFailed(e.to_string()),
                });
                continue;
            }
        };

        match extraction.face_count {
            0 => {
                tracing::warn!(file = %name, "no face detected in enrollment image");
                load.warnings.push(GalleryWarning {
                    file: Some(name),
                    reason: GalleryWarningKind::NoFace,
                });
            }
            1 => {
                let Some(embedding) = extraction.embeddings.into_iter().next() else {
                    continue;
                };
                tracing::debug!(file = %name, dim = embedding.dimension(), "enrolled face");
                entries.push(GalleryEntry {
                    source_file_name: name,
                    embedding,
                });
            }
            n => {
                tracing::warn!(file = %name, faces = n, "multiple faces in enrollment image");
                load.warnings.push(GalleryWarning {
                    file: Some(name),
                    reason: GalleryWarningKind::MultipleFaces(n),
                });
            }
        }
    }

    load.gallery = Gallery::new(entries);
    tracing::info!(
        dir = %dir.display(),
        enrolled = load.gallery.len(),
        warnings = load.warnings.len(),
        "gallery loaded"
    );
    load
}
