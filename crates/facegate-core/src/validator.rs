//! Image admission checks: extension, decodability, color mode, resolution.

use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extensions accepted for both enrollment and probe images (lowercase).
pub const ALLOWED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Floor below which detection is considered unreliable. A heuristic,
/// not a detector guarantee.
pub const DEFAULT_MIN_DIMENSION: u32 = 50;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Unsupported image format: {0} (allowed: jpg, jpeg, png)")]
    UnsupportedFormat(String),
    #[error("Image resolution is too low for reliable face detection")]
    InsufficientResolution { width: u32, height: u32, min: u32 },
    #[error("cannot read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },
}

/// An image handed to the engine, either on disk or as an uploaded stream.
#[derive(Debug, Clone)]
pub enum ImageSource {
    Path(PathBuf),
    Bytes { file_name: String, data: Vec<u8> },
}

impl ImageSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        ImageSource::Path(path.into())
    }

    pub fn bytes(file_name: impl Into<String>, data: Vec<u8>) -> Self {
        ImageSource::Bytes {
            file_name: file_name.into(),
            data,
        }
    }

    /// Display name: the path for on-disk images, the upload name otherwise.
    pub fn name(&self) -> String {
        match self {
            ImageSource::Path(path) => path.display().to_string(),
            ImageSource::Bytes { file_name, .. } => file_name.clone(),
        }
    }

    fn extension_name(&self) -> &str {
        match self {
            ImageSource::Path(path) => path.to_str().unwrap_or_default(),
            ImageSource::Bytes { file_name, .. } => file_name,
        }
    }
}

/// Check whether a file name carries an allowed image extension (case-insensitive).
pub fn is_allowed_file(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            ALLOWED_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
        .unwrap_or(false)
}

/// A decoded, RGB-normalized image ready for face analysis.
///
/// Normalization happens in memory, so no scratch file outlives the call.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub source_name: String,
    pub image: RgbImage,
    /// True when the source was not already 8-bit RGB.
    pub converted: bool,
}

impl NormalizedImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[derive(Debug, Clone)]
pub struct ImageValidator {
    min_dimension: u32,
}

impl Default for ImageValidator {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_DIMENSION)
    }
}

impl ImageValidator {
    pub fn new(min_dimension: u32) -> Self {
        Self { min_dimension }
    }

    pub fn min_dimension(&self) -> u32 {
        self.min_dimension
    }

    /// Validate and normalize an image.
    ///
    /// Checks run in order: extension, read + decode, color normalization,
    /// minimum resolution.
    pub fn validate(&self, source: &ImageSource) -> Result<NormalizedImage, ValidationError> {
        let name = source.name();
        if !is_allowed_file(source.extension_name()) {
            return Err(ValidationError::UnsupportedFormat(name));
        }

        let decoded = match source {
            ImageSource::Path(path) => {
                let data = std::fs::read(path).map_err(|source| ValidationError::Io {
                    name: name.clone(),
                    source,
                })?;
                decode(&name, &data)?
            }
            ImageSource::Bytes { data, .. } => decode(&name, data)?,
        };

        let (image, converted) = match decoded {
            DynamicImage::ImageRgb8(rgb) => (rgb, false),
            other => {
                tracing::debug!(image = %name, color = ?other.color(), "normalizing to RGB");
                (other.to_rgb8(), true)
            }
        };

        let (width, height) = image.dimensions();
        if width < self.min_dimension || height < self.min_dimension {
            return Err(ValidationError::InsufficientResolution {
                width,
                height,
                min: self.min_dimension,
            });
        }

        Ok(NormalizedImage {
            source_name: name,
            image,
            converted,
        })
    }
}

fn decode(name: &str, data: &[u8]) -> Result<DynamicImage, ValidationError> {
    image::load_from_memory(data).map_err(|source| ValidationError::Decode {
        name: name.to_string(),
        source,
    })
}
