//! Runtime configuration.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `FACEGATE_*` environment variables. Binaries apply their own flags last.

use crate::authorizer::Authorizer;
use crate::analyzer::FaceAnalyzer;
use crate::matcher::{ARCFACE_TOLERANCE, DEFAULT_TOLERANCE};
use crate::validator::{ImageValidator, DEFAULT_MIN_DIMENSION};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

pub const DEFAULT_VERIFY_TIMEOUT_SECS: u64 = 10;

/// Well-known D-Bus name and object path of the daemon.
pub const DBUS_NAME: &str = "org.facegate.Gate1";
pub const DBUS_PATH: &str = "/org/facegate/Gate1";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusKind {
    Session,
    System,
}

impl FromStr for BusKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "session" => Ok(BusKind::Session),
            "system" => Ok(BusKind::System),
            other => Err(format!("unknown bus {other:?} (expected session or system)")),
        }
    }
}

/// Optional settings read from `config.toml`.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    gallery_dir: Option<PathBuf>,
    tolerance: Option<f32>,
    min_dimension: Option<u32>,
    model_dir: Option<PathBuf>,
    verify_timeout_secs: Option<u64>,
    bus: Option<BusKind>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Directory of authorized face images.
    pub gallery_dir: PathBuf,
    /// Maximum Euclidean distance for a match (lower = stricter).
    ///
    /// The default of 0.6 suits 128-d dlib-style embeddings. The bundled
    /// ArcFace backend produces unit vectors; use about 1.1 there
    /// ([`ARCFACE_TOLERANCE`]).
    pub tolerance: f32,
    /// Minimum accepted image width and height in pixels.
    pub min_dimension: u32,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Timeout in seconds for a verify operation (daemon only).
    pub verify_timeout_secs: u64,
    pub bus: BusKind,
}

impl Config {
    /// Defaults derived from the XDG base directories.
    pub fn defaults() -> Self {
        Self::defaults_with(&|key| std::env::var(key).ok())
    }

    fn defaults_with(var: &dyn Fn(&str) -> Option<String>) -> Self {
        let data_dir = var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| home(var).join(".local/share"))
            .join("facegate");

        Self {
            gallery_dir: data_dir.join("authorized_faces"),
            tolerance: DEFAULT_TOLERANCE,
            min_dimension: DEFAULT_MIN_DIMENSION,
            model_dir: data_dir.join("models"),
            verify_timeout_secs: DEFAULT_VERIFY_TIMEOUT_SECS,
            bus: BusKind::Session,
        }
    }

    /// Load configuration from defaults, the config file and `FACEGATE_*`
    /// environment variables.
    ///
    /// The file is `$FACEGATE_CONFIG` if set (and must then exist), otherwise
    /// `$XDG_CONFIG_HOME/facegate/config.toml` when present.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(&|key| std::env::var(key).ok())
    }

    fn load_with(var: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults_with(var);

        match var("FACEGATE_CONFIG") {
            Some(path) => config.apply_file(Path::new(&path))?,
            None => {
                let path = var("XDG_CONFIG_HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| home(var).join(".config"))
                    .join("facegate/config.toml");
                if path.exists() {
                    config.apply_file(&path)?;
                }
            }
        }

        config.apply_env(var);
        Ok(config)
    }

    /// Defaults overridden by environment variables only.
    pub fn from_env() -> Self {
        let var = |key: &str| std::env::var(key).ok();
        let mut config = Self::defaults_with(&var);
        config.apply_env(&var);
        config
    }

    fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: FileConfig = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        tracing::debug!(path = %path.display(), "applying config file");

        if let Some(dir) = file.gallery_dir {
            self.gallery_dir = dir;
        }
        if let Some(t) = file.tolerance {
            self.set_tolerance(t);
        }
        if let Some(min) = file.min_dimension {
            self.min_dimension = min;
        }
        if let Some(dir) = file.model_dir {
            self.model_dir = dir;
        }
        if let Some(secs) = file.verify_timeout_secs {
            self.set_verify_timeout_secs(secs);
        }
        if let Some(bus) = file.bus {
            self.bus = bus;
        }
        Ok(())
    }

    fn apply_env(&mut self, var: &dyn Fn(&str) -> Option<String>) {
        if let Some(dir) = var("FACEGATE_GALLERY_DIR") {
            self.gallery_dir = PathBuf::from(dir);
        }
        if let Some(t) = parse_var::<f32>(var, "FACEGATE_TOLERANCE") {
            self.set_tolerance(t);
        }
        if let Some(min) = parse_var(var, "FACEGATE_MIN_DIMENSION") {
            self.min_dimension = min;
        }
        if let Some(dir) = var("FACEGATE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_var(var, "FACEGATE_VERIFY_TIMEOUT_SECS") {
            self.set_verify_timeout_secs(secs);
        }
        if let Some(bus) = parse_var(var, "FACEGATE_BUS") {
            self.bus = bus;
        }
    }

    /// Set the match tolerance, keeping the current value if `tolerance` is
    /// negative or not finite. Returns whether the value was accepted.
    pub fn set_tolerance(&mut self, tolerance: f32) -> bool {
        if tolerance.is_finite() && tolerance >= 0.0 {
            self.tolerance = tolerance;
            true
        } else {
            tracing::warn!(tolerance, kept = self.tolerance, "ignoring invalid tolerance");
            false
        }
    }

    /// Set the daemon's verify timeout, keeping the current value for 0.
    pub fn set_verify_timeout_secs(&mut self, secs: u64) -> bool {
        if secs > 0 {
            self.verify_timeout_secs = secs;
            true
        } else {
            tracing::warn!(kept = self.verify_timeout_secs, "ignoring zero verify timeout");
            false
        }
    }

    /// A note for operators when the tolerance is stricter than the ArcFace
    /// calibration, under which genuine users are usually denied.
    pub fn arcface_tolerance_hint(&self) -> Option<String> {
        (self.tolerance < ARCFACE_TOLERANCE).then(|| {
            format!(
                "tolerance {} is stricter than the {ARCFACE_TOLERANCE} recommended for ArcFace \
                 embeddings; set FACEGATE_TOLERANCE={ARCFACE_TOLERANCE} if enrolled users are denied",
                self.tolerance
            )
        })
    }

    pub fn validator(&self) -> ImageValidator {
        ImageValidator::new(self.min_dimension)
    }

    /// An authorizer using this configuration's tolerance and validator.
    pub fn authorizer<A: FaceAnalyzer>(&self, analyzer: A) -> Authorizer<A> {
        Authorizer::new(analyzer)
            .with_tolerance(self.tolerance)
            .with_validator(self.validator())
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join("det_10g.onnx")
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join("w600k_r50.onnx")
    }
}

fn home(var: &dyn Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(var("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn parse_var<T: FromStr>(var: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = var(key)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(key, value = %raw, "ignoring unparseable environment variable");
            None
        }
    }
}
