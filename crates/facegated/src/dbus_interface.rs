use crate::engine::EngineHandle;
use facegate_core::{Config, Gallery, GalleryWarning, ImageSource, VerificationResult};
use std::path::Path;
use std::sync::Arc;
use zbus::interface;

/// D-Bus interface for the facegate daemon.
///
/// Bus name: org.facegate.Gate1
/// Object path: /org/facegate/Gate1
pub struct GateService {
    engine: EngineHandle,
    gallery: Arc<Gallery>,
    warnings: Vec<GalleryWarning>,
    config: Config,
}

impl GateService {
    pub fn new(
        engine: EngineHandle,
        gallery: Arc<Gallery>,
        warnings: Vec<GalleryWarning>,
        config: Config,
    ) -> Self {
        Self {
            engine,
            gallery,
            warnings,
            config,
        }
    }

    async fn run_verify(&self, path: &str) -> zbus::fdo::Result<VerificationResult> {
        // Relative paths would resolve against the daemon's cwd, not the caller's.
        if !Path::new(path).is_absolute() {
            return Err(zbus::fdo::Error::InvalidArgs(format!(
                "image path must be absolute: {path}"
            )));
        }
        tracing::info!(path, "verify requested");
        Ok(self.engine.verify(ImageSource::path(path)).await)
    }
}

#[interface(name = "org.facegate.Gate1")]
impl GateService {
    /// Verify the image at `path`. Returns (authorized, message).
    async fn verify(&self, path: &str) -> zbus::fdo::Result<(bool, String)> {
        let result = self.run_verify(path).await?;
        Ok((result.authorized, result.message))
    }

    /// Verify the image at `path`, returning the full result as JSON.
    async fn verify_detailed(&self, path: &str) -> zbus::fdo::Result<String> {
        let result = self.run_verify(path).await?;
        serde_json::to_string(&result).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "gallery_dir": self.config.gallery_dir,
            "tolerance": self.config.tolerance,
            "min_dimension": self.config.min_dimension,
            "verify_timeout_secs": self.config.verify_timeout_secs,
            "authorized_faces": self.gallery.len(),
            "gallery_warnings": self.warnings.len(),
        })
        .to_string())
    }

    /// List the enrolled source files and the warnings from gallery loading.
    async fn list_gallery(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "enrolled": self.gallery.source_file_names(),
            "warnings": self.warnings,
        })
        .to_string())
    }
}
