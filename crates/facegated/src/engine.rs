use facegate_core::{
    Authorizer, Config, FaceAnalyzer, Gallery, GalleryLoad, ImageSource, VerificationResult,
    VerifyError,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

type BoxedAnalyzer = Box<dyn FaceAnalyzer + Send>;

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    Verify {
        source: ImageSource,
        reply: oneshot::Sender<VerificationResult>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    timeout: Duration,
}

impl EngineHandle {
    /// Verify an image against the startup gallery.
    ///
    /// Always yields a result: a closed engine or an expired timeout become
    /// denials like any other internal failure.
    pub async fn verify(&self, source: ImageSource) -> VerificationResult {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = EngineRequest::Verify {
            source,
            reply: reply_tx,
        };
        if self.tx.send(request).await.is_err() {
            return engine_gone();
        }

        match tokio::time::timeout(self.timeout, reply_rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => engine_gone(),
            Err(_) => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "verify timed out");
                VerificationResult::from_error(&VerifyError::TimedOut(self.timeout.as_secs()))
            }
        }
    }
}

fn engine_gone() -> VerificationResult {
    VerificationResult::from_error(&VerifyError::Internal("engine thread exited".into()))
}

/// Load the gallery, then move the authorizer onto a dedicated OS thread.
///
/// The gallery is loaded once here and shared read-only for the lifetime
/// of the process; there is no reload path.
pub fn spawn_engine(
    config: &Config,
    analyzer: BoxedAnalyzer,
) -> Result<(EngineHandle, Arc<Gallery>, GalleryLoad), EngineError> {
    let mut authorizer: Authorizer<BoxedAnalyzer> = config.authorizer(analyzer);

    let mut load = authorizer.load_gallery(&config.gallery_dir);
    let gallery = Arc::new(std::mem::take(&mut load.gallery));
    tracing::info!(
        dir = %config.gallery_dir.display(),
        authorized_faces = gallery.len(),
        warnings = load.warnings.len(),
        "authorized faces loaded"
    );

    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);
    let engine_gallery = Arc::clone(&gallery);

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify { source, reply } => {
                        let result = authorizer.verify(&source, &engine_gallery);
                        // Receiver is gone if the caller timed out.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    let handle = EngineHandle {
        tx,
        timeout: Duration::from_secs(config.verify_timeout_secs),
    };
    Ok((handle, gallery, load))
}
