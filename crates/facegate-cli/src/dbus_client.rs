use facegate_core::{BusKind, Config, VerificationResult};
use std::time::Duration;
use zbus::connection::Builder;

#[zbus::proxy(
    interface = "org.facegate.Gate1",
    default_service = "org.facegate.Gate1",
    default_path = "/org/facegate/Gate1"
)]
pub trait Gate {
    async fn verify_detailed(&self, path: &str) -> zbus::Result<String>;
    async fn status(&self) -> zbus::Result<String>;
    async fn list_gallery(&self) -> zbus::Result<String>;
}

pub async fn connect(config: &Config) -> anyhow::Result<GateProxy<'static>> {
    let builder = match config.bus {
        BusKind::Session => Builder::session()?,
        BusKind::System => Builder::system()?,
    };
    // Outlive the daemon's own verify timeout so it gets to answer first.
    let conn = builder
        .method_timeout(Duration::from_secs(config.verify_timeout_secs + 5))
        .build()
        .await?;
    Ok(GateProxy::new(&conn).await?)
}

pub async fn verify(proxy: &GateProxy<'_>, path: &str) -> anyhow::Result<VerificationResult> {
    let json = proxy.verify_detailed(path).await?;
    Ok(serde_json::from_str(&json)?)
}
