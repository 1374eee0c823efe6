use anyhow::{Context, Result};
use facegate_core::{BusKind, Config, DBUS_NAME, DBUS_PATH};
use tracing_subscriber::EnvFilter;

mod dbus_interface;
mod engine;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("facegated starting");

    let config = Config::load()?;
    tracing::info!(
        gallery_dir = %config.gallery_dir.display(),
        model_dir = %config.model_dir.display(),
        tolerance = config.tolerance,
        bus = ?config.bus,
        "configuration loaded"
    );

    let analyzer = facegate_core::default_analyzer(&config)
        .context("failed to initialize face analyzer")?;
    if let Some(hint) = config.arcface_tolerance_hint() {
        tracing::warn!("{hint}");
    }

    let (engine, gallery, load) = engine::spawn_engine(&config, analyzer)?;
    if gallery.is_empty() {
        tracing::warn!("no authorized faces loaded; every verify will be denied");
    }

    let service = dbus_interface::GateService::new(engine, gallery, load.warnings, config.clone());
    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _conn = builder
        .name(DBUS_NAME)?
        .serve_at(DBUS_PATH, service)?
        .build()
        .await
        .with_context(|| format!("failed to register {DBUS_NAME} on the {:?} bus", config.bus))?;

    tracing::info!(name = DBUS_NAME, path = DBUS_PATH, "facegated ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("facegated shutting down");

    Ok(())
}
