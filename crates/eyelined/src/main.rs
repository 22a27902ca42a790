use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.eyeline.Eyeline1";
const OBJECT_PATH: &str = "/org/eyeline/Eyeline1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("eyelined starting");

    let config = config::Config::from_env().context("invalid configuration")?;
    tracing::info!(
        preset = %config.preset,
        max_sessions = config.max_sessions,
        config_file = ?config.config_file,
        "configuration loaded"
    );

    let engine = engine::spawn_engine(&config).context("failed to start engine")?;

    let service = dbus_interface::EyelineService {
        engine,
        weights: config.weights,
        model_path: config.model_path(),
        preset: config.preset.clone(),
    };

    let builder = if config.system_bus {
        zbus::connection::Builder::system()?
    } else {
        zbus::connection::Builder::session()?
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(
        bus = BUS_NAME,
        path = OBJECT_PATH,
        system = config.system_bus,
        "eyelined ready"
    );

    // Keep running until signaled
    tokio::signal::ctrl_c().await?;
    tracing::info!("eyelined shutting down");

    Ok(())
}
