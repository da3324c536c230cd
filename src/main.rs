//! slbnc - Straylight bouncer
//!
//! Usage: `slbnc [config.toml]`

use slbnc::Registry;
use slbnc::config::{Config, apply_seeds};
use slbnc::db::Database;
use tokio_rustls::rustls::crypto::aws_lc_rs;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    if aws_lc_rs::default_provider().install_default().is_err() {
        warn!("A TLS crypto provider was already installed");
    }

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = Config::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "Failed to load config");
        e
    })?;

    info!(
        server = %config.server.name,
        data_dir = %config.server.data_dir.display(),
        "Starting slbnc"
    );

    std::fs::create_dir_all(&config.server.data_dir)?;
    let db = Database::new(&config.database_path()).await?;
    apply_seeds(&config, &db).await?;

    let registry = Registry::new(&config, db);
    registry.start().await?;
    info!("slbnc ready");

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    registry.shutdown().await;
    Ok(())
}

/// `RUST_LOG` picks the filter (default `info`); `SLBNC_LOG_FORMAT=json`
/// switches to JSON lines.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("SLBNC_LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}
