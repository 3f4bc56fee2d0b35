//! readthrough-server serves `/get-user` and `/predict` through the read-through cache.
//!
//! Usage:
//!   readthrough-server [--config <path>]
//!
//! Configuration comes from defaults, the YAML file (`--config` or `READTHRU_CONFIG`)
//! and `READTHRU_*` environment overrides. Log verbosity follows `RUST_LOG`.

use anyhow::Context;
use readthrough_cache::config::ServiceConfig;
use readthrough_cache::context::ServiceContext;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let config_path = match args.iter().position(|a| a == "--config") {
        Some(i) => Some(PathBuf::from(
            args.get(i + 1).context("--config requires a path")?,
        )),
        None => None,
    };

    let config =
        ServiceConfig::load_from(config_path.as_deref()).context("loading configuration")?;
    let addr = config.bind_addr()?;
    let ctx = Arc::new(
        ServiceContext::init(config)
            .await
            .context("initializing service context")?,
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, readthrough_cache::http::router(ctx))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await
        .context("server error")?;
    Ok(())
}
