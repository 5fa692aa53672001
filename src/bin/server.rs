//! GridGate API server entry point
//!
//! Serves the permission-gated REST surface over the in-memory store.
//! Storage collaborators are external in production; this binary exists
//! for local development and integration testing.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use gridgate::engine::api::{create_router, ApiState};
use gridgate::engine::config::{Config, ConfigError};
use gridgate::engine::store::MemoryStore;

#[derive(Parser)]
#[command(name = "gridgate-server", version, about = "GridGate API server")]
struct Args {
    /// Directory containing gridgate.config.json
    #[arg(long, default_value = ".")]
    config_dir: PathBuf,

    /// Override the configured listen host
    #[arg(long)]
    host: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let config = match Config::load(&args.config_dir) {
        Ok(config) => config,
        Err(ConfigError::NotFound(_)) => Config::default(),
        Err(e) => return Err(e).context("loading config"),
    };

    let host = args.host.unwrap_or(config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    let state = ApiState {
        store: Arc::new(MemoryStore::new()),
        member_limit: config.limits.per_base_member_limit,
    };
    let app = create_router(state);

    let addr = format!("{}:{}", host, port);
    tracing::info!(%addr, "GridGate API server listening");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    axum::serve(listener, app).await.context("serving")?;

    Ok(())
}
