use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use feast_online_store::{MemOnlineStore, OnlineStore, RetryPolicy, RetryingStore};
use feast_server::http::{self, HttpState};
use feast_server::loader;
use feast_serving::{FeatureServer, ServingConfig};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "feast-serve", version, about = "Online feature serving over HTTP")]
struct Cli {
    /// Registry snapshot JSON (env: FEAST_REGISTRY_PATH)
    #[arg(long, env = "FEAST_REGISTRY_PATH")]
    registry: PathBuf,

    /// Materialized online rows to preload (env: FEAST_ONLINE_DATA_PATH)
    #[arg(long, env = "FEAST_ONLINE_DATA_PATH")]
    online_data: Option<PathBuf>,

    /// Listen address (env: FEAST_BIND)
    #[arg(long, env = "FEAST_BIND", default_value = "127.0.0.1:6566")]
    bind: SocketAddr,

    /// Retries of a transient store failure (env: FEAST_STORE_MAX_RETRIES)
    #[arg(long, env = "FEAST_STORE_MAX_RETRIES", default_value_t = 2)]
    store_max_retries: usize,

    /// First retry delay in milliseconds (env: FEAST_STORE_RETRY_BASE_MS)
    #[arg(long, env = "FEAST_STORE_RETRY_BASE_MS", default_value_t = 50)]
    store_retry_base_ms: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let cli = Cli::parse();

    let config = ServingConfig::from_env().context("serving config")?;
    let registry = loader::load_registry(&cli.registry)?;
    let policy = RetryPolicy {
        max_retries: cli.store_max_retries,
        base_delay: Duration::from_millis(cli.store_retry_base_ms),
        ..RetryPolicy::default()
    };
    let store = RetryingStore::new(MemOnlineStore::new(), policy);
    if let Some(path) = &cli.online_data {
        loader::load_online_data(path, &registry, store.inner(), &config.default_project)?;
    }
    tracing::info!(
        kind = store.kind(),
        max_retries = store.policy().max_retries,
        base_delay = ?store.policy().base_delay,
        "online store ready"
    );

    let server = FeatureServer::new(Arc::new(registry), Arc::new(store), config);
    let config = server.config();
    tracing::info!(
        project = %config.default_project,
        timeout = ?config.request_timeout,
        policy = ?config.table_failure_policy,
        "starting feature server"
    );

    let app = http::router(HttpState::new(server));
    http::serve(cli.bind, app, shutdown_signal()).await?;
    tracing::info!("feature server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {err}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

fn setup_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();
}
