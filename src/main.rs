//! Seglake - S3-compatible object storage gateway

use clap::Parser;
use seglake::api::handlers::{router, AppState};
use seglake::config::Config;
use seglake::meta::MemoryMetaStore;
use seglake::store::MemoryObjectStore;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Seglake — S3-compatible object storage gateway with versioned metadata
#[derive(Parser, Debug)]
#[command(name = "seglake")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    config: Option<String>,

    /// Listen address (overrides config)
    #[arg(short, long, value_name = "ADDR")]
    listen: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing.
    // Priority: RUST_LOG > SEGLAKE_LOG_LEVEL > --verbose > default
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| std::env::var("SEGLAKE_LOG_LEVEL").map(EnvFilter::new))
        .unwrap_or_else(|_| {
            if cli.verbose {
                EnvFilter::new("seglake=trace,tower_http=trace")
            } else {
                EnvFilter::new("seglake=info")
            }
        });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = match cli.config {
        Some(ref path) => Config::from_file(path)?,
        None => Config::load(),
    };
    if let Some(listen) = cli.listen {
        config.listen_addr = listen.parse()?;
    }

    let state = Arc::new(AppState::new(
        Arc::new(MemoryMetaStore::new()),
        Arc::new(MemoryObjectStore::new()),
        config.auth.clone(),
        config.region.clone(),
        config.max_object_size,
    ));

    let listener = TcpListener::bind(config.listen_addr).await?;
    info!("seglake listening on {}", config.listen_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if signal::ctrl_c().await.is_ok() {
        info!("shutdown signal received");
    }
}
