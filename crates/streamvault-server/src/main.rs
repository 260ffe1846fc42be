//! Stream Compute Vault daemon.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use streamvault_catalog::FileCatalog;
use streamvault_server::{routes, App, VaultConfig};

/// Per-node work-dispatch service for distributed simulation streams.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "streamvault.toml")]
    config: String,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured listen address
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("streamvault={}", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut config = VaultConfig::load(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config))?;
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    info!("starting vault {}", config.name);
    info!("version: {}", env!("CARGO_PKG_VERSION"));

    let catalog = Arc::new(
        FileCatalog::open(&config.catalog_dir).context("opening the metadata catalog")?,
    );
    let (app, write_worker) = App::new(config, catalog).context("bringing the vault up")?;

    let listener = tokio::net::TcpListener::bind(&app.config.listen)
        .await
        .with_context(|| format!("binding {}", app.config.listen))?;
    info!(addr = %app.config.listen, "serving requests");

    axum::serve(listener, routes::router(Arc::clone(&app)))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    // Stop accepting work, then flush every pending catalog write.
    app.begin_shutdown();
    write_worker.await.context("deferred-write worker failed")?;
    info!("goodbye");
    Ok(())
}

/// Resolves on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
