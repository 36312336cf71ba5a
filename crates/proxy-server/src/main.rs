mod config;
mod error;
mod origin;
mod proxy;

use anyhow::Context;
use clap::Parser;
use config::{Args, Settings};
use origin::HyperFetcher;
use proxy::AppState;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use ttl_cache::CacheStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    let args = Args::parse();
    let settings = Settings::resolve(&args).context("invalid configuration")?;

    // One store for the whole process, handed to the handler and the sweeper.
    let store = Arc::new(CacheStore::new());

    let state = Arc::new(AppState {
        store: Arc::clone(&store),
        fetcher: Arc::new(HyperFetcher::new()),
        origin: settings.origin.clone(),
        ttl: settings.cache_ttl,
        strict_expiry: settings.strict_expiry,
    });

    let shutdown = CancellationToken::new();

    let sweeper = ttl_cache::spawn_sweeper(
        Arc::clone(&store),
        settings.cleanup_interval,
        shutdown.child_token(),
    );

    let app = proxy::router(state, &settings.route);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind proxy to {addr}"))?;

    tracing::info!(
        addr = %addr,
        origin = %settings.origin,
        route = %settings.route,
        cache_ttl = %humantime::format_duration(settings.cache_ttl),
        cleanup_interval = %humantime::format_duration(settings.cleanup_interval),
        strict_expiry = settings.strict_expiry,
        "caching proxy starting"
    );

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await;

    // Server may also stop on its own error; make sure the sweeper follows.
    shutdown.cancel();
    if let Err(e) = sweeper.await {
        tracing::warn!(error = %e, "sweeper task ended abnormally");
    }

    served.context("proxy server error")?;
    tracing::info!("caching proxy shut down");
    Ok(())
}

/// Listen for SIGINT (Ctrl+C) or SIGTERM and cancel the shutdown token.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = sigterm.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        ctrl_c.await;
    }

    tracing::info!("shutdown signal received, draining connections...");
    token.cancel();
}
