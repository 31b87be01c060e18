mod demo;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use prometheus::Registry;
use promstream_backend::{
    config::{LogFormat, Settings},
    metrics::Metrics,
    ws_router, AppState,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Live Prometheus metrics over WebSocket
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// TOML config file (defaults to ./promstream.toml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on, overriding the config
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Register synthetic metrics and keep them moving
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading settings")?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }

    init_tracing(&settings);

    let registry = Registry::new();
    let metrics = Metrics::new(&registry).context("registering server metrics")?;

    let shutdown = CancellationToken::new();
    if args.demo {
        demo::spawn(&registry, shutdown.clone()).context("registering demo metrics")?;
        info!("demo metrics enabled");
    }

    let bind_addr = settings.bind_addr;
    let prefix = settings.prefix_uri.clone();
    let state = Arc::new(AppState::new(settings, Arc::new(registry), metrics));

    let scheduler = state.scheduler()?;
    let scheduler_task = tokio::spawn(scheduler.run(shutdown.clone()));

    let app = ws_router::create_router(state);

    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;
    info!("listening on http://{bind_addr}{prefix}/");

    let server_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            server_shutdown.cancel();
        })
        .await?;

    shutdown.cancel();
    scheduler_task.await?;
    info!("shutdown complete");
    Ok(())
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match settings.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

/// Wait for Ctrl+C
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
