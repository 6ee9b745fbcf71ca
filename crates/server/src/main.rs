use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use weavegen_server::{router, AppState};

#[derive(Parser, Debug)]
#[command(name = "weavegend", version, about = "Weave Net manifest generation service")]
struct Cli {
    /// Address to listen on
    #[arg(long = "bind", env = "WEAVEGEN_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Add-on release whose artifacts are served
    #[arg(
        long = "release-version",
        env = "WEAVEGEN_RELEASE",
        default_value = weavegen_resolve::DEFAULT_RELEASE
    )]
    release: String,
}

fn init_tracing() {
    let env = std::env::var("WEAVEGEN_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("WEAVEGEN_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid WEAVEGEN_METRICS_ADDR; expected host:port");
        }
    }
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let state = AppState::new(&cli.release);
    let app = router(state);

    info!(bind = %cli.bind, release = %cli.release, "weavegend listening");
    let listener = tokio::net::TcpListener::bind(cli.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
