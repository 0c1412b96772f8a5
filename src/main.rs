// src/main.rs
// Showroom server entry point.

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use showroom::api::http_router;
use showroom::config::Config;
use showroom::preload::preload_all;
use showroom::state::AppState;

#[derive(Parser, Debug)]
#[command(name = "showroom", about = "Conversational product recommendation service")]
struct Args {
    /// Bind address override, e.g. 0.0.0.0:8090
    #[arg(long)]
    bind: Option<String>,

    /// Skip the startup preload (components warm lazily)
    #[arg(long)]
    no_preload: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = Config::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone())),
        )
        .init();

    info!("Starting showroom server...");
    let bind = args.bind.clone().unwrap_or_else(|| config.server.bind_address());

    let state = std::sync::Arc::new(AppState::new(config).await?);

    if !args.no_preload {
        preload_all(&state).await;
    }

    let router = http_router(state);
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    info!("Listening on http://{}", bind);
    axum::serve(listener, router).await?;

    Ok(())
}
