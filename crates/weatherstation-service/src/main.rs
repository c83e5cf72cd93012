//! Weather station service - ingestion and query HTTP API.
//!
//! Run with: `cargo run -p weatherstation-service`

use std::path::PathBuf;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use weatherstation_service::{AppState, Config, api};
use weatherstation_store::Store;

/// Weather station service - ingestion and query HTTP API.
#[derive(Parser, Debug)]
#[command(name = "weatherstation-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, env = "WEATHERSTATION_BIND")]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long, env = "WEATHERSTATION_DB")]
    database: Option<PathBuf>,

    /// UTC offset of the station clock, e.g. "+02:00" (overrides config).
    #[arg(long, allow_hyphen_values = true)]
    utc_offset: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("weatherstation_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };

    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    if let Some(offset) = args.utc_offset {
        config.server.utc_offset = offset;
    }

    config.validate()?;
    let offset = config.server.offset()?;

    let store = Store::open(&config.storage.path)?.with_offset(offset);
    info!("Using UTC offset {}", config.server.utc_offset);

    let state = AppState::new(store, config.clone());

    let app = Router::new()
        .merge(api::router())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.server.bind.as_str()).await?;
    info!("Starting server on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
