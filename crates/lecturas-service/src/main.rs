//! Lecturas service - periodic DynamoDB to PostgreSQL sync and read API.
//!
//! Run with: `cargo run -p lecturas-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use axum::http::{HeaderValue, Method};
use clap::{Parser, Subcommand};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use lecturas_service::{AppState, Config, StorageBackend, api};
use lecturas_source::{DynamoSource, SourceStore};
use lecturas_store::{PgStore, ReadingStore, SqliteStore};

/// Lecturas service - sensor readings sync and HTTP API.
#[derive(Parser, Debug)]
#[command(name = "lecturas-service")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long, global = true)]
    bind: Option<String>,

    /// Use a local SQLite database at this path instead of PostgreSQL.
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    /// Disable the periodic sync (API and manual trigger only).
    #[arg(long, global = true)]
    no_scheduler: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the service in the foreground (default behavior).
    Run,

    /// Run a single sync and print its outcome as JSON.
    Sync,

    /// Validate the effective configuration and exit.
    CheckConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("lecturas_service=info".parse()?)
                .add_directive("lecturas_source=info".parse()?)
                .add_directive("lecturas_store=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(&args)?;

    match args.command {
        Some(Command::CheckConfig) => check_config(&config),
        Some(Command::Sync) => sync_once(config).await,
        Some(Command::Run) | None => run_server(config, args.no_scheduler).await,
    }
}

/// File, then environment, then flags. Validated before returning.
fn load_config(args: &Args) -> anyhow::Result<Config> {
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default()?,
    };
    config.apply_env()?;

    if let Some(bind) = &args.bind {
        config.server.bind = bind.clone();
    }
    if let Some(db_path) = &args.database {
        config.storage.backend = StorageBackend::Sqlite;
        config.storage.sqlite_path = db_path.clone();
    }

    config.validate()?;
    Ok(config)
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ReadingStore>> {
    match config.storage.backend {
        StorageBackend::Postgres => {
            let db = &config.database;
            info!(
                "Connecting to PostgreSQL at {}:{}/{}",
                db.host, db.port, db.name
            );
            let store = PgStore::connect(&db.store_config(config.storage.query_timeout()))
                .await
                .context("failed to connect to PostgreSQL")?;
            Ok(Arc::new(store))
        }
        StorageBackend::Sqlite => {
            info!("Opening SQLite database at {:?}", config.storage.sqlite_path);
            let store = SqliteStore::open(&config.storage.sqlite_path)?;
            Ok(Arc::new(store))
        }
    }
}

async fn connect_source(config: &Config) -> anyhow::Result<Arc<dyn SourceStore>> {
    info!(
        "Using DynamoDB table {} in {}",
        config.source.table, config.source.region
    );
    let source = DynamoSource::connect(&config.source.dynamo_config()).await?;
    Ok(Arc::new(source))
}

async fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let store = open_store(&config).await?;
    let source = connect_source(&config).await?;
    Ok(AppState::new(config, source, store))
}

fn check_config(config: &Config) -> anyhow::Result<()> {
    println!("Configuration OK");
    println!("  bind:        {}", config.server.bind);
    println!("  cors origin: {}", config.server.cors_origin);
    match config.storage.backend {
        StorageBackend::Postgres => println!(
            "  storage:     postgres {}@{}:{}/{}",
            config.database.user, config.database.host, config.database.port, config.database.name
        ),
        StorageBackend::Sqlite => {
            println!("  storage:     sqlite {}", config.storage.sqlite_path.display())
        }
    }
    println!(
        "  source:      {} ({})",
        config.source.table, config.source.region
    );
    println!("  interval:    {}s", config.sync.interval_secs);
    Ok(())
}

async fn sync_once(config: Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let result = state.syncer.run_sync().await;
    println!("{}", serde_json::to_string_pretty(&result)?);

    if result.status.is_error() {
        anyhow::bail!("sync failed");
    }
    Ok(())
}

async fn run_server(config: Config, no_scheduler: bool) -> anyhow::Result<()> {
    let addr: SocketAddr = config.server.bind.parse()?;
    let origin: HeaderValue = config.server.cors_origin.parse()?;
    let run_on_start = config.sync.run_on_start;

    let state = build_state(config).await?;

    if no_scheduler {
        info!("Periodic sync disabled");
    } else {
        if run_on_start {
            let result = state.scheduler.run_initial().await;
            if result.status.is_error() {
                warn!("Initial sync failed, continuing: {:?}", result.error);
            }
        }
        state.scheduler.start();
    }

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET])
        .allow_headers(Any);

    let app = Router::new()
        .merge(api::router().layer(cors))
        .merge(api::sync_router())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::clone(&state));

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.scheduler.stop().await;
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
