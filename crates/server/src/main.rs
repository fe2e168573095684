use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::HeaderValue;
use clap::{Parser, Subcommand};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use jobdesk_core::{create_hub, load_config, validate_config, Config, Database, PriorityScheduler};

use jobdesk_server::api::create_router;
use jobdesk_server::state::AppState;

#[derive(Parser)]
#[command(name = "jobdesk", about = "Ticket/job reservation backend")]
struct Cli {
    /// Path to the configuration file. Environment variables override it.
    #[arg(long, env = "JOBDESK_CONFIG", default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the HTTP API and WebSocket hub (default).
    Api,
    /// Run the cron-style priority recalculation worker.
    Worker,
    /// One-shot schema bootstrap.
    Migrate,
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    info!("Loading configuration from {:?}", cli.config);
    let config = load_config(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;

    match cli.command.unwrap_or(Command::Api) {
        Command::Api => run_api(config).await,
        Command::Worker => run_worker(config).await,
        Command::Migrate => run_migrate(config),
    }
}

async fn run_api(config: Config) -> Result<()> {
    validate_config(&config).context("Configuration validation failed")?;

    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {:?}", config.database.path))?;

    let (hub_handle, hub) = create_hub();
    tokio::spawn(hub.run());

    let cors = cors_layer(&config);
    let state = Arc::new(AppState::new(config.clone(), db, hub_handle));
    let app = create_router(state).layer(cors);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}

async fn run_worker(config: Config) -> Result<()> {
    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {:?}", config.database.path))?;

    // The worker runs its own hub instance; recalculation events reach
    // clients of this process only, exactly like the original topology where
    // each process fans out to its own connections.
    let (hub_handle, hub) = create_hub();
    tokio::spawn(hub.run());

    let scheduler = PriorityScheduler::new(db, hub_handle);
    scheduler.start();
    info!("Worker started; recalculation loops are scheduled");

    tokio::signal::ctrl_c().await.context("Signal handler error")?;
    info!("Shutting down scheduler...");
    scheduler.stop();
    // Give the loops a moment to observe the signal.
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    info!("Scheduler stopped.");
    Ok(())
}

fn run_migrate(config: Config) -> Result<()> {
    info!("Running schema bootstrap on {:?}", config.database.path);
    let db = Database::open(&config.database.path)
        .with_context(|| format!("Failed to open database at {:?}", config.database.path))?;

    // Schema creation is idempotent; verify the websocket ticket table since
    // the realtime handshake depends on it.
    let count: i64 = db
        .conn()
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'websocket_tickets'",
            [],
            |row| row.get(0),
        )
        .context("Failed to verify websocket_tickets table")?;
    if count == 1 {
        info!("Migration completed; table 'websocket_tickets' is ready");
    } else {
        anyhow::bail!("table 'websocket_tickets' missing after migration");
    }
    Ok(())
}

fn cors_layer(config: &Config) -> CorsLayer {
    if config.allowed_origins.is_empty() {
        return CorsLayer::new();
    }

    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
