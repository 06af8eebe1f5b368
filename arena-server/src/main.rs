//! Arena Server
//!
//! Runs any subset of the matchmaking, settlement and leaderboard services
//! against a shared Postgres database and event bus.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use arena_core::config::ConfigStore;
use arena_core::events::{EventBus, MemoryEventBus, PgEventBus, Subscriber};
use arena_core::framework::DatabaseProcessor;
use arena_core::processors::{LeaderboardAggregator, MatchmakingQueue, SettlementService};
use arena_sdk::objects::EventKind;
use clap::{Parser, ValueEnum};
use config::file::BusBackend;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// A service that can be enabled in this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Service {
    Matchmaking,
    Settlement,
    Leaderboard,
}

impl Service {
    /// Consumer group name on the bus.
    fn consumer(self) -> &'static str {
        match self {
            Service::Matchmaking => "matchmaking",
            Service::Settlement => "settlement",
            Service::Leaderboard => "leaderboard",
        }
    }
}

/// Arena - matchmaking, reward settlement and leaderboards over an event bus
#[derive(Parser, Debug)]
#[command(name = "arena-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./arena-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Services to run in this process (repeatable, default: all)
    #[arg(long = "service", value_enum)]
    services: Vec<Service>,

    /// Emit logs as JSON lines
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize tracing
    init_tracing(args.json_logs);

    tracing::info!("Starting arena-server v{}", env!("CARGO_PKG_VERSION"));

    let services = if args.services.is_empty() {
        vec![Service::Matchmaking, Service::Settlement, Service::Leaderboard]
    } else {
        args.services.clone()
    };
    tracing::info!(?services, "Enabled services");

    // Load configuration
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Get database URL from environment
    let database_url = get_database_url().map_err(|e| {
        tracing::error!("DATABASE_URL environment variable not set");
        e
    })?;

    // Create database connection pool
    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .map_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
            e
        })?;
    tracing::info!("Database connection established");

    // Run migrations if requested
    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .map_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
                e
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let bus: Arc<dyn EventBus> = match loaded_config.bus.backend {
        BusBackend::Postgres => Arc::new(PgEventBus::new(db_pool.clone())),
        BusBackend::Memory => {
            tracing::warn!("Using the in-process event bus; events do not leave this process");
            Arc::new(MemoryEventBus::new())
        }
    };
    let store = Arc::new(DatabaseProcessor::new(db_pool.clone()));
    let rewards = ConfigStore::new(loaded_config.rewards.table.clone());
    let subscriber_config = loaded_config.bus.subscriber;
    let publish_policy = loaded_config.bus.publish_policy;

    let mut state = AppState::default();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut tasks: Vec<JoinHandle<()>> = Vec::new();

    // Every consumer is registered before any of them starts, so nothing
    // published by one service in this process is missed by another.
    let matchmaking = if services.contains(&Service::Matchmaking) {
        let queue = Arc::new(MatchmakingQueue::new(
            store.clone(),
            bus.clone(),
            publish_policy,
        ));
        let subscriber = Subscriber::new(
            bus.clone(),
            EventKind::SpawnRequested,
            Service::Matchmaking.consumer(),
            queue.clone(),
            subscriber_config,
        );
        subscriber.register().await?;
        state.queue = Some(queue.clone());
        Some((queue, subscriber))
    } else {
        None
    };

    let settlement = if services.contains(&Service::Settlement) {
        let service = Arc::new(SettlementService::new(
            store.clone(),
            bus.clone(),
            rewards.clone(),
            loaded_config.rewards.conflict_policy,
            publish_policy,
        ));
        let subscriber = Subscriber::new(
            bus.clone(),
            EventKind::MatchCompleted,
            Service::Settlement.consumer(),
            service.clone(),
            subscriber_config,
        );
        subscriber.register().await?;
        state.settlement = Some(service);
        Some(subscriber)
    } else {
        None
    };

    let leaderboard = if services.contains(&Service::Leaderboard) {
        let aggregator = Arc::new(LeaderboardAggregator::new(
            store.clone(),
            bus.clone(),
            publish_policy,
        ));
        let subscriber = Subscriber::new(
            bus.clone(),
            EventKind::RewardSettled,
            Service::Leaderboard.consumer(),
            aggregator.clone(),
            subscriber_config,
        );
        subscriber.register().await?;
        state.leaderboard = Some(aggregator);
        Some(subscriber)
    } else {
        None
    };

    if let Some((queue, subscriber)) = matchmaking {
        tasks.push(tokio::spawn(subscriber.run(shutdown_rx.clone())));
        tasks.push(tokio::spawn(
            queue.run_sweeper(loaded_config.matchmaking, shutdown_rx.clone()),
        ));
    }
    if let Some(subscriber) = settlement {
        tasks.push(tokio::spawn(subscriber.run(shutdown_rx.clone())));
    }
    if let Some(subscriber) = leaderboard {
        tasks.push(tokio::spawn(subscriber.run(shutdown_rx.clone())));
    }

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(config_loader, rewards);

    // Build the router
    let router = build_router(state);

    // Run the server
    let listen_addr = loaded_config.server.listen;
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop the processors and wait for their in-flight batches
    reload_notify.notify_one();
    shutdown_tx.send_replace(true);
    for task in tasks {
        if let Err(e) = task.await {
            tracing::error!(error = %e, "Processor task failed");
        }
    }

    // Close database connections gracefully
    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn,tower_http=debug"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}
