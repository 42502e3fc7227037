use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use catalyst::api::{coordination_router, news_router, scanner_router, AppState};
use catalyst::collector::{NewsCollector, Normalizer};
use catalyst::config::AppConfig;
use catalyst::coordinator::{
    CycleCoordinator, HttpCollaborators, OutcomeSweeper, Scheduler,
};
use catalyst::persistence::{Cache, MemoryStore, Persistence, PostgresStore, RuntimeSettings};
use catalyst::scanner::{CatalystScanner, HttpMarketData};
use catalyst::services::{HealthMonitor, Metrics};
use catalyst::sources::build_sources;
use catalyst::Result;

#[derive(Parser)]
#[command(name = "catalyst", version, about = "News-driven catalyst trading system")]
struct Cli {
    /// Use the in-memory store instead of Postgres (demo/dev only).
    #[arg(long, global = true)]
    in_memory: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full system: scheduler, HTTP surfaces, background sweeps.
    Run,
    /// Run one news collection and print the report.
    Collect {
        #[arg(long, default_value = "normal")]
        mode: String,
    },
    /// Run one scan and print the candidates.
    Scan {
        #[arg(long, default_value = "normal")]
        mode: String,
    },
    /// Run one full trading cycle inline.
    Cycle {
        #[arg(long, default_value = "normal")]
        mode: String,
    },
    /// Apply database migrations and exit.
    Migrate,
}

/// Everything constructed at boot. The store handle, config cache, and
/// metrics registry are the only process-wide singletons; components receive
/// them by injection.
struct App {
    store: Arc<dyn Persistence>,
    collector: Arc<NewsCollector>,
    scanner: Arc<CatalystScanner>,
    coordinator: Arc<CycleCoordinator>,
    health: Arc<HealthMonitor>,
    settings: Arc<RuntimeSettings>,
    metrics: Arc<Metrics>,
    config: AppConfig,
}

async fn build_store(config: &AppConfig, in_memory: bool) -> Result<Arc<dyn Persistence>> {
    if in_memory {
        info!("using in-memory store (no persistence across restarts)");
        return Ok(Arc::new(MemoryStore::new()));
    }
    let store = PostgresStore::new(&config.database.url, config.database.max_connections).await?;
    store.migrate().await?;
    Ok(Arc::new(store))
}

async fn build_app(config: AppConfig, in_memory: bool) -> Result<App> {
    let store = build_store(&config, in_memory).await?;
    let cache = Arc::new(Cache::new());
    let metrics = Arc::new(Metrics::new());
    let settings = Arc::new(RuntimeSettings::new(
        store.clone(),
        cache.clone(),
        Duration::from_secs(config.cache.config_ttl_secs),
    ));

    let http = reqwest::Client::builder()
        .user_agent(concat!("catalyst/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let sources = build_sources(&config.news, http.clone());
    let normalizer = Normalizer::new(&config.news, &config.schedule)?;
    info!(
        basis = %config.news.early_minutes_basis,
        "avg_early_minutes basis selected"
    );
    let collector = Arc::new(NewsCollector::new(
        store.clone(),
        cache.clone(),
        metrics.clone(),
        sources,
        normalizer,
        &config.news,
        &config.cache,
    ));
    info!(sources = collector.source_count(), "news collector initialized");

    let market = Arc::new(HttpMarketData::new(
        http.clone(),
        config.scanner.market_data_url.clone(),
        Duration::from_secs(config.scanner.scan_timeout_secs.min(10)),
    ));
    let scanner = Arc::new(CatalystScanner::new(
        store.clone(),
        cache.clone(),
        metrics.clone(),
        settings.clone(),
        market,
        config.scanner.clone(),
        &config.cache,
    ));
    info!("catalyst scanner initialized");

    let collaborators = Arc::new(HttpCollaborators::new(
        http.clone(),
        config.coordinator.clone(),
    ));
    let health_targets = vec![
        (
            "pattern_analysis".to_string(),
            format!(
                "{}{}",
                config.coordinator.pattern.url, config.coordinator.pattern.health_path
            ),
        ),
        (
            "technical_analysis".to_string(),
            format!(
                "{}{}",
                config.coordinator.technical.url, config.coordinator.technical.health_path
            ),
        ),
        (
            "paper_trading".to_string(),
            format!(
                "{}{}",
                config.coordinator.trading.url, config.coordinator.trading.health_path
            ),
        ),
        (
            "market_data".to_string(),
            format!("{}/health", config.scanner.market_data_url),
        ),
    ];
    let health = Arc::new(HealthMonitor::new(http, store.clone(), health_targets));

    let coordinator = Arc::new(CycleCoordinator::new(
        store.clone(),
        collector.clone(),
        scanner.clone(),
        collaborators,
        health.clone(),
        settings.clone(),
        metrics.clone(),
        config.coordinator.confidence_floor,
    ));
    info!("cycle coordinator initialized");

    Ok(App {
        store,
        collector,
        scanner,
        coordinator,
        health,
        settings,
        metrics,
        config,
    })
}

async fn serve(router: axum::Router, port: u16, name: &'static str) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, service = name, "HTTP surface listening");
    axum::serve(listener, router)
        .await
        .map_err(|e| catalyst::CatalystError::Internal(format!("{name} server error: {e}")))?;
    Ok(())
}

async fn run(app: App) -> Result<()> {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = AppState::new(
        app.coordinator.clone(),
        app.collector.clone(),
        app.scanner.clone(),
        app.metrics.clone(),
    );

    // HTTP surfaces.
    for (router, port, name) in [
        (
            coordination_router(state.clone()),
            app.config.api.coordinator_port,
            "coordination",
        ),
        (news_router(state.clone()), app.config.api.news_port, "news"),
        (
            scanner_router(state.clone()),
            app.config.api.scanner_port,
            "scanner",
        ),
    ] {
        tokio::spawn(async move {
            if let Err(e) = serve(router, port, name).await {
                error!(service = name, error = %e, "HTTP surface exited");
            }
        });
    }

    // Background loops.
    tokio::spawn(
        app.health
            .clone()
            .run(
                Duration::from_secs(app.config.coordinator.health_check_secs),
                shutdown_rx.clone(),
            ),
    );

    let sweeper = Arc::new(OutcomeSweeper::new(
        app.store.clone(),
        app.collector.clone(),
        app.metrics.clone(),
    ));
    tokio::spawn(sweeper.run(
        Duration::from_secs(app.config.coordinator.outcome_sweep_minutes * 60),
        shutdown_rx.clone(),
    ));

    // Hourly coordinated-narrative sweep.
    {
        let collector = app.collector.clone();
        let mut shutdown = shutdown_rx.clone();
        let every = Duration::from_secs(app.config.coordinator.narrative_sweep_minutes * 60);
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        if let Err(e) = collector.narrative_sweep().await {
                            error!(error = %e, "narrative sweep failed");
                        }
                    }
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            return;
                        }
                    }
                }
            }
        });
    }

    // Market-time scheduler drives cycles until shutdown.
    let scheduler = Scheduler::new(
        app.coordinator.clone(),
        app.settings.clone(),
        &app.config.schedule,
    );
    tokio::spawn(scheduler.run(shutdown_rx));

    info!("catalyst trading system running; Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, stopping background loops");
    let _ = shutdown_tx.send(true);
    // Give loops a moment to observe the signal and wind down.
    tokio::time::sleep(Duration::from_millis(250)).await;
    info!("catalyst trading system stopped");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = AppConfig::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.filter)),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "starting catalyst");

    match cli.command {
        Command::Migrate => {
            let store =
                PostgresStore::new(&config.database.url, config.database.max_connections).await?;
            store.migrate().await?;
            info!("migrations applied");
        }
        Command::Run => {
            let app = build_app(config, cli.in_memory).await?;
            run(app).await?;
        }
        Command::Collect { mode } => {
            let app = build_app(config, cli.in_memory).await?;
            let report = app.collector.collect(mode.parse()?).await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Scan { mode } => {
            let app = build_app(config, cli.in_memory).await?;
            let result = app.scanner.scan(mode.parse()?).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        Command::Cycle { mode } => {
            let app = build_app(config, cli.in_memory).await?;
            let cycle = app.coordinator.run_once(mode.parse()?).await?;
            println!("{}", serde_json::to_string_pretty(&cycle)?);
        }
    }

    Ok(())
}
