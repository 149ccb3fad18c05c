// File: orchestrator/src/main.rs
use anyhow::Result;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use orchestrator::constants::health::CLEANUP_HOUR;
use orchestrator::scheduler::{CronSpec, JobFn};
use orchestrator::web::{start_web_server, AppState};
use orchestrator::{
    ConfigManager, Database, HealthMonitor, LimiterRegistry, Scheduler, ServiceFactory,
    ServiceManager,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with reduced verbosity
    let env_filter = EnvFilter::from_default_env()
        .add_directive("orchestrator=info".parse()?)
        .add_directive("tower_http=warn".parse()?)
        .add_directive("hyper=warn".parse()?)
        .add_directive("reqwest=warn".parse()?)
        .add_directive("sqlx=warn".parse()?);

    fmt().with_env_filter(env_filter).init();

    info!("Starting Service Orchestrator");

    // Load configuration
    let config_manager = ConfigManager::new("config".to_string()).await?;
    let config = config_manager.get_current_config();
    info!(
        "Configuration loaded: {} units, {} rate limiters",
        config.units.len(),
        config.rate_limiters.len()
    );

    // Initialize database
    let database = Arc::new(Database::new(&config.database_path).await?);
    info!("Database initialized at {}", config.database_path);

    let limiters = Arc::new(LimiterRegistry::from_config(&config.rate_limiters));
    let scheduler = Scheduler::from_config(&config.scheduler)?;
    info!("Scheduler initialized in timezone {}", scheduler.timezone());

    // Previously applied runtime configuration wins over the files
    let overrides = match database.get_all_unit_configs().await {
        Ok(overrides) => overrides,
        Err(e) => {
            warn!("Could not load persisted unit configuration: {}", e);
            Default::default()
        }
    };

    let factory = ServiceFactory::new(config.clone(), scheduler.clone(), limiters.clone())?
        .with_overrides(overrides);
    let units = factory.build().await;
    let manager = Arc::new(ServiceManager::new(units, config.stop_timeout()));

    scheduler.start();

    let results = manager.start_services().await;
    let started = results.values().filter(|ok| **ok).count();
    info!("Started {}/{} units", started, results.len());
    for (name, ok) in &results {
        if !ok {
            error!("✗ Unit {} failed to start", name);
        }
    }

    // Background health monitoring
    let shutdown = CancellationToken::new();
    let monitor = Arc::new(HealthMonitor::new(&config, manager.clone(), database.clone()));
    let monitor_handle = monitor.clone().spawn(shutdown.child_token());

    // Daily health history cleanup
    let cleanup_monitor = monitor.clone();
    scheduler.add_cron_job(
        JobFn::new("cleanup_health_history", move || {
            let monitor = cleanup_monitor.clone();
            async move {
                match monitor.cleanup_history().await {
                    Ok(removed) => info!("Removed {} expired health records", removed),
                    Err(e) => error!("Health history cleanup failed: {}", e),
                }
            }
        }),
        &CronSpec::new().minute("0").hour(&CLEANUP_HOUR.to_string()),
        Some("cleanup_health_history"),
    )?;

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(e) => error!("Failed to listen for shutdown signal: {}", e),
        }
        signal_token.cancel();
    });

    let state = AppState::new(
        config.clone(),
        manager.clone(),
        scheduler.clone(),
        limiters,
        database,
    );
    if let Err(e) = start_web_server(state, shutdown.clone()).await {
        error!("Web server failed: {}", e);
        shutdown.cancel();
    }

    // Graceful shutdown
    if let Err(e) = monitor_handle.await {
        warn!("Health monitor task ended abnormally: {}", e);
    }
    let stopped = manager.stop_services(config.stop_timeout()).await;
    for (name, ok) in &stopped {
        if !ok {
            warn!("Unit {} did not stop cleanly", name);
        }
    }
    scheduler.shutdown().await;
    info!("Service Orchestrator stopped");

    Ok(())
}
