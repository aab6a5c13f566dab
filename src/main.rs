//! Main entry point for the vibe-match chat service
//!
//! Loads configuration, starts the WebSocket gateway and the metrics server,
//! and shuts everything down on SIGINT or SIGTERM.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use tokio::signal;
use tokio::time::Duration;
use tracing::{error, info, warn};
use vibe_match::chat::MatchingMode;
use vibe_match::config::{AppConfig, Environment};
use vibe_match::service::{AppState, HealthCheck, ServiceHandle};

/// vibe-match - anonymous random chat matchmaking
#[derive(Parser)]
#[command(
    name = "vibe-match",
    version,
    about = "Anonymous random-chat matchmaking over WebSockets",
    long_about = "vibe-match pairs strangers into one-to-one chat rooms, optionally ranking \
                 partners by shared interests, relays messages and call-setup signals between \
                 them, and tears rooms down when either side leaves."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Gateway port override
    #[arg(short, long, value_name = "PORT", help = "Override WebSocket gateway port")]
    port: Option<u16>,

    /// Metrics port override
    #[arg(long, value_name = "PORT", help = "Override metrics server port")]
    metrics_port: Option<u16>,

    /// Environment override
    #[arg(
        long,
        value_name = "ENV",
        help = "Override environment (development, production)"
    )]
    environment: Option<Environment>,

    /// Matching mode override
    #[arg(
        long,
        value_name = "MODE",
        help = "Override matching mode (score_based, filter_first)"
    )]
    matching_mode: Option<MatchingMode>,

    /// Disable daily rewards
    #[arg(long, help = "Disable the daily coin reward")]
    no_daily_rewards: bool,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log a health summary periodically
async fn health_check_task(handle: ServiceHandle) {
    let mut interval = tokio::time::interval(Duration::from_secs(60));

    while handle.is_running().await {
        interval.tick().await;

        match HealthCheck::check(&handle).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {} connected, {} searching, {} rooms",
                    health.status,
                    health.stats.active_connections,
                    health.stats.users_searching,
                    health.stats.active_rooms
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 vibe-match chat service");
    info!("   Service: {}", config.service.name);
    info!("   Environment: {}", config.service.environment);
    info!("   Log level: {}", config.service.log_level);
    info!(
        "   Gateway: ws://{}:{}/ws",
        config.service.host, config.service.port
    );
    info!("   Metrics port: {}", config.service.metrics_port);
    info!(
        "   Matching: {} (min score {} / premium {})",
        config.matchmaking.mode,
        config.matchmaking.min_score_standard,
        config.matchmaking.min_score_premium
    );
    info!(
        "   Max room age: {}s",
        config.matchmaking.max_room_age_seconds
    );
    info!(
        "   Daily rewards: {}",
        config.matchmaking.enable_daily_rewards
    );
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration from file or environment and apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.port {
        config.service.port = port;
    }

    if let Some(metrics_port) = args.metrics_port {
        config.service.metrics_port = metrics_port;
    }

    if let Some(environment) = args.environment {
        config.service.environment = environment;
    }

    if let Some(mode) = args.matching_mode {
        config.matchmaking.mode = mode;
    }

    if args.no_daily_rewards {
        config.matchmaking.enable_daily_rewards = false;
    }

    vibe_match::config::validate_config(&config)?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = match AppState::new(config.clone()).await {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        let _ = app_state.shutdown().await;
        std::process::exit(1);
    }

    let health_task = tokio::spawn(health_check_task(app_state.handle()));

    info!("✅ vibe-match is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;

    info!("🛑 Shutdown signal received, beginning graceful shutdown...");
    health_task.abort();

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Ok(Err(e)) => {
            error!("Shutdown completed with errors: {}", e);
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 vibe-match stopped");
    Ok(())
}
