use clap::Parser;
use gavel::api::{create_router, AppState};
use gavel::cli::{Cli, Commands};
use gavel::config::{AppConfig, LoggingConfig};
use gavel::error::{GavelError, Result};
use gavel::store::{AuctionStore, BidLedger, DealRoomRepository};
use gavel::store::{MemoryAuctionStore, MemoryBidLedger, MemoryDealRooms};
use gavel::EngineRuntime;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Some(Commands::CheckConfig) => {
            init_logging_simple();
            check_config(&cli.config)?;
        }
        Some(Commands::Serve) | None => {
            run_server(&cli.config).await?;
        }
    }

    Ok(())
}

/// Load and validate configuration, printing the outcome
fn check_config(config_dir: &str) -> Result<()> {
    let config = AppConfig::load_from(config_dir)?;
    match config.validate() {
        Ok(()) => {
            println!(
                "\x1b[32m✓ configuration OK\x1b[0m ({} seeded deal rooms)",
                config.rooms.len()
            );
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                println!("\x1b[31m✗ {e}\x1b[0m");
            }
            Err(GavelError::Validation(format!(
                "{} configuration error(s)",
                errors.len()
            )))
        }
    }
}

async fn run_server(config_dir: &str) -> Result<()> {
    let config = AppConfig::load_from(config_dir)?;
    init_logging(&config.logging);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config error: {e}");
        }
        return Err(GavelError::Validation(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    info!(
        "Starting gavel v{} ({} seeded deal rooms)",
        env!("CARGO_PKG_VERSION"),
        config.rooms.len()
    );

    let store: Arc<dyn AuctionStore> = Arc::new(MemoryAuctionStore::new());
    let ledger: Arc<dyn BidLedger> = Arc::new(MemoryBidLedger::new());
    let rooms: Arc<dyn DealRoomRepository> = Arc::new(MemoryDealRooms::seeded(&config.rooms));

    let (runtime, mut workflow_rx) = EngineRuntime::start(store, ledger, rooms, &config.engine);
    let engine = runtime.engine();

    let report = engine.recover().await?;
    info!(
        activated = report.activated,
        closed_overdue = report.closed_overdue,
        rescheduled = report.rescheduled,
        "Recovery sweep complete"
    );

    // Downstream workflow consumer. A real deployment hands these to the
    // order service; the dev server logs them.
    let workflow_handle = tokio::spawn(async move {
        while let Some(order) = workflow_rx.recv().await {
            info!(
                order_id = %order.order_id,
                deal_room_id = %order.deal_room_id,
                buyer_id = %order.buyer_id,
                amount = %order.amount,
                "order.created emitted"
            );
        }
    });

    let app_state = AppState::new(engine);
    let app = create_router(app_state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("API server listening on http://{}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutting down...");
    runtime.shutdown().await;
    workflow_handle.abort();

    info!("Shutdown complete");
    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},gavel=debug", logging.level)));

    // Check if we should write to file (prefer GAVEL_LOG_DIR, fallback to LOG_DIR or /var/log/gavel).
    let log_dir = std::env::var("GAVEL_LOG_DIR")
        .or_else(|_| std::env::var("LOG_DIR"))
        .unwrap_or_else(|_| "/var/log/gavel".to_string());

    // `tracing_appender::rolling::daily` panics if it cannot create the
    // initial log file, so writability has to be preflighted.
    let file_layer = if std::fs::create_dir_all(&log_dir).is_ok() {
        let test_path = std::path::Path::new(&log_dir).join(".gavel_write_test");
        match std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&test_path)
        {
            Ok(_) => {
                let _ = std::fs::remove_file(&test_path);

                // Daily rotating file appender
                let file_appender = tracing_appender::rolling::daily(&log_dir, "gavel.log");
                let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

                // Keep the guard alive by leaking it (acceptable for long-running process)
                Box::leak(Box::new(_guard));

                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false) // No color codes in file
                        .with_target(true),
                )
            }
            Err(e) => {
                eprintln!(
                    "Warning: Could not write to log directory {} ({}), file logging disabled",
                    log_dir, e
                );
                None
            }
        }
    } else {
        eprintln!(
            "Warning: Could not create log directory {}, file logging disabled",
            log_dir
        );
        None
    };

    // Console layer; either human-readable or JSON per configuration
    let (console_layer, json_layer) = if logging.json {
        (None, Some(tracing_subscriber::fmt::layer().json().with_target(true)))
    } else {
        (
            Some(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            ),
            None,
        )
    };

    let file_logging_enabled = file_layer.is_some();
    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(json_layer)
        .with(file_layer)
        .init();

    if file_logging_enabled {
        eprintln!("Logging to: {}/gavel.log", log_dir);
    }
}

fn init_logging_simple() {
    // Minimal logging for CLI commands
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
