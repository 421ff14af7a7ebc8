//! # Tripwire CLI
//!
//! Command-line entry point for the Tripwire service.
//!
//! One binary runs any combination of the three activities:
//! - `serve` — HTTP API plus both workers in one process (the default
//!   deployment shape)
//! - `api` — the HTTP API alone
//! - `evaluator` / `alerter` — a single worker loop
//!
//! The only mandatory configuration is the store DSN, taken from
//! `TRIPWIRE_DATABASE_URL` or the `--database-url` flag. Shutdown is
//! cooperative: SIGINT/SIGTERM flips a watch channel, the HTTP server
//! drains, and each worker exits at its next tick boundary.

use clap::{Parser, Subcommand};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tripwire_api::{AppState, ServiceError};
use tripwire_core::notify::{NotifierRegistry, NotifyError};
use tripwire_core::source::SourceRegistry;
use tripwire_core::store::{EventStore, StoreError};
use tripwire_engine::{Alerter, EngineError, Evaluator, WorkerConfig};
use tripwire_store::PgEventStore;

// ============================================================================
// CLI Structure
// ============================================================================

/// Tripwire - SQL-rule security alerting for inbound webhook events
#[derive(Parser)]
#[command(name = "tripwire")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Security alerting over SaaS webhook events")]
#[command(
    long_about = "Tripwire ingests webhook events, evaluates operator-defined SQL rules \
                  against each event, and delivers matching alerts to notification channels"
)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP API and both workers in one process
    Serve {
        /// Event store DSN
        #[arg(long, env = "TRIPWIRE_DATABASE_URL")]
        database_url: String,

        /// Port to bind the HTTP server
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Run the HTTP API alone
    Api {
        /// Event store DSN
        #[arg(long, env = "TRIPWIRE_DATABASE_URL")]
        database_url: String,

        /// Port to bind the HTTP server
        #[arg(short, long, default_value = "8080")]
        port: u16,
    },

    /// Run the evaluation worker alone
    Evaluator {
        /// Event store DSN
        #[arg(long, env = "TRIPWIRE_DATABASE_URL")]
        database_url: String,
    },

    /// Run the notification worker alone
    Alerter {
        /// Event store DSN
        #[arg(long, env = "TRIPWIRE_DATABASE_URL")]
        database_url: String,
    },
}

// ============================================================================
// Error Types
// ============================================================================

/// Top-level CLI errors with distinct exit codes (see `main`)
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    #[error("worker error: {0}")]
    Engine(#[from] EngineError),

    #[error("notifier registry error: {0}")]
    Notify(#[from] NotifyError),

    #[error("task failed: {message}")]
    Task { message: String },
}

// ============================================================================
// Entry Point
// ============================================================================

/// Parse arguments, initialize logging, and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tripwire=info,tripwire_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Commands::Serve { database_url, port } => {
            run_service(&database_url, Some(port), true, true).await
        }
        Commands::Api { database_url, port } => {
            run_service(&database_url, Some(port), false, false).await
        }
        Commands::Evaluator { database_url } => {
            run_service(&database_url, None, true, false).await
        }
        Commands::Alerter { database_url } => {
            run_service(&database_url, None, false, true).await
        }
    }
}

/// Connect the store, build the registries, and run the selected activities
/// until a shutdown signal arrives.
async fn run_service(
    database_url: &str,
    api_port: Option<u16>,
    run_evaluator: bool,
    run_alerter: bool,
) -> Result<(), CliError> {
    let store = Arc::new(PgEventStore::connect(database_url).await?);
    store.migrate().await?;
    info!("Event store connected and migrated");

    let sources = Arc::new(SourceRegistry::with_builtin_sources());
    let notifiers = Arc::new(NotifierRegistry::with_builtin_channels()?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let mut tasks: Vec<JoinHandle<Result<(), CliError>>> = Vec::new();

    if let Some(port) = api_port {
        let state = AppState::new(store.clone(), sources.clone(), notifiers.clone());
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            tripwire_api::start_server(state, port, rx)
                .await
                .map_err(CliError::from)
        }));
    }

    if run_evaluator {
        let evaluator = Evaluator::new(
            store.clone() as Arc<dyn EventStore>,
            WorkerConfig::evaluator(),
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            evaluator.run(rx).await.map_err(CliError::from)
        }));
    }

    if run_alerter {
        let alerter = Alerter::new(
            store.clone() as Arc<dyn EventStore>,
            notifiers.clone(),
            sources.clone(),
            WorkerConfig::alerter(),
        );
        let rx = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            alerter.run(rx).await.map_err(CliError::from)
        }));
    }

    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                error!(error = %e, "Activity exited with error");
                return Err(e);
            }
            Err(e) => {
                return Err(CliError::Task {
                    message: e.to_string(),
                })
            }
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Resolve on SIGINT or (on unix) SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C signal handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), initiating graceful shutdown");
        },
        _ = terminate => {
            info!("Received SIGTERM, initiating graceful shutdown");
        },
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
