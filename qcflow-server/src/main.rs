//! qcflow-server - Quality control workflow service
//!
//! Serves the REST API and SSE stream for lab analysts, production analysts,
//! managers and administrators. Talks to an external prediction service for
//! root-cause analysis and hands retraining jobs to a background worker.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use qcflow_common::config::{locate_config_file, prepare_data_folder, read_toml_config, TomlConfig};
use qcflow_common::db::init_database;
use qcflow_common::events::EventBus;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use qcflow_server::config::{CliOverrides, ServerSettings};
use qcflow_server::services::{
    spawn_retraining_worker, HttpPredictionClient, HttpTrainingClient, PredictionService,
    TrainingService, UnconfiguredPredictionService, UnconfiguredTrainingService,
};
use qcflow_server::{bootstrap, build_router, db, AppState};

/// Event bus capacity
const EVENT_BUS_CAPACITY: usize = 256;

/// Command-line arguments for qcflow-server
#[derive(Parser, Debug)]
#[command(name = "qcflow-server")]
#[command(about = "Quality control root-cause workflow service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "QCFLOW_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(short, long, env = "QCFLOW_BIND")]
    bind: Option<String>,

    /// Path to the TOML config file
    #[arg(short, long, env = "QCFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Folder holding the database
    #[arg(short, long, env = "QCFLOW_DATA_FOLDER")]
    data_folder: Option<PathBuf>,

    /// Base URL of the prediction service
    #[arg(long, env = "QCFLOW_PREDICTION_URL")]
    prediction_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Config is read before tracing so its log level can seed the filter
    let config_path = locate_config_file(args.config.as_deref());
    let config_result = config_path.as_deref().map(read_toml_config);
    let toml = match &config_result {
        Some(Ok(config)) => config.clone(),
        _ => TomlConfig::default(),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "qcflow_server={level},qcflow_common={level},tower_http={level}",
                    level = toml.logging.level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting qcflow-server");
    info!(
        "Version {} (git {}, built {}, {})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );

    match (&config_path, &config_result) {
        (Some(path), Some(Ok(_))) => info!("Loaded config file: {}", path.display()),
        (_, Some(Err(e))) => warn!("{} - continuing with compiled defaults", e),
        _ => info!("No config file found, using compiled defaults"),
    }

    let settings = ServerSettings::resolve(
        CliOverrides {
            bind: args.bind,
            port: args.port,
            data_folder: args.data_folder,
            prediction_url: args.prediction_url,
        },
        &toml,
    );

    // Step 1: Data folder and database
    let db_path = prepare_data_folder(&settings.data_folder)
        .context("Failed to prepare data folder")?;
    info!("Database: {}", db_path.display());

    let pool = init_database(&db_path)
        .await
        .context("Failed to open database")?;

    // Step 2: Housekeeping left over from a previous run
    bootstrap::ensure_admin_account(&pool, &settings)
        .await
        .context("Failed to create administrator account")?;

    let now = Utc::now();
    let interrupted = db::retraining::fail_interrupted_jobs(&pool, now).await?;
    if interrupted > 0 {
        warn!("Marked {} interrupted retraining job(s) as failed", interrupted);
    }
    let purged = db::sessions::purge_expired(&pool, now).await?;
    if purged > 0 {
        info!("Purged {} expired session(s)", purged);
    }

    // Step 3: External services
    let prediction: Arc<dyn PredictionService> = match &settings.prediction_url {
        Some(url) => {
            info!("Prediction service: {}", url);
            Arc::new(HttpPredictionClient::new(url, settings.prediction_timeout)?)
        }
        None => {
            warn!("No prediction service configured; root-cause analysis is disabled");
            Arc::new(UnconfiguredPredictionService)
        }
    };

    let trainer: Arc<dyn TrainingService> = match &settings.training_url {
        Some(url) => {
            info!("Training service: {}", url);
            Arc::new(HttpTrainingClient::new(url, settings.training_timeout)?)
        }
        None => {
            warn!("No training service configured; retraining jobs will fail");
            Arc::new(UnconfiguredTrainingService)
        }
    };

    // Step 4: Background worker and router
    let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
    let cancel = CancellationToken::new();
    let (queue, worker) =
        spawn_retraining_worker(pool.clone(), event_bus.clone(), trainer, cancel.clone());

    let addr = settings.listen_addr();
    let state = AppState::new(pool.clone(), event_bus, prediction, queue, settings);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    cancel.cancel();
    if let Err(e) = worker.await {
        error!("Retraining worker ended abnormally: {}", e);
    }
    pool.close().await;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
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
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
