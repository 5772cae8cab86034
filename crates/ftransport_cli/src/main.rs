use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ftransport_control_plane::{build_router, AppState};
use ftransport_providers::{
    DropboxAdapter, GoogleDriveAdapter, GoogleDriveConfig, NotebookLmClient, NotebookLmConfig,
    OnedriveAdapter, TargetAdapter,
};
use ftransport_storage::{FtransportStorage, StorageConfig};
use ftransport_worker::{AdapterSet, ProgressBroker, ProgressSink, TransferWorker, WorkerConfig};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(author, version, about = "Cloud-drive to NotebookLM transfer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/ftransport.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    http: HttpSection,
    storage: StorageSection,
    #[serde(default)]
    providers: ProvidersSection,
    target: TargetSection,
    #[serde(default)]
    worker: WorkerSection,
}

#[derive(Debug, Clone, Deserialize)]
struct HttpSection {
    bind: String,
}

#[derive(Debug, Clone, Deserialize)]
struct StorageSection {
    sqlite_path: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProvidersSection {
    #[serde(default)]
    google: GoogleSection,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct GoogleSection {
    access_token: Option<String>,
    landing_zone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct TargetSection {
    project_id: String,
    location: Option<String>,
    base_url: Option<String>,
    access_token: Option<String>,
    #[serde(default)]
    strict: bool,
}

#[derive(Debug, Clone, Deserialize)]
struct WorkerSection {
    timeout_secs: u64,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self { timeout_secs: 1800 }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config_source = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))?;

    let storage = FtransportStorage::connect(&StorageConfig {
        sqlite_path: config.storage.sqlite_path.clone(),
    })
    .await?;

    let broker = Arc::new(ProgressBroker::new());
    let sink = ProgressSink::new(storage.clone(), Arc::clone(&broker));

    if config.providers.google.access_token.is_none() {
        warn!("no google drive access token configured: google drive transfers will fail");
    }
    let adapters = AdapterSet {
        google: Arc::new(GoogleDriveAdapter::new(GoogleDriveConfig {
            access_token: config.providers.google.access_token.clone(),
            landing_zone: config.providers.google.landing_zone.clone(),
        })),
        dropbox: Arc::new(DropboxAdapter::new()),
        onedrive: Arc::new(OnedriveAdapter::new()),
    };

    let target: Arc<dyn TargetAdapter> = Arc::new(NotebookLmClient::new(NotebookLmConfig {
        project_id: config.target.project_id.clone(),
        location: config.target.location.clone(),
        base_url: config.target.base_url.clone(),
        access_token: config.target.access_token.clone(),
        strict: config.target.strict,
    }));
    if config.target.strict {
        info!("target strict mode enabled: notebook failures fail the transfer");
    }

    let worker = Arc::new(TransferWorker::new(
        storage.clone(),
        sink,
        adapters,
        target,
        WorkerConfig {
            timeout: Duration::from_secs(config.worker.timeout_secs),
        },
    ));

    let state = AppState::new(storage, worker);
    let app = build_router(state);

    let socket: SocketAddr = config
        .http
        .bind
        .parse()
        .with_context(|| format!("invalid socket address {}", config.http.bind))?;

    let listener = tokio::net::TcpListener::bind(socket)
        .await
        .with_context(|| format!("failed to bind {}", config.http.bind))?;

    info!(bind = %config.http.bind, "ftransportd listening");
    axum::serve(listener, app).await.context("axum server failed")
}
