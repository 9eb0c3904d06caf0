//! Tuneboard Dashboard
//!
//! Command-line dashboard for the document → dataset → fine-tuned model
//! workflow. Handles:
//! - Sign-in against the Auth Provider
//! - Document upload and deletion
//! - Dataset generation, training, testing and model download
//! - Live training status reconciled from the Training Backend

mod commands;
mod render;
mod session;

use clap::{Parser, Subcommand};
use commands::{account, documents, training, Workspace};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tuneboard_common::{config::AppConfig, metrics};

#[derive(Parser)]
#[command(
    name = "tuneboard",
    about = "Upload documents, generate datasets, train and test models",
    version
)]
struct Cli {
    /// Path to a configuration file (default: config/default plus APP__ env vars)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and store the session
    Login {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },

    /// Create an account
    Signup {
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        confirm_password: String,
    },

    /// Sign out and forget the stored session
    Logout,

    /// Show the signed-in user
    Whoami,

    /// List documents with dataset and model status
    List {
        /// Print rows as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload one or more files
    Upload {
        paths: Vec<PathBuf>,
    },

    /// Delete a document (by id or file name)
    Delete {
        document: String,
    },

    /// Generate a training dataset for a document
    Dataset {
        document: String,
    },

    /// Start training a model on a document's dataset
    Train {
        document: String,

        /// Follow progress until training finishes
        #[arg(long)]
        watch: bool,
    },

    /// Ask a trained model a question
    Test {
        document: String,
        question: String,
    },

    /// Download a trained model archive
    Download {
        document: String,

        /// Target directory (default: backend.download_dir)
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Keep the dashboard live until interrupted
    Watch,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = match &cli.config {
        Some(path) => AppConfig::from_file(&path.to_string_lossy()),
        None => AppConfig::load(),
    }
    .map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    let config = Arc::new(config);

    init_tracing(&config);
    info!("Starting Tuneboard v{}", tuneboard_common::VERSION);

    // Initialize metrics
    if config.observability.metrics_port != 0 {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.observability.metrics_port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                metrics::REQUEST_BUCKETS,
            )?
            .install()?;
        info!("Metrics exporter listening on {}", addr);
    }
    metrics::register_metrics();

    let result = match cli.command {
        Command::Login { email, password } => account::login(&config, &email, &password).await,
        Command::Signup {
            email,
            password,
            confirm_password,
        } => account::signup(&config, &email, &password, &confirm_password).await,
        Command::Logout => account::logout(&config).await,
        Command::Whoami => account::whoami(&config).await,
        command => run_dashboard(config, command).await,
    };

    result.map_err(|e| {
        error!(error = %e, "Command failed");
        e
    })
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    // Logs go to stderr so command output stays pipeable
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run_dashboard(config: Arc<AppConfig>, command: Command) -> anyhow::Result<()> {
    let workspace = Workspace::open(config).await?;

    let result = tokio::select! {
        result = dispatch(&workspace, command) => result,
        _ = shutdown_signal() => Ok(()),
    };

    workspace.close().await?;
    result
}

async fn dispatch(workspace: &Workspace, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List { json } => documents::list(workspace, json).await,
        Command::Upload { paths } => documents::upload(workspace, &paths).await,
        Command::Delete { document } => documents::delete(workspace, &document).await,
        Command::Dataset { document } => documents::dataset(workspace, &document).await,
        Command::Train { document, watch } => training::train(workspace, &document, watch).await,
        Command::Test { document, question } => training::test(workspace, &document, &question).await,
        Command::Download { document, out } => training::download(workspace, &document, out).await,
        Command::Watch => training::watch(workspace).await,
        Command::Login { .. } | Command::Signup { .. } | Command::Logout | Command::Whoami => {
            anyhow::bail!("account commands do not need a workspace")
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
