//! AgriCoPilot service entry point
//!
//! ## Modes
//!
//! - default: HTTP server exposing the advisory API
//! - `advise`: run one pipeline from the command line and print the Advisory

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use agri_copilot::api::{create_app, ApiState};
use agri_copilot::config::{self, AgentBackend, AppConfig, StorageBackend};
use agri_copilot::{
    AdvisoryRunner, AgentInvoker, FarmerInput, HttpAgentInvoker, InMemoryProgressStore,
    PipelineId, ProgressStore, SimulatedAgents, SledProgressStore, SoilType,
};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "agri-copilot")]
#[command(about = "AgriCoPilot multi-agent farm advisory service")]
#[command(version)]
struct CliArgs {
    /// Override the server address (default: "0.0.0.0:8080")
    #[arg(short, long, value_name = "HOST:PORT")]
    addr: Option<String>,

    /// Config file; skips the AGRI_CONFIG / ./agri_config.toml search
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Keep progress in memory instead of the configured store
    #[arg(long)]
    memory: bool,

    /// Emit logs as JSON lines
    #[arg(long, env = "AGRI_LOG_JSON")]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<SubCommand>,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Run one advisory pipeline and print the result as JSON
    Advise {
        #[arg(long)]
        crop: String,
        #[arg(long)]
        district: String,
        #[arg(long, default_value = "Loamy")]
        soil_type: String,
        #[arg(long, default_value = "Vegetative")]
        growth_stage: String,
        /// Air temperature in °C
        #[arg(long, allow_negative_numbers = true)]
        temp: f64,
        /// Relative humidity in %
        #[arg(long)]
        humidity: f64,
        #[arg(long)]
        pipeline_id: Option<String>,
    },
}

// ============================================================================
// Wiring
// ============================================================================

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut app_config = match &args.config {
        Some(path) => AppConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => AppConfig::load(),
    };
    app_config.apply_env_overrides();

    if let Some(addr) = &args.addr {
        app_config.server.addr.clone_from(addr);
    }
    if args.memory {
        app_config.storage.backend = StorageBackend::Memory;
    }

    app_config.validate().context("Invalid configuration")?;
    Ok(app_config)
}

fn build_store(app_config: &AppConfig) -> Result<Arc<dyn ProgressStore>> {
    let store: Arc<dyn ProgressStore> = match app_config.storage.backend {
        StorageBackend::Memory => Arc::new(InMemoryProgressStore::new()),
        StorageBackend::Sled => {
            let path = &app_config.storage.path;
            Arc::new(
                SledProgressStore::open(path)
                    .with_context(|| format!("Failed to open progress store at {path}"))?,
            )
        }
    };
    Ok(store)
}

fn build_invoker(app_config: &AppConfig) -> Result<Arc<dyn AgentInvoker>> {
    let agents = &app_config.agents;
    let invoker: Arc<dyn AgentInvoker> = match agents.backend {
        AgentBackend::Simulated => Arc::new(SimulatedAgents::new(agents.delays_ms.as_array())),
        AgentBackend::Http => Arc::new(
            HttpAgentInvoker::new(&agents.base_url, &agents.api_key, agents.request_timeout())
                .context("Failed to build agent HTTP client")?,
        ),
    };
    Ok(invoker)
}

// ============================================================================
// Modes
// ============================================================================

async fn run_advise(runner: AdvisoryRunner, command: SubCommand) -> Result<()> {
    let SubCommand::Advise {
        crop,
        district,
        soil_type,
        growth_stage,
        temp,
        humidity,
        pipeline_id,
    } = command;

    let input = FarmerInput {
        crop,
        district,
        soil_type: SoilType::from(soil_type),
        growth_stage,
        temperature: temp,
        humidity,
        image_url: None,
    };
    let pipeline_id = match pipeline_id {
        Some(raw) => PipelineId::new(raw)?,
        None => PipelineId::generate(),
    };

    info!(pipeline_id = %pipeline_id, "Running advisory pipeline");
    let advisory = runner
        .run(input, pipeline_id.clone())
        .await
        .with_context(|| format!("Pipeline {pipeline_id} failed"))?;

    println!("{}", serde_json::to_string_pretty(&advisory)?);
    Ok(())
}

async fn run_server(
    runner: AdvisoryRunner,
    server_addr: &str,
    cancel_token: CancellationToken,
) -> Result<()> {
    let app = create_app(ApiState::new(runner));

    let listener = tokio::net::TcpListener::bind(server_addr)
        .await
        .with_context(|| format!("Failed to bind to {server_addr}"))?;

    info!("HTTP server listening on {}", server_addr);

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            cancel_token.cancelled().await;
            info!("[HttpServer] Received shutdown signal");
        })
        .await;

    match result {
        Ok(()) => {
            info!("[HttpServer] Graceful shutdown complete");
            Ok(())
        }
        Err(e) => {
            error!("[HttpServer] Server error: {}", e);
            Err(anyhow::anyhow!("HTTP server error: {}", e))
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let mut args = CliArgs::parse();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let app_config = load_config(&args)?;
    info!(
        agents = ?app_config.agents.backend,
        storage = ?app_config.storage.backend,
        stage_timeout_secs = app_config.pipeline.stage_timeout_secs,
        "Configuration loaded"
    );
    config::init(app_config);
    let app_config = config::get();

    let store = build_store(app_config)?;
    let invoker = build_invoker(app_config)?;
    let runner = AdvisoryRunner::new(invoker, store, app_config.pipeline.settings());

    if let Some(command) = args.command.take() {
        return run_advise(runner, command).await;
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, initiating shutdown...");
        shutdown_token.cancel();
    });

    run_server(runner, &app_config.server.addr, cancel_token).await
}
