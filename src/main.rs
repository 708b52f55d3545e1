use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tracing::{error, info};

use crew_pipeline::analysis::create_sample_data;
use crew_pipeline::llm::GeminiFactory;
use crew_pipeline::pipeline::unattended::DEFAULT_REQUEST;
use crew_pipeline::pipeline::{run_unattended, Stage};
use crew_pipeline::utils::init_logger;
use crew_pipeline::{config::Config, create_router, AppState};

#[derive(Parser)]
#[command(name = "crew-pipeline", version, about = "Data science crew: intake, data engineering, analysis, reporting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the web UI and stage API
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Run all four stages unattended on a CSV
    Run {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = DEFAULT_REQUEST)]
        request: String,
        /// Overrides GOOGLE_API_KEY
        #[arg(long)]
        api_key: Option<String>,
    },
    /// Write the built-in synthetic churn dataset
    SampleData {
        #[arg(long, default_value = "sample_churn_data.csv")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let _guard = init_logger(config.log_dir.as_deref());

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Run { csv, request, api_key } => run(config, csv, request, api_key).await,
        Commands::SampleData { output } => {
            let rows = create_sample_data(&output)?;
            println!("Clean dataset created at: {} ({} rows)", output.display(), rows);
            Ok(())
        }
    }
}

async fn serve(mut config: Config, host: Option<String>, port: Option<u16>) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }
    std::fs::create_dir_all(&config.pipeline.workspace_dir)?;
    info!(
        workspace = %config.pipeline.workspace_dir.display(),
        capable = %config.llm.capable_model,
        fast = %config.llm.fast_model,
        "Configuration loaded"
    );

    let llm = Arc::new(GeminiFactory::from_config(&config));
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let app = create_router(AppState::new(config, llm));

    info!("Server listening on {}", addr);
    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    Ok(())
}

async fn run(config: Config, csv: PathBuf, request: String, api_key: Option<String>) -> anyhow::Result<()> {
    let llm = GeminiFactory::from_config(&config);
    println!("Starting pipeline on {} in {}", csv.display(), config.pipeline.workspace_dir.display());

    let report = run_unattended(&config, &llm, &csv, &request, api_key.as_deref()).await?;
    for stage in &report.stages {
        println!("  {} [{}]: {}", stage.stage, if stage.ok { "ok" } else { "failed" }, stage.detail);
    }
    println!("Artifacts: {}", report.artifacts.join(", "));

    if report.succeeded() {
        if let Some(deck) = &report.deck_path {
            println!("Pipeline complete. Presentation: {}", deck.display());
        }
        Ok(())
    } else {
        let failed = report.failed_stage().unwrap_or(Stage::Intake);
        error!(stage = %failed, "Pipeline stopped");
        anyhow::bail!("pipeline stopped at stage {}/4 ({})", failed.number(), failed)
    }
}
