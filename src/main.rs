use std::path::Path;

use clap::Parser;
use tracing::info;

use claimchart::agent::GeminiRunner;
use claimchart::cli::{Cli, Commands};
use claimchart::config::Config;
use claimchart::error::Result;
use claimchart::extract::{self, SourceFormat};
use claimchart::gemini::GeminiClient;
use claimchart::orchestrator::Orchestrator;
use claimchart::prompts::PromptEngine;
use claimchart::server;

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging();

    info!("claimchart starting");

    let config = match Config::load(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            std::process::exit(1);
        }
    };

    info!(?config, "config loaded");

    let result = match &cli.command {
        Commands::Serve { .. } => server::run_server(config).await,
        Commands::Process { file, text } => run_process(config, file, *text).await,
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

/// One-shot mode: extract the file, run the pipeline, print the result JSON.
async fn run_process(config: Config, file: &Path, as_text: bool) -> Result<()> {
    let source_text = if as_text {
        let bytes = std::fs::read(file)?;
        extract::extract_text(SourceFormat::Text, &bytes)?
    } else {
        extract::extract_from_path(file)?
    };

    let client = GeminiClient::new(&config)?;
    let runner = GeminiRunner::new(client);
    let engine = PromptEngine::new(config.prompt_dir.clone());
    let orchestrator = Orchestrator::new(runner, engine, config);

    let result = orchestrator.run(&source_text).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
