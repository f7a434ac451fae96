//! Ingestion binary
//!
//! Run with: cargo run -p pipeline-rag --bin rag-ingest -- data/report.pdf

use clap::Parser;
use pipeline_rag::{Credentials, IngestionDriver, RagConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rag-ingest", about = "Convert, clean, split, embed and store documents", version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Files to ingest (defaults to `paths.sources` from the configuration)
    sources: Vec<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pipeline_rag=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = RagConfig::load_or_default(cli.config.as_deref())?;
    let sources = if cli.sources.is_empty() {
        config.paths.sources.clone()
    } else {
        cli.sources
    };

    tracing::info!("Configuration loaded");
    tracing::info!("  - Embedder: {:?} ({})", config.embedder.backend, config.embedder.model);
    tracing::info!(
        "  - Splitter: {:?}, length {}, overlap {}",
        config.splitter.split_by,
        config.splitter.split_length,
        config.splitter.split_overlap
    );

    let credentials = Credentials::embedder_from_env(&config)?;
    let driver = IngestionDriver::from_config(config, &credentials)?;
    let report = driver.run(&sources).await?;

    println!(
        "Wrote {} documents to {}",
        report.documents_written,
        report.store_path.display()
    );
    println!("State: {}", driver.config().paths.state_file.display());

    Ok(())
}
