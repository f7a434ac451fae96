//! Question answering binary
//!
//! Run with: cargo run -p pipeline-rag --bin rag-query -- "Who is the author?"

use clap::Parser;
use pipeline_rag::{Credentials, InferenceDriver, RagConfig};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "rag-query", about = "Answer a question from the ingested documents", version)]
struct Cli {
    /// TOML configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Store snapshot to load (defaults to the one recorded in the state file)
    #[arg(short, long)]
    store: Option<PathBuf>,

    /// Number of documents to retrieve (defaults to `retriever.top_k`)
    #[arg(short = 'k', long)]
    top_k: Option<usize>,

    /// Question to answer
    #[arg(default_value = "Who is the author")]
    question: String,
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
    let credentials = Credentials::from_env(&config)?;

    let driver = match &cli.store {
        Some(store) => InferenceDriver::from_config(&config, store, &credentials)?,
        None => InferenceDriver::from_state(&config, &credentials)?,
    };

    let answer = driver.ask(&cli.question, cli.top_k).await?;

    for doc in &answer.documents {
        tracing::info!(
            "Context: {} (score {:?}, page {})",
            doc.meta
                .get("file_path")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
            doc.score,
            doc.meta.get("page_number").cloned().unwrap_or_default()
        );
    }
    println!("{}", answer.reply);

    Ok(())
}
