//! Ingestion driver: sources in, persisted document store and state record out

use chrono::Local;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use crate::config::{Credentials, RagConfig};
use crate::embeddings::DocumentEmbedder;
use crate::error::{Error, Result};
use crate::ingestion::{DocumentCleaner, DocumentSplitter, DocumentWriter, FileConverter};
use crate::pipeline::{Pipeline, PipelineInputs, PortValue};
use crate::providers::{build_embedder, EmbeddingProvider};
use crate::storage::{state::STATE_VERSION, InMemoryDocumentStore, StateRecord};

/// Directory name format for store snapshots
pub const TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Outcome of one ingestion run
#[derive(Debug, Clone)]
pub struct IngestionReport {
    /// Documents the writer stored
    pub documents_written: usize,
    /// Where the store snapshot was saved
    pub store_path: PathBuf,
    /// State record after merging this run
    pub state: StateRecord,
}

/// Builds and runs `converter -> cleaner -> splitter -> embedder -> writer`
pub struct IngestionDriver {
    config: RagConfig,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IngestionDriver {
    /// Create a driver with an explicit embedding provider
    pub fn new(config: RagConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, embedder }
    }

    /// Create a driver with the embedding backend selected in `config`
    pub fn from_config(config: RagConfig, credentials: &Credentials) -> Result<Self> {
        let embedder = build_embedder(&config.embedder, credentials)?;
        Ok(Self::new(config, embedder))
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Wire the ingestion stages around `store`
    pub fn build_pipeline(&self, store: Arc<InMemoryDocumentStore>) -> Result<Pipeline> {
        let config = &self.config;
        let mut pipeline = Pipeline::new();

        pipeline.add_stage("converter", FileConverter::new(&config.converter)?)?;
        pipeline.add_stage("cleaner", DocumentCleaner::new(&config.cleaner)?)?;
        pipeline.add_stage("splitter", DocumentSplitter::new(&config.splitter)?)?;
        pipeline.add_stage(
            "embedder",
            DocumentEmbedder::new(Arc::clone(&self.embedder), &config.embedder),
        )?;
        pipeline.add_stage(
            "writer",
            DocumentWriter::new(store, config.document_store.duplicate_policy),
        )?;

        pipeline.connect("converter", "cleaner")?;
        pipeline.connect("cleaner", "splitter")?;
        pipeline.connect("splitter", "embedder")?;
        pipeline.connect("embedder.documents", "writer.documents")?;
        pipeline.validate()?;

        Ok(pipeline)
    }

    /// Snapshot path for a run starting now
    fn snapshot_path(&self) -> PathBuf {
        let timestamp = Local::now().format(TIMESTAMP_FORMAT).to_string();
        self.config
            .paths
            .artifacts_dir
            .join(timestamp)
            .join(&self.config.paths.store_file_name)
    }

    /// Ingest `sources` into a fresh store, save it and record the run in the state file
    pub async fn run(&self, sources: &[PathBuf]) -> Result<IngestionReport> {
        if sources.is_empty() {
            return Err(Error::config("no sources to ingest"));
        }
        let start = Instant::now();
        tracing::info!("Ingesting {} source(s)", sources.len());

        let store = Arc::new(InMemoryDocumentStore::new(self.config.document_store.similarity));
        let pipeline = self.build_pipeline(Arc::clone(&store))?;

        let inputs = PipelineInputs::new().with(
            "converter",
            "sources",
            PortValue::Sources(sources.to_vec()),
        );
        let outputs = pipeline.run(inputs).await?;

        let documents_written = match outputs.get("writer", "documents_written") {
            Some(PortValue::Integer(n)) => *n,
            other => {
                return Err(Error::internal(format!(
                    "writer produced no document count: {:?}",
                    other
                )))
            }
        };

        let store_path = self.snapshot_path();
        store.save_to_disk(&store_path)?;
        let state = self.record_state(&store, &store_path)?;

        tracing::info!(
            "Ingestion complete: {} documents written to {} in {:?}",
            documents_written,
            store_path.display(),
            start.elapsed()
        );

        Ok(IngestionReport {
            documents_written,
            store_path,
            state,
        })
    }

    fn record_state(&self, store: &InMemoryDocumentStore, store_path: &Path) -> Result<StateRecord> {
        let config = &self.config;
        let record = StateRecord {
            version: STATE_VERSION,
            store_path: store_path.display().to_string(),
            document_store: store.summary(),
            converter: serde_json::to_value(&config.converter)?,
            embedder: serde_json::to_value(&config.embedder)?,
            cleaner: serde_json::to_value(&config.cleaner)?,
            splitter: serde_json::to_value(&config.splitter)?,
        };
        record.persist(&config.paths.state_file)
    }
}
