//! Inference driver: question in, grounded answer out

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::{Credentials, RagConfig};
use crate::embeddings::TextEmbedder;
use crate::error::{Error, Result};
use crate::generation::{Generator, PromptBuilder, DOCUMENTS_VARIABLE};
use crate::pipeline::{Pipeline, PipelineInputs, PortValue};
use crate::providers::{build_embedder, build_llm, EmbeddingProvider, LlmProvider};
use crate::retrieval::EmbeddingRetriever;
use crate::storage::{InMemoryDocumentStore, StateRecord};
use crate::types::Document;

/// Template variable the question is bound to
const QUERY_VARIABLE: &str = "query";

/// Generated answer and the documents it was grounded on
#[derive(Debug, Clone)]
pub struct Answer {
    /// First generated reply
    pub reply: String,
    /// All generated replies
    pub replies: Vec<String>,
    /// Retrieved documents, best first
    pub documents: Vec<Document>,
}

/// Builds and runs `query_embedder -> retriever -> prompt_builder -> llm` over a loaded store
pub struct InferenceDriver {
    pipeline: Pipeline,
    store: Arc<InMemoryDocumentStore>,
    feeds_query_to_prompt: bool,
}

impl InferenceDriver {
    /// Load the store snapshot at `store_path` and wire the inference stages
    pub fn new(
        config: &RagConfig,
        store_path: &Path,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let store = Arc::new(InMemoryDocumentStore::load_from_disk(store_path)?);
        Self::with_store(config, store, embedder, llm)
    }

    /// Wire the inference stages around an already loaded store
    pub fn with_store(
        config: &RagConfig,
        store: Arc<InMemoryDocumentStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        llm: Arc<dyn LlmProvider>,
    ) -> Result<Self> {
        let prompt_builder = PromptBuilder::new(&config.prompt)?;
        let feeds_query_to_prompt = prompt_builder.has_variable(QUERY_VARIABLE);
        let takes_documents = prompt_builder.has_variable(DOCUMENTS_VARIABLE);

        let mut pipeline = Pipeline::new();
        pipeline.add_stage("query_embedder", TextEmbedder::new(embedder))?;
        pipeline.add_stage(
            "retriever",
            EmbeddingRetriever::new(Arc::clone(&store), &config.retriever)?,
        )?;
        pipeline.add_stage("prompt_builder", prompt_builder)?;
        pipeline.add_stage("llm", Generator::new(llm))?;

        pipeline.connect("query_embedder.embedding", "retriever.query_embedding")?;
        if takes_documents {
            pipeline.connect("retriever.documents", "prompt_builder.documents")?;
        }
        pipeline.connect("prompt_builder.prompt", "llm.prompt")?;
        pipeline.validate()?;

        Ok(Self {
            pipeline,
            store,
            feeds_query_to_prompt,
        })
    }

    /// Build providers from `config` and load the store at `store_path`
    pub fn from_config(config: &RagConfig, store_path: &Path, credentials: &Credentials) -> Result<Self> {
        let embedder = build_embedder(&config.embedder, credentials)?;
        let llm = build_llm(&config.generator, credentials)?;
        Self::new(config, store_path, embedder, llm)
    }

    /// Like [`from_config`](Self::from_config), using the store recorded in the state file
    pub fn from_state(config: &RagConfig, credentials: &Credentials) -> Result<Self> {
        let store_path = latest_store_path(&config.paths.state_file)?;
        Self::from_config(config, &store_path, credentials)
    }

    pub fn store(&self) -> &Arc<InMemoryDocumentStore> {
        &self.store
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Answer `query`; `top_k` overrides the configured retriever default
    pub async fn ask(&self, query: &str, top_k: Option<usize>) -> Result<Answer> {
        tracing::info!("Question: {}", query);

        let mut inputs = PipelineInputs::new().with(
            "query_embedder",
            "text",
            PortValue::Text(query.to_string()),
        );
        if self.feeds_query_to_prompt {
            inputs.insert("prompt_builder", QUERY_VARIABLE, PortValue::Text(query.to_string()));
        }
        if let Some(top_k) = top_k {
            inputs.insert("retriever", "top_k", PortValue::Integer(top_k));
        }

        let mut outputs = self.pipeline.run(inputs).await?;

        let documents = outputs
            .take_stage("retriever")
            .ok_or_else(|| Error::internal("retriever produced no output"))?
            .take_documents("documents")?;
        let replies = outputs
            .take_stage("llm")
            .ok_or_else(|| Error::internal("llm produced no output"))?
            .take_replies("replies")?;
        let reply = replies
            .first()
            .cloned()
            .ok_or_else(|| Error::llm("the model returned no replies"))?;

        Ok(Answer {
            reply,
            replies,
            documents,
        })
    }
}

/// Store path recorded by the last ingestion run
pub fn latest_store_path(state_file: &Path) -> Result<PathBuf> {
    let state = StateRecord::load(state_file)?
        .ok_or_else(|| Error::NotFound(state_file.display().to_string()))?;
    if state.store_path.is_empty() {
        return Err(Error::NotFound(format!(
            "no store_path recorded in {}",
            state_file.display()
        )));
    }
    Ok(PathBuf::from(state.store_path))
}
