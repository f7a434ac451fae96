//! Embedding similarity retrieval over the in-memory store

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::RetrieverConfig;
use crate::error::{Error, Result};
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::storage::InMemoryDocumentStore;

/// Returns the `top_k` stored documents closest to a query embedding
pub struct EmbeddingRetriever {
    store: Arc<InMemoryDocumentStore>,
    top_k: usize,
    scale_score: bool,
    return_embedding: bool,
}

impl EmbeddingRetriever {
    pub fn new(store: Arc<InMemoryDocumentStore>, config: &RetrieverConfig) -> Result<Self> {
        if config.top_k == 0 {
            return Err(Error::config("retriever.top_k must be greater than 0"));
        }
        Ok(Self {
            store,
            top_k: config.top_k,
            scale_score: config.scale_score,
            return_embedding: config.return_embedding,
        })
    }
}

#[async_trait]
impl Stage for EmbeddingRetriever {
    fn type_name(&self) -> &'static str {
        "EmbeddingRetriever"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::required("query_embedding", PortType::Embedding),
            PortSpec::optional("top_k", PortType::Integer),
        ]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let query_embedding = inputs.take_embedding("query_embedding")?;
        let top_k = inputs.take_integer("top_k")?.unwrap_or(self.top_k);
        if top_k == 0 {
            return Err(Error::port_value("top_k", "must be greater than 0"));
        }

        let documents = self.store.embedding_retrieval(
            &query_embedding,
            top_k,
            self.scale_score,
            self.return_embedding,
        )?;

        tracing::info!(
            "Retrieved {} of {} documents (top_k {})",
            documents.len(),
            self.store.count_documents(),
            top_k
        );
        for doc in &documents {
            tracing::debug!("  {} score={:?}", doc.id, doc.score);
        }

        Ok(PortValues::new().with("documents", PortValue::Documents(documents)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{DuplicatePolicy, Similarity};
    use crate::types::Document;

    fn store() -> Arc<InMemoryDocumentStore> {
        let store = InMemoryDocumentStore::new(Similarity::Cosine);
        store
            .write_documents(
                vec![
                    Document::from_text("north").with_embedding(vec![0.0, 1.0]),
                    Document::from_text("east").with_embedding(vec![1.0, 0.0]),
                    Document::from_text("north-east").with_embedding(vec![0.7, 0.7]),
                ],
                DuplicatePolicy::Fail,
            )
            .unwrap();
        Arc::new(store)
    }

    fn query(embedding: Vec<f32>) -> PortValues {
        PortValues::new().with("query_embedding", PortValue::Embedding(embedding))
    }

    #[tokio::test]
    async fn test_default_top_k_and_ranking() {
        let retriever = EmbeddingRetriever::new(store(), &RetrieverConfig::default()).unwrap();
        let mut outputs = retriever.run(query(vec![1.0, 0.1])).await.unwrap();
        let docs = outputs.take_documents("documents").unwrap();

        assert_eq!(docs.len(), 3);
        assert_eq!(docs[0].content, "east");
        assert_eq!(docs[1].content, "north-east");
        assert!(docs[0].embedding.is_none());
        assert!(docs[0].score.unwrap() >= docs[1].score.unwrap());
    }

    #[tokio::test]
    async fn test_per_call_top_k_overrides_config() {
        let retriever = EmbeddingRetriever::new(store(), &RetrieverConfig::default()).unwrap();
        let inputs = query(vec![0.0, 1.0]).with("top_k", PortValue::Integer(1));
        let mut outputs = retriever.run(inputs).await.unwrap();
        let docs = outputs.take_documents("documents").unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].content, "north");
    }

    #[tokio::test]
    async fn test_zero_top_k_rejected() {
        let config = RetrieverConfig {
            top_k: 0,
            ..Default::default()
        };
        assert!(EmbeddingRetriever::new(store(), &config).is_err());

        let retriever = EmbeddingRetriever::new(store(), &RetrieverConfig::default()).unwrap();
        let inputs = query(vec![0.0, 1.0]).with("top_k", PortValue::Integer(0));
        assert!(retriever.run(inputs).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_store_returns_nothing() {
        let retriever = EmbeddingRetriever::new(
            Arc::new(InMemoryDocumentStore::default()),
            &RetrieverConfig::default(),
        )
        .unwrap();
        let mut outputs = retriever.run(query(vec![1.0])).await.unwrap();
        assert!(outputs.take_documents("documents").unwrap().is_empty());
    }
}
