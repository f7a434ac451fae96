//! Embedding stages for indexed documents and search queries

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::EmbedderConfig;
use crate::error::{Error, Result};
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::providers::EmbeddingProvider;
use crate::types::Document;

/// Attaches an embedding to every document, calling the provider in batches
pub struct DocumentEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
    meta_fields_to_embed: Vec<String>,
    embedding_separator: String,
}

impl DocumentEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, config: &EmbedderConfig) -> Self {
        Self {
            provider,
            batch_size: config.batch_size.max(1),
            meta_fields_to_embed: config.meta_fields_to_embed.clone(),
            embedding_separator: config.embedding_separator.clone(),
        }
    }

    /// Selected metadata values followed by the content
    fn text_to_embed(&self, document: &Document) -> String {
        let mut parts: Vec<String> = self
            .meta_fields_to_embed
            .iter()
            .filter_map(|key| match document.meta.get(key) {
                None | Some(serde_json::Value::Null) => None,
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(other) => Some(other.to_string()),
            })
            .collect();
        parts.push(document.content.clone());
        parts.join(&self.embedding_separator)
    }

    /// Embed documents in order; fails if the provider returns the wrong number of vectors
    pub async fn embed_documents(&self, mut documents: Vec<Document>) -> Result<Vec<Document>> {
        let texts: Vec<String> = documents.iter().map(|d| self.text_to_embed(d)).collect();

        let mut embeddings = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(self.batch_size).enumerate() {
            tracing::debug!("Embedding batch {} ({} texts)", i + 1, batch.len());
            let batch_embeddings = self.provider.embed_batch(batch).await?;
            if batch_embeddings.len() != batch.len() {
                return Err(Error::embedding(format!(
                    "provider returned {} embeddings for a batch of {}",
                    batch_embeddings.len(),
                    batch.len()
                )));
            }
            embeddings.extend(batch_embeddings);
        }

        for (document, embedding) in documents.iter_mut().zip(embeddings) {
            document.embedding = Some(embedding);
        }
        Ok(documents)
    }
}

#[async_trait]
impl Stage for DocumentEmbedder {
    fn type_name(&self) -> &'static str {
        "DocumentEmbedder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::required("documents", PortType::Documents),
            PortSpec::required("meta", PortType::Json),
        ]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let documents = inputs.take_documents("documents")?;
        let count = documents.len();
        let documents = self.embed_documents(documents).await?;

        tracing::info!(
            "Embedded {} documents with {} ({})",
            count,
            self.provider.name(),
            self.provider.model()
        );

        let meta = serde_json::json!({
            "provider": self.provider.name(),
            "model": self.provider.model(),
            "documents": count,
        });
        Ok(PortValues::new()
            .with("documents", PortValue::Documents(documents))
            .with("meta", PortValue::Json(meta)))
    }
}

/// Embeds a single query string
pub struct TextEmbedder {
    provider: Arc<dyn EmbeddingProvider>,
}

impl TextEmbedder {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl Stage for TextEmbedder {
    fn type_name(&self) -> &'static str {
        "TextEmbedder"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("text", PortType::Text)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![
            PortSpec::required("embedding", PortType::Embedding),
            PortSpec::required("meta", PortType::Json),
        ]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let text = inputs.take_text("text")?;
        let embedding = self.provider.embed_query(&text).await?;
        tracing::debug!("Embedded query ({} dimensions)", embedding.len());

        let meta = serde_json::json!({
            "provider": self.provider.name(),
            "model": self.provider.model(),
        });
        Ok(PortValues::new()
            .with("embedding", PortValue::Embedding(embedding))
            .with("meta", PortValue::Json(meta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Embeds each text as [length, call number]
    #[derive(Default)]
    struct CountingEmbedder {
        batches: Mutex<Vec<Vec<String>>>,
        drop_last: bool,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
            Ok(vec![text.len() as f32, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut batches = self.batches.lock();
            batches.push(texts.to_vec());
            let call = batches.len() as f32;
            let mut out: Vec<Vec<f32>> = texts.iter().map(|t| vec![t.len() as f32, call]).collect();
            if self.drop_last {
                out.pop();
            }
            Ok(out)
        }

        fn name(&self) -> &str {
            "counting"
        }

        fn model(&self) -> &str {
            "test"
        }
    }

    fn config(batch_size: usize, meta_fields: &[&str]) -> EmbedderConfig {
        EmbedderConfig {
            batch_size,
            meta_fields_to_embed: meta_fields.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_batches_and_order() {
        let provider = Arc::new(CountingEmbedder::default());
        let embedder = DocumentEmbedder::new(provider.clone(), &config(2, &[]));
        let docs: Vec<Document> = ["a", "bb", "ccc"].iter().map(|t| Document::from_text(*t)).collect();

        let embedded = embedder.embed_documents(docs).await.unwrap();
        assert_eq!(provider.batches.lock().len(), 2);
        assert_eq!(embedded[0].embedding, Some(vec![1.0, 1.0]));
        assert_eq!(embedded[2].embedding, Some(vec![3.0, 2.0]));
    }

    #[tokio::test]
    async fn test_meta_fields_prefix_text() {
        let provider = Arc::new(CountingEmbedder::default());
        let embedder = DocumentEmbedder::new(provider.clone(), &config(8, &["title", "missing", "page"]));
        let doc = Document::from_text("body")
            .with_meta("title", "Intro")
            .with_meta("page", 3);

        embedder.embed_documents(vec![doc]).await.unwrap();
        assert_eq!(provider.batches.lock()[0], vec!["Intro\n3\nbody".to_string()]);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_error() {
        let provider = Arc::new(CountingEmbedder {
            drop_last: true,
            ..Default::default()
        });
        let embedder = DocumentEmbedder::new(provider, &config(4, &[]));
        let result = embedder.embed_documents(vec![Document::from_text("x")]).await;
        assert!(matches!(result, Err(Error::Embedding(_))));
    }

    #[tokio::test]
    async fn test_text_embedder_stage() {
        let stage = TextEmbedder::new(Arc::new(CountingEmbedder::default()));
        let inputs = PortValues::new().with("text", PortValue::Text("four".to_string()));
        let mut outputs = stage.run(inputs).await.unwrap();
        assert_eq!(outputs.take_embedding("embedding").unwrap(), vec![4.0, 0.0]);
        assert!(outputs.contains("meta"));
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let provider = Arc::new(CountingEmbedder::default());
        let embedder = DocumentEmbedder::new(provider.clone(), &config(4, &[]));
        let inputs = PortValues::new().with("documents", PortValue::Documents(Vec::new()));
        let mut outputs = embedder.run(inputs).await.unwrap();
        assert!(outputs.take_documents("documents").unwrap().is_empty());
        assert!(provider.batches.lock().is_empty());
    }
}
