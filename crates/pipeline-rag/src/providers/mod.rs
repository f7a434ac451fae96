//! Provider abstractions for embeddings and LLM generation
//!
//! Stages depend only on the traits; the concrete backend is picked from
//! configuration at pipeline construction time.

pub mod cohere;
pub mod embedding;
pub mod llm;
pub mod ollama;
pub mod openai;

use std::sync::Arc;

use crate::config::{Credentials, EmbedderConfig, EmbeddingBackend, GeneratorBackend, GeneratorConfig};
use crate::error::{Error, Result};

pub use cohere::CohereEmbedder;
pub use embedding::EmbeddingProvider;
pub use llm::{Generation, LlmProvider};
pub use ollama::{OllamaEmbedder, OllamaLlm};
pub use openai::OpenAiCompatibleLlm;

/// Build the embedding provider selected by `config`
pub fn build_embedder(
    config: &EmbedderConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn EmbeddingProvider>> {
    let provider: Arc<dyn EmbeddingProvider> = match config.backend {
        EmbeddingBackend::Cohere => {
            let key = credentials
                .embedder_api_key
                .as_deref()
                .ok_or_else(|| Error::MissingCredential {
                    var: config.api_key_env.clone(),
                })?;
            Arc::new(CohereEmbedder::new(config, key)?)
        }
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedder::new(config)?),
    };

    tracing::info!(
        "Embedding provider: {} ({})",
        provider.name(),
        provider.model()
    );
    Ok(provider)
}

/// Build the LLM provider selected by `config`
pub fn build_llm(config: &GeneratorConfig, credentials: &Credentials) -> Result<Arc<dyn LlmProvider>> {
    let provider: Arc<dyn LlmProvider> = match config.backend {
        GeneratorBackend::OpenAi => {
            let key = credentials
                .generator_api_key
                .as_deref()
                .ok_or_else(|| Error::MissingCredential {
                    var: config.api_key_env.clone(),
                })?;
            Arc::new(OpenAiCompatibleLlm::new(config, key)?)
        }
        GeneratorBackend::Ollama => Arc::new(OllamaLlm::new(config)?),
    };

    tracing::info!("LLM provider: {} ({})", provider.name(), provider.model());
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_names_the_variable() {
        let err = build_llm(&GeneratorConfig::default(), &Credentials::default())
            .err()
            .unwrap();
        match err {
            Error::MissingCredential { var } => assert_eq!(var, "GROQ_API_KEY"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_ollama_needs_no_key() {
        let config = EmbedderConfig {
            backend: EmbeddingBackend::Ollama,
            model: "nomic-embed-text".to_string(),
            base_url: "http://localhost:11434".to_string(),
            ..Default::default()
        };
        let embedder = build_embedder(&config, &Credentials::default()).unwrap();
        assert_eq!(embedder.name(), "ollama");
        assert_eq!(embedder.model(), "nomic-embed-text");
    }
}
