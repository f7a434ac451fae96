//! LLM provider trait for generating answers

use async_trait::async_trait;
use crate::error::Result;

/// Replies and per-reply metadata from one completion call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Generation {
    /// Generated texts, first one is the primary answer
    pub replies: Vec<String>,
    /// Provider metadata (model, finish reason, usage), one entry per reply
    pub meta: Vec<serde_json::Value>,
}

/// Trait for LLM-based text generation
///
/// Implementations:
/// - `OpenAiCompatibleLlm`: any OpenAI-style chat completions endpoint (Groq by default)
/// - `OllamaLlm`: local Ollama server
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Complete a fully rendered prompt
    async fn generate(&self, prompt: &str) -> Result<Generation>;

    /// Get provider name for logging
    fn name(&self) -> &str;

    /// Get the model being used
    fn model(&self) -> &str;
}
