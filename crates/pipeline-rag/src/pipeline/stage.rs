//! Stage trait implemented by every pipeline building block

use async_trait::async_trait;

use crate::error::Result;

use super::value::{PortSpec, PortValues};

/// A unit of computation with declared input and output ports
///
/// Implementations:
/// - ingestion: `FileConverter`, `DocumentCleaner`, `DocumentSplitter`, `DocumentWriter`
/// - embeddings: `DocumentEmbedder`, `TextEmbedder`
/// - retrieval: `EmbeddingRetriever`
/// - generation: `PromptBuilder`, `Generator`
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage type name for logging
    fn type_name(&self) -> &'static str;

    /// Declared inputs
    fn input_ports(&self) -> Vec<PortSpec>;

    /// Declared outputs
    fn output_ports(&self) -> Vec<PortSpec>;

    /// Run once. `inputs` holds every required input and any optional ones that were set.
    async fn run(&self, inputs: PortValues) -> Result<PortValues>;
}
