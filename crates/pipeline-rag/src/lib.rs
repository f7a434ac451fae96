//! pipeline-rag: PDF-to-answer retrieval-augmented generation
//!
//! Two small pipelines of typed stages share an in-memory document store:
//!
//! - ingestion: `converter -> cleaner -> splitter -> embedder -> writer`, saved as a
//!   timestamped JSON snapshot and recorded in a JSON state file
//! - inference: `query_embedder -> retriever -> prompt_builder -> llm`
//!
//! Stages declare typed input and output ports; a [`Pipeline`] checks every connection
//! and runs stages in dependency order.

pub mod config;
pub mod embeddings;
pub mod error;
pub mod generation;
pub mod ingestion;
pub mod pipeline;
pub mod processing;
pub mod providers;
pub mod retrieval;
pub mod storage;
pub mod types;

pub use config::{Credentials, RagConfig};
pub use error::{Error, Result};
pub use pipeline::{Pipeline, PipelineInputs, PipelineOutputs, PortValue, PortValues, Stage};
pub use processing::{Answer, InferenceDriver, IngestionDriver, IngestionReport};
pub use storage::{InMemoryDocumentStore, StateRecord};
pub use types::{Document, FileType, Meta};
