//! Retrieval stage

mod retriever;

pub use retriever::EmbeddingRetriever;
