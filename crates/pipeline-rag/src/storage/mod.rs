//! Storage module: the in-memory document store and the persisted state record

mod document_store;
pub mod state;

pub use document_store::{DuplicatePolicy, InMemoryDocumentStore, Similarity};
pub use state::{load_json_file, merge_json_file, StateRecord};
