//! Drivers that assemble and run the ingestion and inference pipelines

mod inference;
mod ingest;

pub use inference::{latest_store_path, Answer, InferenceDriver};
pub use ingest::{IngestionDriver, IngestionReport, TIMESTAMP_FORMAT};
