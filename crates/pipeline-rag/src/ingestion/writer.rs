//! Final ingestion stage: persist documents into the store

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::Result;
use crate::pipeline::{PortSpec, PortType, PortValue, PortValues, Stage};
use crate::storage::{DuplicatePolicy, InMemoryDocumentStore};

/// Writes incoming documents to a shared document store
pub struct DocumentWriter {
    store: Arc<InMemoryDocumentStore>,
    policy: DuplicatePolicy,
}

impl DocumentWriter {
    pub fn new(store: Arc<InMemoryDocumentStore>, policy: DuplicatePolicy) -> Self {
        Self { store, policy }
    }
}

#[async_trait]
impl Stage for DocumentWriter {
    fn type_name(&self) -> &'static str {
        "DocumentWriter"
    }

    fn input_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents", PortType::Documents)]
    }

    fn output_ports(&self) -> Vec<PortSpec> {
        vec![PortSpec::required("documents_written", PortType::Integer)]
    }

    async fn run(&self, mut inputs: PortValues) -> Result<PortValues> {
        let documents = inputs.take_documents("documents")?;
        let written = self.store.write_documents(documents, self.policy)?;
        tracing::info!(
            "Wrote {} documents ({} in store)",
            written,
            self.store.count_documents()
        );
        Ok(PortValues::new().with("documents_written", PortValue::Integer(written)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::Document;

    fn inputs(docs: Vec<Document>) -> PortValues {
        PortValues::new().with("documents", PortValue::Documents(docs))
    }

    #[tokio::test]
    async fn test_reports_written_count() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let writer = DocumentWriter::new(Arc::clone(&store), DuplicatePolicy::Fail);

        let docs = vec![Document::from_text("one"), Document::from_text("two")];
        let mut outputs = writer.run(inputs(docs)).await.unwrap();
        assert_eq!(outputs.take_integer("documents_written").unwrap(), Some(2));
        assert_eq!(store.count_documents(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_policy_applies() {
        let store = Arc::new(InMemoryDocumentStore::default());
        let fail = DocumentWriter::new(Arc::clone(&store), DuplicatePolicy::Fail);
        fail.run(inputs(vec![Document::from_text("one")])).await.unwrap();

        assert!(matches!(
            fail.run(inputs(vec![Document::from_text("one")])).await,
            Err(Error::DuplicateDocument(_))
        ));

        let skip = DocumentWriter::new(Arc::clone(&store), DuplicatePolicy::Skip);
        let mut outputs = skip
            .run(inputs(vec![Document::from_text("one"), Document::from_text("new")]))
            .await
            .unwrap();
        assert_eq!(outputs.take_integer("documents_written").unwrap(), Some(1));
    }
}
