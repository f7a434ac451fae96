//! In-memory document store with embedding retrieval and JSON snapshots

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};
use crate::types::Document;

/// Vector similarity function
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Similarity {
    /// Raw dot product
    #[default]
    DotProduct,
    /// Cosine similarity
    Cosine,
}

/// What to do when a written document id already exists
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Reject the whole batch
    #[default]
    Fail,
    /// Keep the stored document, drop the new one
    Skip,
    /// Replace the stored document
    Overwrite,
}

/// On-disk snapshot layout
#[derive(Serialize, Deserialize)]
struct Snapshot {
    similarity: Similarity,
    documents: Vec<Document>,
}

/// Documents keyed by id, searched by embedding similarity
#[derive(Debug, Default)]
pub struct InMemoryDocumentStore {
    similarity: Similarity,
    documents: RwLock<HashMap<String, Document>>,
}

impl InMemoryDocumentStore {
    /// Create an empty store
    pub fn new(similarity: Similarity) -> Self {
        Self {
            similarity,
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Similarity function used for retrieval
    pub fn similarity(&self) -> Similarity {
        self.similarity
    }

    /// Number of stored documents
    pub fn count_documents(&self) -> usize {
        self.documents.read().len()
    }

    /// Look up one document
    pub fn get_document(&self, id: &str) -> Option<Document> {
        self.documents.read().get(id).cloned()
    }

    /// All documents, ordered by id
    pub fn filter_documents(&self) -> Vec<Document> {
        let mut docs: Vec<Document> = self.documents.read().values().cloned().collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    /// Write documents, returning how many were stored
    pub fn write_documents(&self, documents: Vec<Document>, policy: DuplicatePolicy) -> Result<usize> {
        let mut store = self.documents.write();

        if policy == DuplicatePolicy::Fail {
            let mut seen = std::collections::HashSet::new();
            for doc in &documents {
                if store.contains_key(&doc.id) || !seen.insert(doc.id.as_str()) {
                    return Err(Error::DuplicateDocument(doc.id.clone()));
                }
            }
        }

        let mut written = 0;
        for doc in documents {
            if policy == DuplicatePolicy::Skip && store.contains_key(&doc.id) {
                tracing::debug!("Skipping existing document {}", doc.id);
                continue;
            }
            store.insert(doc.id.clone(), doc);
            written += 1;
        }

        Ok(written)
    }

    /// Remove documents by id; unknown ids are ignored
    pub fn delete_documents(&self, ids: &[String]) -> usize {
        let mut store = self.documents.write();
        ids.iter().filter(|id| store.remove(id.as_str()).is_some()).count()
    }

    /// Top-`top_k` documents by similarity to `query_embedding`
    pub fn embedding_retrieval(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        scale_score: bool,
        return_embedding: bool,
    ) -> Result<Vec<Document>> {
        if query_embedding.is_empty() {
            return Err(Error::config("query embedding must not be empty"));
        }

        let store = self.documents.read();
        let mut scored = Vec::with_capacity(store.len());
        let mut without_embedding = 0usize;

        for doc in store.values() {
            let Some(embedding) = doc.embedding.as_deref() else {
                without_embedding += 1;
                continue;
            };
            if embedding.len() != query_embedding.len() {
                return Err(Error::document_store(format!(
                    "document {} has embedding dimension {}, query has {}",
                    doc.id,
                    embedding.len(),
                    query_embedding.len()
                )));
            }
            let raw = match self.similarity {
                Similarity::DotProduct => dot_product(query_embedding, embedding),
                Similarity::Cosine => cosine_similarity(query_embedding, embedding),
            };
            let score = if scale_score { self.scale(raw) } else { raw };
            scored.push((score, doc));
        }

        if without_embedding > 0 {
            tracing::warn!(
                "Skipped {} documents without embeddings during retrieval",
                without_embedding
            );
        }

        // ties broken by id
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(score, doc)| {
                let mut doc = doc.clone();
                doc.score = Some(score);
                if !return_embedding {
                    doc.embedding = None;
                }
                doc
            })
            .collect())
    }

    fn scale(&self, score: f32) -> f32 {
        match self.similarity {
            Similarity::DotProduct => 1.0 / (1.0 + (-score / 100.0).exp()),
            Similarity::Cosine => (score + 1.0) / 2.0,
        }
    }

    /// Write a JSON snapshot, creating parent directories
    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let snapshot = Snapshot {
            similarity: self.similarity,
            documents: self.filter_documents(),
        };
        fs::write(path, serde_json::to_string(&snapshot)?)?;

        tracing::info!(
            "Saved {} documents to {}",
            snapshot.documents.len(),
            path.display()
        );
        Ok(())
    }

    /// Read a snapshot into a fresh store
    pub fn load_from_disk(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        let snapshot: Snapshot = serde_json::from_str(&data)?;

        let store = Self::new(snapshot.similarity);
        store.write_documents(snapshot.documents, DuplicatePolicy::Fail)?;

        tracing::info!(
            "Loaded {} documents from {}",
            store.count_documents(),
            path.display()
        );
        Ok(store)
    }

    /// Short description recorded in the state file
    pub fn summary(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "InMemoryDocumentStore",
            "similarity": self.similarity,
            "documents": self.count_documents(),
        })
    }
}

fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Returns 0.0 if either vector has zero magnitude
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot = dot_product(a, b);
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn doc(text: &str, embedding: Vec<f32>) -> Document {
        Document::from_text(text).with_embedding(embedding)
    }

    #[test]
    fn test_fail_policy_rejects_whole_batch() {
        let store = InMemoryDocumentStore::default();
        store
            .write_documents(vec![doc("a", vec![1.0, 0.0])], DuplicatePolicy::Fail)
            .unwrap();

        let err = store
            .write_documents(
                vec![doc("b", vec![0.0, 1.0]), doc("a", vec![1.0, 0.0])],
                DuplicatePolicy::Fail,
            )
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateDocument(_)));
        assert_eq!(store.count_documents(), 1);
    }

    #[test]
    fn test_skip_and_overwrite_policies() {
        let store = InMemoryDocumentStore::default();
        let original = doc("a", vec![1.0, 0.0]);
        store.write_documents(vec![original.clone()], DuplicatePolicy::Fail).unwrap();

        let replacement = doc("a", vec![0.0, 1.0]);
        assert_eq!(store.write_documents(vec![replacement.clone()], DuplicatePolicy::Skip).unwrap(), 0);
        assert_eq!(store.get_document(&original.id).unwrap().embedding, original.embedding);

        assert_eq!(store.write_documents(vec![replacement.clone()], DuplicatePolicy::Overwrite).unwrap(), 1);
        assert_eq!(store.get_document(&original.id).unwrap().embedding, replacement.embedding);
    }

    #[test]
    fn test_retrieval_orders_by_score_and_truncates() {
        let store = InMemoryDocumentStore::new(Similarity::Cosine);
        store
            .write_documents(
                vec![
                    doc("north", vec![0.0, 1.0]),
                    doc("east", vec![1.0, 0.0]),
                    doc("north-east", vec![1.0, 1.0]),
                    Document::from_text("no embedding"),
                ],
                DuplicatePolicy::Fail,
            )
            .unwrap();

        let results = store.embedding_retrieval(&[1.0, 0.1], 2, false, false).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].content, "east");
        assert_eq!(results[1].content, "north-east");
        assert!(results[0].score.unwrap() > results[1].score.unwrap());
        assert!(results[0].embedding.is_none());

        let with_embedding = store.embedding_retrieval(&[1.0, 0.1], 1, true, true).unwrap();
        let score = with_embedding[0].score.unwrap();
        assert!((0.0..=1.0).contains(&score));
        assert!(with_embedding[0].embedding.is_some());
    }

    #[test]
    fn test_equal_scores_are_ordered_by_id() {
        let docs: Vec<Document> = (0..8)
            .map(|i| doc(&format!("chunk {i}"), vec![1.0, 0.0]))
            .collect();
        let lowest_id = docs.iter().map(|d| d.id.clone()).min().unwrap();

        for _ in 0..20 {
            let store = InMemoryDocumentStore::default();
            store.write_documents(docs.clone(), DuplicatePolicy::Fail).unwrap();
            let top = store.embedding_retrieval(&[1.0, 0.0], 1, false, false).unwrap();
            assert_eq!(top.len(), 1);
            assert_eq!(top[0].id, lowest_id);

            let all = store.embedding_retrieval(&[1.0, 0.0], 8, false, false).unwrap();
            let ids: Vec<&str> = all.iter().map(|d| d.id.as_str()).collect();
            let mut sorted = ids.clone();
            sorted.sort();
            assert_eq!(ids, sorted);
        }
    }

    #[test]
    fn test_delete_documents_ignores_unknown_ids() {
        let store = InMemoryDocumentStore::default();
        let a = doc("a", vec![1.0, 0.0]);
        let b = doc("b", vec![0.0, 1.0]);
        store
            .write_documents(vec![a.clone(), b.clone()], DuplicatePolicy::Fail)
            .unwrap();

        let removed = store.delete_documents(&[a.id.clone(), "no-such-id".to_string()]);
        assert_eq!(removed, 1);
        assert_eq!(store.count_documents(), 1);
        assert!(store.get_document(&a.id).is_none());
        assert!(store.get_document(&b.id).is_some());

        assert_eq!(store.delete_documents(&[a.id]), 0);
    }

    #[test]
    fn test_retrieval_rejects_bad_queries() {
        let store = InMemoryDocumentStore::default();
        store
            .write_documents(vec![doc("a", vec![1.0, 0.0, 0.0])], DuplicatePolicy::Fail)
            .unwrap();

        assert!(matches!(
            store.embedding_retrieval(&[], 1, false, false),
            Err(Error::Config(_))
        ));
        assert!(matches!(
            store.embedding_retrieval(&[1.0, 0.0], 1, false, false),
            Err(Error::DocumentStore(_))
        ));
    }

    #[test]
    fn test_snapshot_round_trip_preserves_documents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("document_store.json");

        let store = InMemoryDocumentStore::new(Similarity::Cosine);
        let docs: Vec<Document> = (0..5)
            .map(|i| doc(&format!("chunk {}", i), vec![i as f32, 0.5, -1.25]).with_meta("split_id", i))
            .collect();
        store.write_documents(docs, DuplicatePolicy::Fail).unwrap();
        store.save_to_disk(&path).unwrap();

        let loaded = InMemoryDocumentStore::load_from_disk(&path).unwrap();
        assert_eq!(loaded.count_documents(), 5);
        assert_eq!(loaded.similarity(), Similarity::Cosine);
        assert_eq!(loaded.filter_documents(), store.filter_documents());
    }

    #[test]
    fn test_load_missing_snapshot_is_not_found() {
        let dir = TempDir::new().unwrap();
        let err = InMemoryDocumentStore::load_from_disk(&dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
