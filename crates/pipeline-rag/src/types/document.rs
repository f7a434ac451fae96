//! Document type flowing through the pipelines and kept in the store

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Document metadata, ordered so ids hash deterministically
pub type Meta = BTreeMap<String, serde_json::Value>;

/// Supported source file types
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// PDF document
    Pdf,
    /// Plain text file
    Txt,
    /// Markdown file
    Markdown,
    /// Unknown file type
    Unknown,
}

impl FileType {
    /// Detect file type from extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "pdf" => Self::Pdf,
            "txt" | "text" => Self::Txt,
            "md" | "markdown" => Self::Markdown,
            _ => Self::Unknown,
        }
    }

    /// Detect file type from a path's extension
    pub fn from_path(path: &std::path::Path) -> Self {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Unknown)
    }

    /// Check if this is a supported file type
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Get display name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Pdf => "PDF",
            Self::Txt => "Text File",
            Self::Markdown => "Markdown",
            Self::Unknown => "Unknown",
        }
    }
}

/// A unit of retrievable text
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Content-derived identifier
    pub id: String,
    /// Text content
    pub content: String,
    /// Embedding vector, filled by the embedder
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Additional metadata
    #[serde(default)]
    pub meta: Meta,
    /// Similarity score, set on retrieval results only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Document {
    /// Create a document; the id is derived from content and metadata
    pub fn new(content: impl Into<String>, meta: Meta) -> Self {
        let content = content.into();
        let id = Self::compute_id(&content, &meta);
        Self {
            id,
            content,
            embedding: None,
            meta,
            score: None,
        }
    }

    /// Create a document from text with no metadata
    pub fn from_text(content: impl Into<String>) -> Self {
        Self::new(content, Meta::new())
    }

    /// Hex SHA-256 of the content followed by the metadata's canonical JSON
    pub fn compute_id(content: &str, meta: &Meta) -> String {
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        // BTreeMap serialization is key-ordered and cannot fail for JSON values
        let meta_json = serde_json::to_string(meta).unwrap_or_default();
        hasher.update(meta_json.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Builder-style embedding setter
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// Builder-style metadata insert. The id is left unchanged.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Number of pages in `content`, counted by form feeds
    pub fn page_count(content: &str) -> usize {
        content.matches('\x0c').count() + 1
    }
}
