//! Typed values carried between stage ports

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::types::Document;

/// Type tag of a port
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortType {
    /// Source file paths
    Sources,
    /// A list of documents
    Documents,
    /// A single embedding vector
    Embedding,
    /// A string
    Text,
    /// A non-negative integer
    Integer,
    /// Generated replies
    Replies,
    /// Free-form JSON (provider metadata)
    Json,
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Sources => "Sources",
            Self::Documents => "Documents",
            Self::Embedding => "Embedding",
            Self::Text => "Text",
            Self::Integer => "Integer",
            Self::Replies => "Replies",
            Self::Json => "Json",
        };
        f.write_str(name)
    }
}

/// A value on a port
#[derive(Debug, Clone, PartialEq)]
pub enum PortValue {
    Sources(Vec<PathBuf>),
    Documents(Vec<Document>),
    Embedding(Vec<f32>),
    Text(String),
    Integer(usize),
    Replies(Vec<String>),
    Json(serde_json::Value),
}

impl PortValue {
    /// Type tag of this value
    pub fn port_type(&self) -> PortType {
        match self {
            Self::Sources(_) => PortType::Sources,
            Self::Documents(_) => PortType::Documents,
            Self::Embedding(_) => PortType::Embedding,
            Self::Text(_) => PortType::Text,
            Self::Integer(_) => PortType::Integer,
            Self::Replies(_) => PortType::Replies,
            Self::Json(_) => PortType::Json,
        }
    }
}

/// Declared port on a stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortSpec {
    /// Port name, unique per direction on a stage
    pub name: String,
    /// Value type
    pub port_type: PortType,
    /// Whether the stage cannot run without a value (inputs only)
    pub required: bool,
}

impl PortSpec {
    /// A required port (outputs are always declared this way)
    pub fn required(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            required: true,
        }
    }

    /// An optional input
    pub fn optional(name: impl Into<String>, port_type: PortType) -> Self {
        Self {
            name: name.into(),
            port_type,
            required: false,
        }
    }
}

macro_rules! take_variant {
    ($fn_name:ident, $variant:ident, $ty:ty) => {
        /// Remove a port value, failing if it is absent or of another type
        pub fn $fn_name(&mut self, port: &str) -> Result<$ty> {
            match self.values.remove(port) {
                Some(PortValue::$variant(value)) => Ok(value),
                Some(other) => Err(Error::port_value(
                    port,
                    format!(
                        "expected {}, got {}",
                        PortType::$variant,
                        other.port_type()
                    ),
                )),
                None => Err(Error::port_value(port, "no value")),
            }
        }
    };
}

/// Named port values going into or coming out of one stage
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PortValues {
    values: HashMap<String, PortValue>,
}

impl PortValues {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, port: impl Into<String>, value: PortValue) -> Self {
        self.insert(port, value);
        self
    }

    pub fn insert(&mut self, port: impl Into<String>, value: PortValue) {
        self.values.insert(port.into(), value);
    }

    pub fn get(&self, port: &str) -> Option<&PortValue> {
        self.values.get(port)
    }

    pub fn contains(&self, port: &str) -> bool {
        self.values.contains_key(port)
    }

    pub fn remove(&mut self, port: &str) -> Option<PortValue> {
        self.values.remove(port)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PortValue)> {
        self.values.iter()
    }

    take_variant!(take_sources, Sources, Vec<PathBuf>);
    take_variant!(take_documents, Documents, Vec<Document>);
    take_variant!(take_embedding, Embedding, Vec<f32>);
    take_variant!(take_text, Text, String);
    take_variant!(take_replies, Replies, Vec<String>);

    /// Remove an optional integer; absent is `Ok(None)`
    pub fn take_integer(&mut self, port: &str) -> Result<Option<usize>> {
        match self.values.remove(port) {
            Some(PortValue::Integer(value)) => Ok(Some(value)),
            Some(other) => Err(Error::port_value(
                port,
                format!("expected {}, got {}", PortType::Integer, other.port_type()),
            )),
            None => Ok(None),
        }
    }
}

impl IntoIterator for PortValues {
    type Item = (String, PortValue);
    type IntoIter = std::collections::hash_map::IntoIter<String, PortValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_take_checks_type() {
        let mut values = PortValues::new()
            .with("text", PortValue::Text("hi".to_string()))
            .with("top_k", PortValue::Integer(2));

        assert!(matches!(
            values.take_documents("text"),
            Err(Error::PortValue { .. })
        ));
        // the mistyped value was consumed
        assert!(!values.contains("text"));
        assert_eq!(values.take_integer("top_k").unwrap(), Some(2));
        assert_eq!(values.take_integer("top_k").unwrap(), None);
        assert!(values.take_text("missing").is_err());
    }
}
