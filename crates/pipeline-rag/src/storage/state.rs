//! Persisted state record shared by the ingestion and inference drivers
//!
//! The file is a flat JSON object. Writers read it, merge, and write it back;
//! there is no locking, so concurrent writers can lose updates.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Schema version written into new state files
pub const STATE_VERSION: u64 = 1;

/// Keys every state file starts out with
pub const STATE_KEYS: [&str; 6] = [
    "store_path",
    "document_store",
    "converter",
    "embedder",
    "cleaner",
    "splitter",
];

/// Merge `update` into the JSON object at `path` (shallow key overwrite)
///
/// A missing file is first initialised with every [`STATE_KEYS`] entry set to
/// an empty string. Returns the merged object.
pub fn merge_json_file(update: &Map<String, Value>, path: &Path) -> Result<Map<String, Value>> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut initial = Map::new();
        initial.insert("version".to_string(), Value::from(STATE_VERSION));
        for key in STATE_KEYS {
            initial.insert(key.to_string(), Value::String(String::new()));
        }
        fs::write(path, serde_json::to_string_pretty(&initial)?)?;
        tracing::debug!("Initialised state file {}", path.display());
    }

    let mut state = match serde_json::from_str::<Value>(&fs::read_to_string(path)?)? {
        Value::Object(map) => map,
        other => {
            return Err(Error::config(format!(
                "state file {} holds {} instead of an object",
                path.display(),
                json_kind(&other)
            )))
        }
    };

    for (key, value) in update {
        state.insert(key.clone(), value.clone());
    }

    fs::write(path, serde_json::to_string_pretty(&state)?)?;
    Ok(state)
}

/// Read the JSON object at `path`; `Ok(None)` when the file does not exist
pub fn load_json_file(path: &Path) -> Result<Option<Map<String, Value>>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::warn!("State file '{}' not found", path.display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };

    match serde_json::from_str::<Value>(&data)? {
        Value::Object(map) => Ok(Some(map)),
        other => Err(Error::config(format!(
            "state file {} holds {} instead of an object",
            path.display(),
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Typed view of the state file written after an ingestion run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    /// Schema version
    #[serde(default)]
    pub version: u64,
    /// Location of the latest store snapshot
    #[serde(default)]
    pub store_path: String,
    /// Store summary
    #[serde(default)]
    pub document_store: Value,
    /// Converter configuration used
    #[serde(default)]
    pub converter: Value,
    /// Embedder configuration used
    #[serde(default)]
    pub embedder: Value,
    /// Cleaner configuration used
    #[serde(default)]
    pub cleaner: Value,
    /// Splitter configuration used
    #[serde(default)]
    pub splitter: Value,
}

impl StateRecord {
    /// The non-empty fields as a JSON object
    fn non_empty_fields(&self) -> Result<Map<String, Value>> {
        let Value::Object(map) = serde_json::to_value(self)? else {
            return Err(Error::internal("state record did not serialize to an object"));
        };
        Ok(map
            .into_iter()
            .filter(|(key, value)| !is_empty(value) && !(key == "version" && value == &Value::from(0u64)))
            .collect())
    }

    /// Merge this record into the state file at `path`
    pub fn persist(&self, path: &Path) -> Result<StateRecord> {
        let merged = merge_json_file(&self.non_empty_fields()?, path)?;
        tracing::info!("State written to {}", path.display());
        Ok(serde_json::from_value(Value::Object(merged))?)
    }

    /// Load the record at `path`; `Ok(None)` when the file does not exist
    pub fn load(path: &Path) -> Result<Option<StateRecord>> {
        load_json_file(path)?
            .map(|map| serde_json::from_value(Value::Object(map)).map_err(Error::from))
            .transpose()
    }
}

fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}
