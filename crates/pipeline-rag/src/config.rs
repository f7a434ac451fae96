//! Configuration for the ingestion and inference pipelines

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::ingestion::SplitBy;
use crate::storage::{DuplicatePolicy, Similarity};

/// Main RAG system configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RagConfig {
    /// Artifact and state file locations
    pub paths: PathsConfig,
    /// File converter configuration
    pub converter: ConverterConfig,
    /// Document cleaner configuration
    pub cleaner: CleanerConfig,
    /// Document splitter configuration
    pub splitter: SplitterConfig,
    /// Embedding configuration (document and query embedders)
    pub embedder: EmbedderConfig,
    /// In-memory document store configuration
    pub document_store: DocumentStoreConfig,
    /// Retriever configuration
    pub retriever: RetrieverConfig,
    /// Prompt template configuration
    pub prompt: PromptConfig,
    /// Generator (LLM) configuration
    pub generator: GeneratorConfig,
}

impl RagConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;
        let config: Self = toml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Check cross-field constraints serde cannot express
    pub fn validate(&self) -> Result<()> {
        self.splitter.validate()?;
        if self.embedder.batch_size == 0 {
            return Err(Error::config("embedder.batch_size must be greater than 0"));
        }
        if self.generator.max_tokens == 0 {
            return Err(Error::config("generator.max_tokens must be greater than 0"));
        }
        if self.retriever.top_k == 0 {
            return Err(Error::config("retriever.top_k must be greater than 0"));
        }
        Ok(())
    }
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    /// Root directory for timestamped store snapshots
    pub artifacts_dir: PathBuf,
    /// File name of the store snapshot inside a timestamped directory
    pub store_file_name: String,
    /// Location of the persisted state record
    pub state_file: PathBuf,
    /// Source files ingested when none are given on the command line
    pub sources: Vec<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            artifacts_dir: PathBuf::from("artifacts"),
            store_file_name: "document_store.json".to_string(),
            state_file: PathBuf::from("artifacts").join("state.json"),
            sources: vec![PathBuf::from("data").join("sample_pdf.pdf")],
        }
    }
}

/// File converter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConverterConfig {
    /// Skip unreadable or unparsable sources with a warning instead of failing
    pub skip_unreadable: bool,
}

/// Document cleaner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanerConfig {
    /// Drop lines that are empty or whitespace only
    pub remove_empty_lines: bool,
    /// Collapse whitespace runs into a single space
    pub remove_extra_whitespaces: bool,
    /// Strip headers and footers repeated across pages
    pub remove_repeated_substrings: bool,
    /// Literal substrings removed from the text
    pub remove_substrings: Vec<String>,
    /// Regex whose matches are removed from the text
    pub remove_regex: Option<String>,
}

impl Default for CleanerConfig {
    fn default() -> Self {
        Self {
            remove_empty_lines: true,
            remove_extra_whitespaces: true,
            remove_repeated_substrings: true,
            remove_substrings: Vec::new(),
            remove_regex: None,
        }
    }
}

/// Document splitter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitterConfig {
    /// Unit the text is split into
    pub split_by: SplitBy,
    /// Units per split
    pub split_length: usize,
    /// Units shared between consecutive splits
    pub split_overlap: usize,
    /// Splits with fewer units than this are merged into the previous split (0 disables)
    pub split_threshold: usize,
}

impl Default for SplitterConfig {
    fn default() -> Self {
        Self {
            split_by: SplitBy::Word,
            split_length: 200,
            split_overlap: 10,
            split_threshold: 0,
        }
    }
}

impl SplitterConfig {
    /// Validate length/overlap bounds
    pub fn validate(&self) -> Result<()> {
        if self.split_length == 0 {
            return Err(Error::config("splitter.split_length must be greater than 0"));
        }
        if self.split_overlap >= self.split_length {
            return Err(Error::config(format!(
                "splitter.split_overlap ({}) must be smaller than split_length ({})",
                self.split_overlap, self.split_length
            )));
        }
        Ok(())
    }
}

/// Embedding backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// Hosted Cohere embed API
    #[default]
    Cohere,
    /// Local Ollama server
    Ollama,
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EmbedderConfig {
    /// Backend provider
    pub backend: EmbeddingBackend,
    /// Embedding model name
    pub model: String,
    /// API base URL
    pub base_url: String,
    /// Environment variable holding the API key (ignored for Ollama)
    pub api_key_env: String,
    /// Texts per embedding request
    pub batch_size: usize,
    /// Metadata fields prepended to the content before embedding
    pub meta_fields_to_embed: Vec<String>,
    /// Separator between embedded metadata fields and content
    pub embedding_separator: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for EmbedderConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::Cohere,
            model: "embed-english-v2.0".to_string(),
            base_url: "https://api.cohere.com".to_string(),
            api_key_env: "COHERE_API_KEY".to_string(),
            batch_size: 32,
            meta_fields_to_embed: Vec::new(),
            embedding_separator: "\n".to_string(),
            timeout_secs: 60,
        }
    }
}

/// In-memory document store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DocumentStoreConfig {
    /// Vector similarity function
    pub similarity: Similarity,
    /// What the writer does with ids already in the store
    pub duplicate_policy: DuplicatePolicy,
}

/// Retriever configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrieverConfig {
    /// Number of documents returned when no per-query value is given
    pub top_k: usize,
    /// Map raw similarity scores into 0..1
    pub scale_score: bool,
    /// Keep embeddings on retrieved documents
    pub return_embedding: bool,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            scale_score: false,
            return_embedding: false,
        }
    }
}

/// Default prompt for grounded question answering
pub const DEFAULT_PROMPT_TEMPLATE: &str = r#"Given the following information, answer the question.
If the answer is not contained in the context, say that you don't know.

Context:
{{#each documents}}
{{this.content}}
{{/each}}

Question: {{query}}
Answer:"#;

/// Prompt template configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PromptConfig {
    /// Handlebars template
    pub template: String,
    /// Variables the template reads; `documents` takes documents, the rest take text
    pub variables: Vec<String>,
    /// Variables that must receive a value
    pub required_variables: Vec<String>,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            template: DEFAULT_PROMPT_TEMPLATE.to_string(),
            variables: vec!["documents".to_string(), "query".to_string()],
            required_variables: vec!["documents".to_string(), "query".to_string()],
        }
    }
}

/// Generation backend selection
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorBackend {
    /// OpenAI-compatible chat completions endpoint (Groq, OpenAI, ...)
    #[default]
    OpenAi,
    /// Local Ollama server
    Ollama,
}

/// Generator (LLM) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GeneratorConfig {
    /// Backend provider
    pub backend: GeneratorBackend,
    /// API base URL
    pub base_url: String,
    /// Generation model name
    pub model: String,
    /// Environment variable holding the API key (ignored for Ollama)
    pub api_key_env: String,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature, provider default when unset
    pub temperature: Option<f32>,
    /// Optional system prompt sent ahead of the user prompt
    pub system_prompt: Option<String>,
    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: GeneratorBackend::OpenAi,
            base_url: "https://api.groq.com/openai/v1".to_string(),
            model: "llama3-8b-8192".to_string(),
            api_key_env: "GROQ_API_KEY".to_string(),
            max_tokens: 512,
            temperature: None,
            system_prompt: None,
            timeout_secs: 120,
        }
    }
}

/// API keys resolved for the configured backends
#[derive(Clone, Default)]
pub struct Credentials {
    /// Key for the embedding service
    pub embedder_api_key: Option<String>,
    /// Key for the generation service
    pub generator_api_key: Option<String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mask = |key: &Option<String>| key.as_ref().map(|_| "***");
        f.debug_struct("Credentials")
            .field("embedder_api_key", &mask(&self.embedder_api_key))
            .field("generator_api_key", &mask(&self.generator_api_key))
            .finish()
    }
}

impl Credentials {
    /// Read the keys the configured backends need from the environment
    pub fn from_env(config: &RagConfig) -> Result<Self> {
        let embedder_api_key = match config.embedder.backend {
            EmbeddingBackend::Cohere => Some(read_env(&config.embedder.api_key_env)?),
            EmbeddingBackend::Ollama => None,
        };
        let generator_api_key = match config.generator.backend {
            GeneratorBackend::OpenAi => Some(read_env(&config.generator.api_key_env)?),
            GeneratorBackend::Ollama => None,
        };
        Ok(Self {
            embedder_api_key,
            generator_api_key,
        })
    }

    /// Only the embedding key, for the ingestion path
    pub fn embedder_from_env(config: &RagConfig) -> Result<Self> {
        let embedder_api_key = match config.embedder.backend {
            EmbeddingBackend::Cohere => Some(read_env(&config.embedder.api_key_env)?),
            EmbeddingBackend::Ollama => None,
        };
        Ok(Self {
            embedder_api_key,
            generator_api_key: None,
        })
    }
}

fn read_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(Error::MissingCredential {
            var: var.to_string(),
        }),
    }
}
