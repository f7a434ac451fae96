//! Error types for the RAG pipelines

use thiserror::Error;

/// Result type alias for RAG operations
pub type Result<T> = std::result::Result<T, Error>;

/// RAG system errors
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// A credential the selected backend needs is not set
    #[error("Missing credential: environment variable '{var}' is not set")]
    MissingCredential { var: String },

    /// File parsing error
    #[error("Failed to parse file '{filename}': {message}")]
    FileParse { filename: String, message: String },

    /// Unsupported file type
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    /// Embedding error
    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    /// LLM error
    #[error("LLM error: {0}")]
    Llm(String),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(String),

    /// Document store error
    #[error("Document store error: {0}")]
    DocumentStore(String),

    /// A document id is already present in the store
    #[error("Duplicate document id: {0}")]
    DuplicateDocument(String),

    /// File or record not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stage name is registered twice
    #[error("Stage '{0}' is already part of the pipeline")]
    DuplicateStage(String),

    /// A stage name is not registered
    #[error("Unknown stage '{0}'")]
    UnknownStage(String),

    /// A port is not declared on the stage
    #[error("Stage '{stage}' has no port named '{port}'")]
    UnknownPort { stage: String, port: String },

    /// Sender and receiver ports carry different value types
    #[error("Cannot connect '{sender}' ({sender_type}) to '{receiver}' ({receiver_type})")]
    PortTypeMismatch {
        sender: String,
        sender_type: String,
        receiver: String,
        receiver_type: String,
    },

    /// No port pair of matching type between two stages
    #[error("No compatible ports between '{sender}' and '{receiver}'")]
    NoCompatiblePorts { sender: String, receiver: String },

    /// More than one port pair of matching type between two stages
    #[error("Ambiguous connection between '{sender}' and '{receiver}', candidates: {candidates}")]
    AmbiguousConnection {
        sender: String,
        receiver: String,
        candidates: String,
    },

    /// Receiver input already fed by another edge or initial value
    #[error("Input '{port}' of stage '{stage}' is already connected")]
    InputAlreadyConnected { stage: String, port: String },

    /// The pipeline graph contains a cycle
    #[error("Pipeline contains a cycle through stage '{0}'")]
    Cycle(String),

    /// A required input received no value
    #[error("Stage '{stage}' is missing required input '{port}'")]
    MissingInput { stage: String, port: String },

    /// Port value of the wrong shape inside a stage
    #[error("Invalid value for port '{port}': {message}")]
    PortValue { port: String, message: String },

    /// A stage failed while running
    #[error("Stage '{stage}' failed: {source}")]
    StageFailed {
        stage: String,
        #[source]
        source: Box<Error>,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML config error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// HTTP request error
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a file parse error
    pub fn file_parse(filename: impl Into<String>, message: impl Into<String>) -> Self {
        Self::FileParse {
            filename: filename.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding(message.into())
    }

    /// Create an LLM error
    pub fn llm(message: impl Into<String>) -> Self {
        Self::Llm(message.into())
    }

    /// Create a document store error
    pub fn document_store(message: impl Into<String>) -> Self {
        Self::DocumentStore(message.into())
    }

    /// Create a port value error
    pub fn port_value(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::PortValue {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Name of the failing stage, if this error came out of a pipeline run
    pub fn failed_stage(&self) -> Option<&str> {
        match self {
            Self::StageFailed { stage, .. } => Some(stage),
            _ => None,
        }
    }
}
