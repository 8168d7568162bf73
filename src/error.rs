use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("No document is loaded")]
    NotLoaded,

    #[error("Failed to read document '{path}': {reason}")]
    DocumentUnreadable { path: String, reason: String },

    #[error("Embedding backend '{backend}' is unavailable: {reason}")]
    EmbeddingUnavailable { backend: String, reason: String },

    #[error("Invalid input: {0}")]
    InputError(String),

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Unsupported metric '{0}'")]
    UnknownMetric(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid extraction pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl ReportError {
    /// Next step shown to the caller alongside the error message.
    pub fn remediation(&self) -> &'static str {
        match self {
            ReportError::NotLoaded => "Load the document first with load_document.",
            ReportError::DocumentUnreadable { .. } => {
                "Check that the file path is correct and the file is not corrupted."
            }
            ReportError::EmbeddingUnavailable { .. } => {
                "Check network connectivity; the embedding model is downloaded on first use. Literal extraction over the raw text still works."
            }
            ReportError::InputError(_) => {
                "Supply non-zero denominators, or extract the figure from the document again."
            }
            ReportError::InsufficientData(_) => {
                "Provide the missing figures explicitly, or set auto_extract to pull them from the document."
            }
            ReportError::UnknownMetric(_) => {
                "Use one of the supported metric keys, or 'all'."
            }
            ReportError::InvalidConfig(_) => "Fix the extractor configuration and retry.",
            ReportError::Pattern(_) => "Fix the extraction pattern in the metric table.",
            ReportError::SerializationError(_) => {
                "Check that the tool call arguments are valid JSON for the tool schema."
            }
            ReportError::IoError(_) => "Check file permissions and retry.",
            #[cfg(feature = "gemini")]
            ReportError::HttpError(_) => "Check network connectivity and the API key.",
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
