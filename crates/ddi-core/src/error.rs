use thiserror::Error;

#[derive(Error, Debug)]
pub enum DdiError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(String),

    /// The document cannot be identified as a catalog record. Callers
    /// record this against the harvest job instead of treating it as a crash.
    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Vocabulary error: {0}")]
    Vocabulary(String),

    #[error("Unsupported schema: {0}")]
    UnsupportedSchema(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl DdiError {
    /// Whether this is a business-validation failure rather than a crash.
    pub fn is_malformed(&self) -> bool {
        matches!(self, DdiError::Malformed(_))
    }
}

pub type Result<T> = std::result::Result<T, DdiError>;
