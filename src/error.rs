use thiserror::Error;

/// Main error type for RAGBench
#[derive(Error, Debug)]
pub enum RagbenchError {
    /// Missing credential, endpoint or invalid setting. Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV encoding/decoding errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding/decoding errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A question-set row could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A backend retrieval call failed
    #[error(transparent)]
    Retrieval(#[from] RetrievalError),

    /// Embedding API errors
    #[error("Embedding API error: {0}")]
    Embedding(String),

    /// Corpus upload errors
    #[error("Upload error: {0}")]
    Upload(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// A malformed question-set row. The row is skipped and the run continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("line {line}: missing required column '{column}'")]
    MissingColumn { line: u64, column: String },

    #[error("line {line}: question text is empty")]
    EmptyQuestion { line: u64 },

    #[error("line {line}: malformed row: {message}")]
    Malformed { line: u64, message: String },
}

impl LoadError {
    pub fn line(&self) -> u64 {
        match self {
            LoadError::MissingColumn { line, .. }
            | LoadError::EmptyQuestion { line }
            | LoadError::Malformed { line, .. } => *line,
        }
    }
}

/// A backend call that failed or timed out.
///
/// The question is recorded as errored and excluded from the MRR denominator.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{backend} retrieval failed: {message}")]
pub struct RetrievalError {
    pub backend: String,
    pub message: String,
}

impl RetrievalError {
    pub fn new(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            message: message.into(),
        }
    }
}

/// Convenient Result type using RagbenchError
pub type Result<T> = std::result::Result<T, RagbenchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RagbenchError::Config("Test error".to_string());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("Test error"));
    }

    #[test]
    fn test_retrieval_error_display() {
        let err = RetrievalError::new("cloud-search", "HTTP 503");
        assert_eq!(err.to_string(), "cloud-search retrieval failed: HTTP 503");
    }

    #[test]
    fn test_error_from_retrieval() {
        let err: RagbenchError = RetrievalError::new("semantic-filter", "timeout").into();
        assert!(matches!(err, RagbenchError::Retrieval(_)));
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_load_error_line() {
        let err = LoadError::EmptyQuestion { line: 7 };
        assert_eq!(err.line(), 7);
        assert!(err.to_string().contains("line 7"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RagbenchError = io_err.into();
        assert!(matches!(err, RagbenchError::Io(_)));
    }
}
