//! Error types for the experiment pipeline.

use thiserror::Error;

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for experiment pipeline operations
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing input (fatal, no retry)
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Loss/kernel pairing the model adapter does not implement
    #[error("Unsupported combination: loss {loss} with kernel {kernel}")]
    UnsupportedCombination { loss: String, kernel: String },

    /// Scoring requested before training completed
    #[error("Model not trained: {0}")]
    NotTrained(String),

    /// State machine misuse (out-of-order transition)
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Dataset collaborator failure
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Numerical failure while fitting
    #[error("Training error: {0}")]
    Training(String),

    /// I/O failure while persisting the model or results
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Logging or plotting failure (non-fatal)
    #[error("Reporting error: {0}")]
    Reporting(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the error aborts the run
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::Reporting(_))
    }

    /// Process exit code for a fatal error
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Configuration(_) => 2,
            Error::UnsupportedCombination { .. } => 3,
            Error::NotTrained(_) | Error::Precondition(_) => 4,
            Error::Dataset(_) => 5,
            Error::Training(_) => 6,
            Error::Serialization(_) => 7,
            Error::Reporting(_) => 8,
            Error::Io(_) | Error::Json(_) => 1,
        }
    }

    /// Wraps any displayable failure as a serialization error
    pub fn serialization(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Serialization(format!("{}: {}", context, err))
    }

    /// Wraps any displayable failure as a reporting error
    pub fn reporting(context: &str, err: impl std::fmt::Display) -> Self {
        Error::Reporting(format!("{}: {}", context, err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Configuration(err.to_string())
    }
}
