use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Merge error: {0}")]
    Merge(String),

    #[error("Overflow error: {0}")]
    Overflow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for Tally operations
pub type Result<T> = std::result::Result<T, TallyError>;

impl TallyError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Creates a new merge error
    pub fn merge<S: Into<String>>(msg: S) -> Self {
        Self::Merge(msg.into())
    }

    /// Creates a new overflow error
    pub fn overflow<S: Into<String>>(msg: S) -> Self {
        Self::Overflow(msg.into())
    }

    /// Returns true if the caller can reasonably retry the same input.
    ///
    /// Nothing produced by the engine is retryable: a bad operation stays bad.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Io(_))
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Validation(_) => "validation",
            Self::Merge(_) => "merge",
            Self::Overflow(_) => "overflow",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
        }
    }
}
