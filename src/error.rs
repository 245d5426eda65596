use thiserror::Error;

/// Main error type for the scoring engine
#[derive(Error, Debug)]
pub enum GemError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    // Input errors
    #[error("Invalid price for {symbol}: {price}")]
    InvalidPrice { symbol: String, price: f64 },

    #[error("Validation failed: {0}")]
    Validation(String),

    // Model errors
    #[error("Network shape mismatch: {0}")]
    ShapeMismatch(String),

    // Persistence errors
    #[error("Persistence error: {0}")]
    Persistence(String),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GemError
pub type Result<T> = std::result::Result<T, GemError>;

impl GemError {
    /// Whether the engine can keep running after this error.
    ///
    /// Input and model errors degrade to defaults; configuration and IO
    /// failures at startup do not.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            GemError::InvalidPrice { .. }
                | GemError::Validation(_)
                | GemError::ShapeMismatch(_)
                | GemError::Persistence(_)
        )
    }
}
