//! Custom error types for taxosupply.
//!
//! Library functions return `Result<T, TaxoError>`; the binary wraps these in
//! `anyhow` with stage context.

use thiserror::Error;

/// Main error type for taxosupply operations.
#[derive(Debug, Error)]
pub enum TaxoError {
    /// Unusable input value (e.g. an empty author display name)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An appearance reached the disambiguation engine without its derived keys
    #[error("Malformed appearance #{index} ({author_id}): {reason}")]
    MalformedAppearance {
        /// Position of the appearance in the input batch
        index: usize,
        /// Source author identifier, if any
        author_id: String,
        /// What was missing
        reason: String,
    },

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Payload parsing error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status code
        code: i32,
        /// Error message
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited text read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias using `TaxoError`
pub type Result<T> = std::result::Result<T, TaxoError>;
