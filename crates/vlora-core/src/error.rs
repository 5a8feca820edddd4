//! Error types for vlora.

use thiserror::Error;

/// Result type alias for vlora operations.
pub type Result<T> = std::result::Result<T, VloraError>;

/// Main error type for vlora operations.
#[derive(Error, Debug)]
pub enum VloraError {
    /// Configuration errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Lookup of a conversation template that was never registered.
    #[error("Unknown conversation template '{name}' (registered: {known:?})")]
    UnknownTemplate {
        /// The name that was requested.
        name: String,
        /// The names that are actually registered.
        known: Vec<String>,
    },

    /// A two-separator style was asked to format without its secondary
    /// separator configured.
    #[error("Separator style '{0}' requires sep2 to be set before prompt assembly")]
    MissingSeparator(String),

    /// Tokenizer errors.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// Malformed dataset records.
    #[error("Parse error: {0}")]
    Parse(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
