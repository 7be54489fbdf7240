use thiserror::Error;

/// Errors that can occur during Shibie core operations.
#[derive(Debug, Error)]
pub enum ShibieError {
    /// Reading a dataset or vocabulary file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The tokenizer file could not be loaded.
    #[error("failed to load tokenizer: {0}")]
    Tokenizer(String),

    /// The vocabulary lacks one of the boundary or padding tokens.
    #[error("vocabulary is missing special token {0:?}")]
    MissingSpecialToken(String),

    /// The maximum sequence length cannot hold the two boundary markers.
    #[error("max sequence length {0} is too small, need at least 3")]
    InvalidMaxLen(usize),
}

/// Result type alias for Shibie core operations.
pub type Result<T> = std::result::Result<T, ShibieError>;
