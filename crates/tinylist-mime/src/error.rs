//! Error types for message operations.

/// Result type alias for message operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Message error types.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The input contained no message at all.
    #[error("Empty message")]
    Empty,

    /// The message has no header section.
    #[error("Message has no headers")]
    MissingHeaders,

    /// Malformed header line.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Unparseable address or address list.
    #[error("Invalid address {input:?}: {reason}")]
    InvalidAddress {
        /// The rejected input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },
}
