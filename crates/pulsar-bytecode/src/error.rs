//! Error types for bytecode construction

use thiserror::Error;

/// Result type for bytecode construction operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by the control-flow builders and the binary encoder.
///
/// Both kinds are reported synchronously at the call that triggered them
/// and abort construction of the current chain, loop or serialization;
/// nothing is retried and a failed builder is not reusable.
#[derive(Debug, Error)]
pub enum Error {
    /// A construction call was made in the wrong order or builder state
    #[error("usage: {0}")]
    Usage(String),

    /// A value does not fit the binary encoding's operand ranges
    #[error("encoding: {0}")]
    Encoding(String),
}
