//! Protocol error types.

use thiserror::Error;

/// Protocol-level errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A payload or frame could not be decoded.
    #[error("decode error: {0}")]
    Decode(#[from] serde_json::Error),
}
