//! Client error types.

use thiserror::Error;

/// Errors reported by a channel transport.
///
/// These reach the application only through the subscription status
/// callback.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The server refused the join.
    #[error("join rejected: {0}")]
    Rejected(String),

    /// The underlying socket failed.
    #[error("socket error: {0}")]
    Socket(String),

    /// The join handshake did not complete in time.
    #[error("join timed out")]
    Timeout,

    /// The channel is closed.
    #[error("channel closed")]
    Closed,
}

/// Client errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] realtime_feed_proto::Error),

    /// Channel error.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// The frame dispatcher is no longer running.
    #[error("dispatcher stopped")]
    Dispatch,

    /// The frame buffer is full.
    #[error("dispatch buffer full")]
    BufferFull,
}
