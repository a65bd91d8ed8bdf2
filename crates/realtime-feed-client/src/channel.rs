//! Transport contract consumed by the change feed client.
//!
//! A [`Transport`] hands out one [`Channel`] per topic. The channel owns the
//! listener table, the lifecycle hooks and the join handshake; connection
//! management, framing and reconnects stay inside the implementation.

use std::fmt;

use realtime_feed_proto::{EventFilter, RawChangePayload, Topic};
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

/// Listener for raw payloads delivered on a channel.
pub type RawListener = Box<dyn Fn(&RawChangePayload) + Send + Sync>;

/// Hook fired when the channel reports an error.
pub type ErrorHook = Box<dyn Fn(&ChannelError) + Send + Sync>;

/// Hook fired when the channel closes.
pub type CloseHook = Box<dyn Fn() + Send + Sync>;

/// Hook fired when the join handshake completes with a given status.
pub type ReplyHook = Box<dyn Fn(Option<&ChannelError>) + Send + Sync>;

/// Source of channels.
pub trait Transport {
    /// Channel handle type.
    type Channel: Channel;

    /// Obtain a channel for a topic. Must not perform network I/O.
    fn channel(&self, topic: &Topic) -> Self::Channel;
}

/// A subscription handle for one topic.
pub trait Channel {
    /// Topic this channel is bound to.
    fn topic(&self) -> &Topic;

    /// Register a listener for payloads matching `filter`.
    fn on(&mut self, filter: EventFilter, listener: RawListener);

    /// Register a hook for channel errors.
    fn on_error(&mut self, hook: ErrorHook);

    /// Register a hook for channel close.
    fn on_close(&mut self, hook: CloseHook);

    /// Start the join handshake; `replies` fire when it completes.
    fn subscribe(&mut self, replies: JoinReplies);
}

/// Outcome of a join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    /// Join accepted.
    Ok,
    /// Join rejected.
    Error,
    /// No reply before the handshake timer fired.
    Timeout,
}

impl ReplyStatus {
    /// Wire name of this status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplyStatus::Ok => "ok",
            ReplyStatus::Error => "error",
            ReplyStatus::Timeout => "timeout",
        }
    }
}

impl fmt::Display for ReplyStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reply hooks for a join handshake, built by chaining [`JoinReplies::receive`].
///
/// # Example
///
/// ```ignore
/// let replies = JoinReplies::new()
///     .receive(ReplyStatus::Ok, |_| println!("joined"))
///     .receive(ReplyStatus::Timeout, |_| println!("timed out"));
/// channel.subscribe(replies);
/// ```
#[derive(Default)]
pub struct JoinReplies {
    hooks: Vec<(ReplyStatus, ReplyHook)>,
}

impl JoinReplies {
    /// Create an empty set of reply hooks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a hook for a reply status.
    pub fn receive<F>(mut self, status: ReplyStatus, hook: F) -> Self
    where
        F: Fn(Option<&ChannelError>) + Send + Sync + 'static,
    {
        self.hooks.push((status, Box::new(hook)));
        self
    }

    /// Fire every hook registered for `status`. Returns how many fired.
    pub fn trigger(&self, status: ReplyStatus, error: Option<&ChannelError>) -> usize {
        let mut fired = 0;
        for (_, hook) in self.hooks.iter().filter(|(s, _)| *s == status) {
            hook(error);
            fired += 1;
        }
        fired
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Whether no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }
}

impl fmt::Debug for JoinReplies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let statuses: Vec<ReplyStatus> = self.hooks.iter().map(|(s, _)| *s).collect();
        f.debug_struct("JoinReplies").field("statuses", &statuses).finish()
    }
}
