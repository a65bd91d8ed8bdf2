//! In-process channel transport.
//!
//! [`LocalTransport`] implements [`Transport`] without a network: frames are
//! applied directly by the owner (tests, replay tools) or fed through a
//! [`Dispatcher`] running on a tokio task. Listener and hook callbacks are
//! never invoked while the registry or a channel lock is held.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use realtime_feed_proto::{EventFilter, RawChangePayload, Topic};

use crate::channel::{Channel, CloseHook, ErrorHook, JoinReplies, RawListener, ReplyStatus, Transport};
use crate::error::{ChannelError, Error};

/// Lifecycle phase of a local channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelPhase {
    /// Created, join not requested.
    Idle,
    /// Join requested, waiting for a reply.
    Joining,
    /// Joined; payloads are delivered.
    Joined,
    /// Join rejected or channel failed; a later ok reply rejoins.
    Errored,
    /// Closed and unregistered.
    Closed,
}

type SharedListener = Arc<dyn Fn(&RawChangePayload) + Send + Sync>;
type SharedErrorHook = Arc<dyn Fn(&ChannelError) + Send + Sync>;
type SharedCloseHook = Arc<dyn Fn() + Send + Sync>;

struct SlotState {
    phase: ChannelPhase,
    listeners: Vec<(EventFilter, SharedListener)>,
    error_hooks: Vec<SharedErrorHook>,
    close_hooks: Vec<SharedCloseHook>,
    replies: Option<Arc<JoinReplies>>,
}

/// Shared state of one channel.
struct Slot {
    id: u64,
    topic: Topic,
    state: Mutex<SlotState>,
}

impl Slot {
    fn phase(&self) -> ChannelPhase {
        self.state.lock().phase
    }

    /// Fire close hooks and mark the slot closed. Returns false if it already was.
    fn close(&self) -> bool {
        let hooks = {
            let mut state = self.state.lock();
            if state.phase == ChannelPhase::Closed {
                return false;
            }
            state.phase = ChannelPhase::Closed;
            state.close_hooks.clone()
        };

        for hook in hooks {
            hook();
        }
        true
    }
}

#[derive(Default)]
struct Registry {
    /// Channels keyed by topic string.
    topics: HashMap<String, Vec<Arc<Slot>>>,
    next_id: u64,
}

impl Registry {
    fn remove(&mut self, topic: &str, id: u64) {
        if let Some(slots) = self.topics.get_mut(topic) {
            slots.retain(|slot| slot.id != id);
            if slots.is_empty() {
                self.topics.remove(topic);
            }
        }
    }
}

/// In-process transport.
///
/// Cloning yields another handle to the same registry.
#[derive(Clone, Default)]
pub struct LocalTransport {
    registry: Arc<Mutex<Registry>>,
}

impl LocalTransport {
    /// Create an empty transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a change to every joined channel whose topic covers it.
    ///
    /// Returns the number of listener invocations.
    pub fn publish(&self, payload: &RawChangePayload) -> usize {
        let slots: Vec<Arc<Slot>> = {
            let registry = self.registry.lock();
            registry
                .topics
                .values()
                .flatten()
                .filter(|slot| slot.topic.matches(&payload.schema, &payload.table))
                .cloned()
                .collect()
        };

        let mut delivered = 0;
        for slot in slots {
            let listeners: Vec<SharedListener> = {
                let state = slot.state.lock();
                if state.phase != ChannelPhase::Joined {
                    continue;
                }
                state
                    .listeners
                    .iter()
                    .filter(|(filter, _)| filter.matches(&payload.kind))
                    .map(|(_, listener)| listener.clone())
                    .collect()
            };

            for listener in listeners {
                listener(payload);
                delivered += 1;
            }
        }

        trace!(
            schema = %payload.schema,
            table = %payload.table,
            event = %payload.kind,
            delivered,
            "published change"
        );

        delivered
    }

    /// Complete the join handshake of channels on `topic`.
    ///
    /// Only channels waiting for a join (joining or errored) react. Returns
    /// the number of reply hooks fired.
    pub fn reply(&self, topic: &str, status: ReplyStatus, error: Option<ChannelError>) -> usize {
        let mut fired = 0;
        for slot in self.slots_for(topic) {
            let replies = {
                let mut state = slot.state.lock();
                if state.replies.is_none()
                    || !matches!(state.phase, ChannelPhase::Joining | ChannelPhase::Errored)
                {
                    continue;
                }
                match status {
                    ReplyStatus::Ok => state.phase = ChannelPhase::Joined,
                    ReplyStatus::Error => state.phase = ChannelPhase::Errored,
                    ReplyStatus::Timeout => {}
                }
                state.replies.clone()
            };

            if let Some(replies) = replies {
                fired += replies.trigger(status, error.as_ref());
            }
        }

        debug!(topic, status = %status, fired, "join reply");
        fired
    }

    /// Report a channel failure on `topic`. Returns the number of hooks fired.
    pub fn fail(&self, topic: &str, error: ChannelError) -> usize {
        let mut fired = 0;
        for slot in self.slots_for(topic) {
            let hooks = {
                let mut state = slot.state.lock();
                match state.phase {
                    ChannelPhase::Closed => continue,
                    ChannelPhase::Joining | ChannelPhase::Joined => {
                        state.phase = ChannelPhase::Errored
                    }
                    // A channel that never asked to join stays idle.
                    ChannelPhase::Idle | ChannelPhase::Errored => {}
                }
                state.error_hooks.clone()
            };

            for hook in hooks {
                hook(&error);
                fired += 1;
            }
        }

        warn!(topic, error = %error, "channel error");
        fired
    }

    /// Close every channel on `topic` and unregister it.
    ///
    /// Returns the number of channels closed.
    pub fn close(&self, topic: &str) -> usize {
        let slots = {
            let mut registry = self.registry.lock();
            registry.topics.remove(topic).unwrap_or_default()
        };

        let closed = slots.iter().filter(|slot| slot.close()).count();
        debug!(topic, closed, "topic closed");
        closed
    }

    /// Apply a frame. Returns the number of callbacks it triggered.
    pub fn apply(&self, frame: Frame) -> usize {
        match frame {
            Frame::Change { payload } => self.publish(&payload),
            Frame::Reply {
                topic,
                status,
                message,
            } => {
                let error = match status {
                    ReplyStatus::Error => Some(ChannelError::Rejected(
                        message.unwrap_or_else(|| "join rejected".to_string()),
                    )),
                    ReplyStatus::Ok | ReplyStatus::Timeout => None,
                };
                self.reply(&topic, status, error)
            }
            Frame::Error { topic, message } => self.fail(&topic, ChannelError::Socket(message)),
            Frame::Close { topic } => self.close(&topic),
        }
    }

    /// Number of registered channels.
    pub fn channel_count(&self) -> usize {
        self.registry.lock().topics.values().map(Vec::len).sum()
    }

    fn slots_for(&self, topic: &str) -> Vec<Arc<Slot>> {
        let registry = self.registry.lock();
        registry.topics.get(topic).cloned().unwrap_or_default()
    }
}

impl Transport for LocalTransport {
    type Channel = LocalChannel;

    fn channel(&self, topic: &Topic) -> LocalChannel {
        let slot = {
            let mut registry = self.registry.lock();
            registry.next_id += 1;
            let slot = Arc::new(Slot {
                id: registry.next_id,
                topic: topic.clone(),
                state: Mutex::new(SlotState {
                    phase: ChannelPhase::Idle,
                    listeners: Vec::new(),
                    error_hooks: Vec::new(),
                    close_hooks: Vec::new(),
                    replies: None,
                }),
            });
            registry
                .topics
                .entry(topic.as_str().to_string())
                .or_default()
                .push(slot.clone());
            slot
        };

        debug!(topic = %topic, channel_id = slot.id, "channel registered");

        LocalChannel {
            slot,
            registry: self.registry.clone(),
        }
    }
}

impl std::fmt::Debug for LocalTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalTransport")
            .field("channels", &self.channel_count())
            .finish()
    }
}

/// Channel handle issued by [`LocalTransport`].
pub struct LocalChannel {
    slot: Arc<Slot>,
    registry: Arc<Mutex<Registry>>,
}

impl LocalChannel {
    /// Current lifecycle phase.
    pub fn phase(&self) -> ChannelPhase {
        self.slot.phase()
    }

    /// Leave the channel: fire close hooks and unregister it.
    pub fn leave(&self) {
        self.registry.lock().remove(self.slot.topic.as_str(), self.slot.id);
        if self.slot.close() {
            debug!(topic = %self.slot.topic, channel_id = self.slot.id, "channel left");
        }
    }
}

impl Channel for LocalChannel {
    fn topic(&self) -> &Topic {
        &self.slot.topic
    }

    fn on(&mut self, filter: EventFilter, listener: RawListener) {
        self.slot
            .state
            .lock()
            .listeners
            .push((filter, Arc::from(listener)));
    }

    fn on_error(&mut self, hook: ErrorHook) {
        self.slot.state.lock().error_hooks.push(Arc::from(hook));
    }

    fn on_close(&mut self, hook: CloseHook) {
        self.slot.state.lock().close_hooks.push(Arc::from(hook));
    }

    fn subscribe(&mut self, replies: JoinReplies) {
        let mut state = self.slot.state.lock();
        if state.phase == ChannelPhase::Closed {
            warn!(topic = %self.slot.topic, "subscribe on closed channel ignored");
            return;
        }
        state.phase = ChannelPhase::Joining;
        state.replies = Some(Arc::new(replies));
    }
}

impl std::fmt::Debug for LocalChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalChannel")
            .field("id", &self.slot.id)
            .field("topic", &self.slot.topic.as_str())
            .field("phase", &self.phase())
            .finish()
    }
}

/// One message for the local transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// A row change.
    Change {
        /// The raw payload.
        payload: RawChangePayload,
    },
    /// Reply to a pending join.
    Reply {
        /// Topic being joined.
        topic: String,
        /// Reply status.
        status: ReplyStatus,
        /// Rejection reason for error replies.
        #[serde(default)]
        message: Option<String>,
    },
    /// Channel failure.
    Error {
        /// Failing topic.
        topic: String,
        /// Failure description.
        message: String,
    },
    /// Channel close.
    Close {
        /// Closed topic.
        topic: String,
    },
}

impl Frame {
    /// Decode a frame from one JSON line.
    pub fn from_json(line: &str) -> Result<Self, Error> {
        serde_json::from_str(line).map_err(|e| Error::Protocol(e.into()))
    }
}

/// Sender half for frames.
pub type FrameSender = mpsc::Sender<Frame>;

/// Receiver half for frames.
pub type FrameReceiver = mpsc::Receiver<Frame>;

/// Create a frame channel with the given buffer size.
pub fn frame_channel(buffer_size: usize) -> (FrameSender, FrameReceiver) {
    mpsc::channel(buffer_size)
}

/// Applies frames from a channel to a [`LocalTransport`].
pub struct Dispatcher {
    rx: FrameReceiver,
    transport: LocalTransport,
}

impl Dispatcher {
    /// Create a new dispatcher.
    pub fn new(rx: FrameReceiver, transport: LocalTransport) -> Self {
        Self { rx, transport }
    }

    /// Apply frames in order until every sender is dropped.
    ///
    /// Returns the number of frames applied.
    pub async fn run(mut self) -> u64 {
        info!("frame dispatcher started");

        let mut applied = 0u64;
        while let Some(frame) = self.rx.recv().await {
            self.transport.apply(frame);
            applied += 1;
        }

        info!(applied, "frame dispatcher stopped (channel closed)");
        applied
    }
}

/// Handle for submitting frames to a running dispatcher.
#[derive(Debug, Clone)]
pub struct DispatchHandle {
    tx: FrameSender,
}

impl DispatchHandle {
    /// Create a new dispatch handle.
    pub fn new(tx: FrameSender) -> Self {
        Self { tx }
    }

    /// Submit a frame without waiting; fails if the buffer is full.
    pub fn try_send(&self, frame: Frame) -> Result<(), Error> {
        self.tx.try_send(frame).map_err(|e| match e {
            TrySendError::Full(_) => Error::BufferFull,
            TrySendError::Closed(_) => Error::Dispatch,
        })
    }

    /// Submit a frame, waiting for buffer space.
    pub async fn send(&self, frame: Frame) -> Result<(), Error> {
        self.tx.send(frame).await.map_err(|_| Error::Dispatch)
    }
}

/// Spawn a dispatcher for `transport`.
///
/// The task finishes once every [`DispatchHandle`] is dropped and yields the
/// number of frames applied.
pub fn start_dispatcher(
    transport: LocalTransport,
    buffer_size: usize,
) -> (DispatchHandle, JoinHandle<u64>) {
    let (tx, rx) = frame_channel(buffer_size);
    let dispatcher = Dispatcher::new(rx, transport);
    let task = tokio::spawn(dispatcher.run());
    (DispatchHandle::new(tx), task)
}
