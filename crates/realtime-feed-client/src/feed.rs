//! Change feed client.
//!
//! [`ChangeFeedClient`] binds to the topic of one table (or a whole schema),
//! turns raw payloads into [`ChangeEvent`]s and relays subscription
//! lifecycle signals to a single status callback.

use std::fmt;
use std::sync::Arc;

use realtime_feed_proto::{ChangeEvent, EventFilter, EventType, RawChangePayload, Topic, Transformer};

use crate::channel::{Channel, JoinReplies, ReplyStatus, Transport};
use crate::config::ClientConfig;
use crate::error::ChannelError;

/// Subscription signal passed to the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubscriptionState {
    /// Join handshake succeeded.
    Subscribed,
    /// Join was rejected or the channel failed afterwards.
    SubscriptionError,
    /// Channel closed.
    Closed,
    /// Join handshake timed out; the transport may retry.
    RetryingAfterTimeout,
}

impl SubscriptionState {
    /// Status tag as exposed to applications.
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionState::Subscribed => "SUBSCRIBED",
            SubscriptionState::SubscriptionError => "SUBSCRIPTION_ERROR",
            SubscriptionState::Closed => "CLOSED",
            SubscriptionState::RetryingAfterTimeout => "RETRYING_AFTER_TIMEOUT",
        }
    }
}

impl fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared status callback wired to every lifecycle hook.
type StatusCallback = Arc<dyn Fn(SubscriptionState, Option<&ChannelError>) + Send + Sync>;

/// Typed change subscription for one table or schema.
///
/// # Example
///
/// ```ignore
/// use realtime_feed_client::{ChangeFeedClient, LocalTransport};
/// use realtime_feed_proto::EventFilter;
///
/// let transport = LocalTransport::new();
/// let channel = ChangeFeedClient::new(&transport, "public", "todos")
///     .on(EventFilter::Insert, |event| println!("inserted {:?}", event.new))
///     .on(EventFilter::Delete, |event| println!("deleted {:?}", event.old))
///     .subscribe_with(|status, error| println!("{} {:?}", status, error));
/// ```
pub struct ChangeFeedClient<C: Channel> {
    channel: C,
    transformer: Arc<Transformer>,
}

impl<C: Channel> ChangeFeedClient<C> {
    /// Bind to `schema.table` with the default configuration.
    ///
    /// A table name of `*` binds to every table of the schema.
    pub fn new<T>(transport: &T, schema: &str, table: &str) -> Self
    where
        T: Transport<Channel = C>,
    {
        Self::with_config(transport, &ClientConfig::default(), schema, table)
    }

    /// Bind to `schema.table` with an explicit configuration.
    pub fn with_config<T>(transport: &T, config: &ClientConfig, schema: &str, table: &str) -> Self
    where
        T: Transport<Channel = C>,
    {
        let topic = Topic::new(&config.topic_prefix, schema, table);
        let channel = transport.channel(&topic);

        tracing::debug!(topic = %topic, "change feed bound");

        Self {
            channel,
            transformer: Arc::new(config.transformer()),
        }
    }

    /// Topic of the underlying channel.
    pub fn topic(&self) -> &Topic {
        self.channel.topic()
    }

    /// Register a callback for changes matching `filter`.
    ///
    /// The callback runs once per delivered payload, on the thread the
    /// transport delivers on.
    pub fn on<F>(mut self, filter: EventFilter, callback: F) -> Self
    where
        F: Fn(ChangeEvent) + Send + Sync + 'static,
    {
        let transformer = self.transformer.clone();
        self.channel.on(
            filter,
            Box::new(move |payload: &RawChangePayload| {
                callback(enrich(payload, &transformer));
            }),
        );
        self
    }

    /// Start the subscription without a status callback.
    ///
    /// Returns the underlying channel handle.
    pub fn subscribe(self) -> C {
        self.subscribe_with(|_, _| {})
    }

    /// Start the subscription, reporting lifecycle signals to `callback`.
    ///
    /// The error argument is set only for [`SubscriptionState::SubscriptionError`].
    /// Returns the underlying channel handle.
    pub fn subscribe_with<F>(mut self, callback: F) -> C
    where
        F: Fn(SubscriptionState, Option<&ChannelError>) + Send + Sync + 'static,
    {
        let callback: StatusCallback = Arc::new(callback);

        let cb = callback.clone();
        self.channel.on_error(Box::new(move |e: &ChannelError| {
            cb(SubscriptionState::SubscriptionError, Some(e))
        }));

        let cb = callback.clone();
        self.channel
            .on_close(Box::new(move || cb(SubscriptionState::Closed, None)));

        let on_ok = callback.clone();
        let on_error = callback.clone();
        let on_timeout = callback;
        let replies = JoinReplies::new()
            .receive(ReplyStatus::Ok, move |_| on_ok(SubscriptionState::Subscribed, None))
            .receive(ReplyStatus::Error, move |e| {
                on_error(SubscriptionState::SubscriptionError, e)
            })
            .receive(ReplyStatus::Timeout, move |_| {
                on_timeout(SubscriptionState::RetryingAfterTimeout, None)
            });

        tracing::debug!(topic = %self.channel.topic(), "subscribing");
        self.channel.subscribe(replies);
        self.channel
    }
}

impl<C: Channel> fmt::Debug for ChangeFeedClient<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeFeedClient")
            .field("topic", &self.channel.topic().as_str())
            .field("skip_types", &self.transformer.skip_types())
            .finish()
    }
}

/// Build the normalized event for a raw payload.
fn enrich(payload: &RawChangePayload, transformer: &Transformer) -> ChangeEvent {
    let mut event = ChangeEvent::envelope(payload);
    let columns = &payload.columns;

    match &payload.kind {
        EventType::Insert => {
            event.new = transformer.convert_change_data(columns, payload.record.as_ref());
        }
        EventType::Update => {
            event.new = transformer.convert_change_data(columns, payload.record.as_ref());
            event.old = transformer.convert_change_data(columns, payload.old_record.as_ref());
        }
        EventType::Delete => {
            event.old = transformer.convert_change_data(columns, payload.old_record.as_ref());
        }
        EventType::Other(kind) => {
            tracing::warn!(
                event = %kind,
                schema = %payload.schema,
                table = %payload.table,
                "unrecognized change kind, delivering without records"
            );
        }
    }

    event
}
