//! realtime-feed client - typed row-change subscriptions.
//!
//! This crate binds to the change stream of a table (or schema) through a
//! channel [`Transport`] and delivers normalized [`ChangeEvent`]s.
//!
//! # Quick Start
//!
//! ```ignore
//! use realtime_feed_client::{ChangeFeedClient, LocalTransport, SubscriptionState};
//! use realtime_feed_proto::EventFilter;
//!
//! let transport = LocalTransport::new();
//!
//! let channel = ChangeFeedClient::new(&transport, "public", "todos")
//!     .on(EventFilter::All, |event| println!("{} {:?}", event.event_type, event.new))
//!     .subscribe_with(|status, error| {
//!         if status == SubscriptionState::SubscriptionError {
//!             eprintln!("subscription failed: {:?}", error);
//!         }
//!     });
//!
//! // Later, stop listening
//! channel.leave();
//! ```
//!
//! [`ChangeEvent`]: realtime_feed_proto::ChangeEvent

pub mod channel;
pub mod config;
pub mod error;
pub mod feed;
pub mod local;

pub use channel::{Channel, JoinReplies, RawListener, ReplyStatus, Transport};
pub use config::ClientConfig;
pub use error::{ChannelError, Error};
pub use feed::{ChangeFeedClient, SubscriptionState};
pub use local::{start_dispatcher, ChannelPhase, DispatchHandle, Dispatcher, Frame, LocalChannel, LocalTransport};

/// Re-export protocol types.
pub use realtime_feed_proto as proto;
