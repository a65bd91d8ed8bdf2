//! realtime-feed protocol types.
//!
//! This crate defines the payloads exchanged with a realtime change stream
//! and the coercion of raw column values into typed values.
//!
//! # Modules
//!
//! - [`event`] - Raw change payloads, event kinds and the normalized event
//! - [`value`] - Typed cell values produced by coercion
//! - [`transform`] - Column-type driven coercion of raw records
//! - [`topic`] - Topic naming for table and schema streams
//! - [`error`] - Protocol error types
//!
//! # Decoding
//!
//! ```ignore
//! use realtime_feed_proto::{convert_change_data, RawChangePayload};
//!
//! let payload = RawChangePayload::from_json(r#"{"type":"INSERT","schema":"public","table":"todos"}"#)?;
//! let record = convert_change_data(&payload.columns, payload.record.as_ref());
//! ```

pub mod error;
pub mod event;
pub mod topic;
pub mod transform;
pub mod value;

pub use error::Error;

// Re-export commonly used types at crate root
pub use event::{ChangeEvent, ColumnDescriptor, EventFilter, EventType, RawChangePayload, RawRecord};
pub use topic::{Topic, DEFAULT_TOPIC_PREFIX, WILDCARD};
pub use transform::{convert_change_data, Transformer};
pub use value::{Record, Value};
