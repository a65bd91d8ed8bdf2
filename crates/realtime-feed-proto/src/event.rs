//! Row-change payloads and the normalized change event.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::value::Record;

/// Raw record as delivered on the wire: column name to untyped JSON.
pub type RawRecord = serde_json::Map<String, serde_json::Value>;

/// Kind of row change carried by a payload.
///
/// Unrecognized kinds are retained verbatim rather than rejected so the
/// caller still sees every delivered payload.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    /// Row inserted.
    Insert,
    /// Row updated.
    Update,
    /// Row deleted.
    Delete,
    /// Any other kind reported by the stream.
    Other(String),
}

impl EventType {
    /// Wire name of this kind.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::Insert => "INSERT",
            EventType::Update => "UPDATE",
            EventType::Delete => "DELETE",
            EventType::Other(kind) => kind,
        }
    }

    /// Whether this is one of INSERT, UPDATE or DELETE.
    pub fn is_known(&self) -> bool {
        !matches!(self, EventType::Other(_))
    }
}

impl From<String> for EventType {
    fn from(kind: String) -> Self {
        match kind.as_str() {
            "INSERT" => EventType::Insert,
            "UPDATE" => EventType::Update,
            "DELETE" => EventType::Delete,
            _ => EventType::Other(kind),
        }
    }
}

impl From<EventType> for String {
    fn from(kind: EventType) -> Self {
        match kind {
            EventType::Other(kind) => kind,
            known => known.as_str().to_string(),
        }
    }
}

impl Default for EventType {
    fn default() -> Self {
        EventType::Other(String::new())
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The events a listener can register interest in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventFilter {
    /// Inserts only.
    Insert,
    /// Updates only.
    Update,
    /// Deletes only.
    Delete,
    /// Every change (`*`).
    All,
}

impl EventFilter {
    /// Wire name of this filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventFilter::Insert => "INSERT",
            EventFilter::Update => "UPDATE",
            EventFilter::Delete => "DELETE",
            EventFilter::All => "*",
        }
    }

    /// Check whether a payload of the given kind matches this filter.
    pub fn matches(&self, kind: &EventType) -> bool {
        match self {
            EventFilter::All => true,
            filter => filter.as_str() == kind.as_str(),
        }
    }
}

impl std::str::FromStr for EventFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "INSERT" => Ok(EventFilter::Insert),
            "UPDATE" => Ok(EventFilter::Update),
            "DELETE" => Ok(EventFilter::Delete),
            "*" | "ALL" => Ok(EventFilter::All),
            other => Err(format!("unknown event filter: {}", other)),
        }
    }
}

impl fmt::Display for EventFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Column metadata that drives coercion of raw values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Column name.
    pub name: String,
    /// Postgres type name (e.g. `int4`, `_text`, `jsonb`).
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ColumnDescriptor {
    /// Create a new column descriptor.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// A row change as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawChangePayload {
    /// Kind of change.
    #[serde(rename = "type", default)]
    pub kind: EventType,
    /// Schema name.
    #[serde(default)]
    pub schema: String,
    /// Table name.
    #[serde(default)]
    pub table: String,
    /// Commit timestamp as reported by the database.
    #[serde(default)]
    pub commit_timestamp: String,
    /// Column metadata for the row.
    #[serde(default)]
    pub columns: Vec<ColumnDescriptor>,
    /// Current row snapshot, absent for deletes.
    #[serde(default)]
    pub record: Option<RawRecord>,
    /// Previous row snapshot, present for updates and deletes.
    #[serde(default)]
    pub old_record: Option<RawRecord>,
}

impl RawChangePayload {
    /// Decode a payload from a JSON string.
    pub fn from_json(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Decode a payload from an untyped JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self, Error> {
        Ok(serde_json::from_value(value)?)
    }
}

/// Normalized change event handed to application callbacks.
///
/// `new` and `old` are always present; they are empty when the kind does
/// not carry that snapshot.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEvent {
    /// Schema name.
    pub schema: String,
    /// Table name.
    pub table: String,
    /// Commit timestamp.
    pub commit_timestamp: String,
    /// Kind of change.
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    /// Row after the change.
    pub new: Record,
    /// Row before the change.
    pub old: Record,
}

impl ChangeEvent {
    /// Create an envelope from a payload with empty records.
    pub fn envelope(payload: &RawChangePayload) -> Self {
        Self {
            schema: payload.schema.clone(),
            table: payload.table.clone(),
            commit_timestamp: payload.commit_timestamp.clone(),
            event_type: payload.kind.clone(),
            new: Record::new(),
            old: Record::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_parsing() {
        assert_eq!(EventType::from("INSERT".to_string()), EventType::Insert);
        assert_eq!(EventType::from("DELETE".to_string()), EventType::Delete);
        assert_eq!(
            EventType::from("TRUNCATE".to_string()),
            EventType::Other("TRUNCATE".into())
        );
        assert!(!EventType::Other("TRUNCATE".into()).is_known());
        assert_eq!(String::from(EventType::Update), "UPDATE");
    }

    #[test]
    fn test_event_filter_matching() {
        assert!(EventFilter::All.matches(&EventType::Delete));
        assert!(EventFilter::All.matches(&EventType::Other("TRUNCATE".into())));
        assert!(EventFilter::Insert.matches(&EventType::Insert));
        assert!(!EventFilter::Insert.matches(&EventType::Update));
    }

    #[test]
    fn test_event_filter_from_str() {
        assert_eq!("*".parse::<EventFilter>().unwrap(), EventFilter::All);
        assert_eq!("update".parse::<EventFilter>().unwrap(), EventFilter::Update);
        assert!("upsert".parse::<EventFilter>().is_err());
    }

    #[test]
    fn test_payload_decoding() {
        let payload = RawChangePayload::from_value(json!({
            "type": "UPDATE",
            "schema": "public",
            "table": "todos",
            "commit_timestamp": "2021-01-01T00:00:00Z",
            "columns": [{"name": "id", "type": "int4", "flags": ["key"]}],
            "record": {"id": "1"},
            "old_record": {"id": "1"}
        }))
        .unwrap();

        assert_eq!(payload.kind, EventType::Update);
        assert_eq!(payload.columns, vec![ColumnDescriptor::new("id", "int4")]);
        assert_eq!(payload.record.unwrap()["id"], json!("1"));
        assert!(payload.old_record.is_some());
    }

    #[test]
    fn test_payload_defaults_missing_fields() {
        let payload = RawChangePayload::from_json(r#"{"type":"INSERT"}"#).unwrap();
        assert_eq!(payload.kind, EventType::Insert);
        assert!(payload.schema.is_empty());
        assert!(payload.columns.is_empty());
        assert!(payload.record.is_none());
    }

    #[test]
    fn test_payload_rejects_non_object() {
        assert!(RawChangePayload::from_json("[1, 2]").is_err());
    }

    #[test]
    fn test_change_event_serialization() {
        let payload = RawChangePayload {
            kind: EventType::Delete,
            schema: "public".into(),
            table: "users".into(),
            commit_timestamp: "T".into(),
            ..Default::default()
        };
        let encoded = serde_json::to_value(ChangeEvent::envelope(&payload)).unwrap();
        assert_eq!(
            encoded,
            json!({
                "schema": "public",
                "table": "users",
                "commit_timestamp": "T",
                "eventType": "DELETE",
                "new": {},
                "old": {}
            })
        );
    }
}
