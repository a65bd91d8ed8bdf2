//! Topic naming for change streams.

use std::fmt;

/// Default prefix for change stream topics.
pub const DEFAULT_TOPIC_PREFIX: &str = "realtime";

/// Table name that selects every table of a schema.
pub const WILDCARD: &str = "*";

/// Identifies the change stream of one table (`prefix:schema:table`) or of a
/// whole schema (`prefix:schema`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
    schema: String,
    table: Option<String>,
}

impl Topic {
    /// Build a topic with a custom prefix.
    ///
    /// A table name equal to [`WILDCARD`] yields a schema-wide topic.
    pub fn new(prefix: &str, schema: impl Into<String>, table: &str) -> Self {
        let schema = schema.into();
        if table == WILDCARD {
            Self {
                name: format!("{}:{}", prefix, schema),
                schema,
                table: None,
            }
        } else {
            Self {
                name: format!("{}:{}:{}", prefix, schema, table),
                schema,
                table: Some(table.to_string()),
            }
        }
    }

    /// Build a topic with the default prefix.
    pub fn for_table(schema: impl Into<String>, table: &str) -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX, schema, table)
    }

    /// Full topic string.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Schema this topic belongs to.
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Table name, `None` for schema-wide topics.
    pub fn table(&self) -> Option<&str> {
        self.table.as_deref()
    }

    /// Whether this topic covers every table of its schema.
    pub fn is_schema_wide(&self) -> bool {
        self.table.is_none()
    }

    /// Check whether a change in `schema.table` belongs to this topic.
    pub fn matches(&self, schema: &str, table: &str) -> bool {
        self.schema == schema && self.table.as_deref().map_or(true, |t| t == table)
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.name
    }
}
