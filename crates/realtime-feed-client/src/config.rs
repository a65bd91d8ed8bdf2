//! Client configuration.

use realtime_feed_proto::{Transformer, DEFAULT_TOPIC_PREFIX};

/// Client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Prefix of every topic (e.g. "realtime" gives `realtime:public:users`).
    pub topic_prefix: String,

    /// Column types left unconverted when building change events.
    pub skip_types: Vec<String>,
}

impl ClientConfig {
    /// Create a new configuration with the specified topic prefix.
    pub fn new(topic_prefix: impl Into<String>) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            skip_types: Vec::new(),
        }
    }

    /// Set the topic prefix.
    pub fn with_topic_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.topic_prefix = prefix.into();
        self
    }

    /// Set the column types to leave unconverted.
    pub fn with_skip_types(mut self, skip_types: Vec<String>) -> Self {
        self.skip_types = skip_types;
        self
    }

    /// Build the record transformer for this configuration.
    pub fn transformer(&self) -> Transformer {
        Transformer::new().with_skip_types(self.skip_types.clone())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TOPIC_PREFIX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.topic_prefix, DEFAULT_TOPIC_PREFIX);
        assert!(config.skip_types.is_empty());
    }

    #[test]
    fn test_config_builder() {
        let config = ClientConfig::default()
            .with_topic_prefix("cdc")
            .with_skip_types(vec!["jsonb".to_string()]);

        assert_eq!(config.topic_prefix, "cdc");
        assert_eq!(config.transformer().skip_types(), ["jsonb".to_string()]);
    }
}
