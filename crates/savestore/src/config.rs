//! Save store configuration

use serde_json::Value;
use std::time::Duration;

use crate::codec::CompressionConfig;
use crate::scheduler::SchedulerConfig;

/// Default prefix prepended to every persisted key
pub const DEFAULT_KEY_PREFIX: &str = "DataPro";

/// Save store configuration
#[derive(Debug, Clone)]
pub struct SaveConfig {
    /// Prefix prepended to every persisted key
    pub key_prefix: String,
    /// Declared save keys with their default values
    pub defaults: Vec<(String, Value)>,
    /// Keys callers may not read or write through the store
    pub reserved_keys: Vec<String>,
    /// Payload compression settings
    pub compression: CompressionConfig,
    /// Flush scheduling settings
    pub scheduler: SchedulerConfig,
    /// Capacity of the event channel
    pub event_buffer: usize,
    /// Platform name recorded in exports (defaults to the backend kind)
    pub platform: Option<String>,
}

impl Default for SaveConfig {
    fn default() -> Self {
        Self {
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            defaults: Vec::new(),
            reserved_keys: Vec::new(),
            compression: CompressionConfig::default(),
            scheduler: SchedulerConfig::default(),
            event_buffer: 64,
            platform: None,
        }
    }
}

impl SaveConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the persisted key prefix
    pub fn key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Declare a save key with its default value
    ///
    /// Until the key is first saved, reads return the declared value as is.
    /// Backends hold text, so after a restart a boolean default reads back as
    /// `"true"`/`"false"` while numbers and aggregates decode to their types.
    pub fn default_value(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.defaults.push((key.into(), value.into()));
        self
    }

    /// Mark keys as reserved
    pub fn reserved_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved_keys.extend(keys.into_iter().map(Into::into));
        self
    }

    /// Set compression settings
    pub fn compression(mut self, compression: CompressionConfig) -> Self {
        self.compression = compression;
        self
    }

    /// Set the debounce delay
    pub fn debounce(mut self, delay: Duration) -> Self {
        self.scheduler.debounce = delay;
        self
    }

    /// Set the periodic flush interval
    pub fn periodic_interval(mut self, interval: Duration) -> Self {
        self.scheduler.periodic_interval = interval;
        self
    }

    /// Set the event channel capacity
    pub fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity.max(1);
        self
    }

    /// Set the platform name recorded in exports
    pub fn platform(mut self, name: impl Into<String>) -> Self {
        self.platform = Some(name.into());
        self
    }

    /// Check whether a key is reserved
    pub fn is_reserved(&self, key: &str) -> bool {
        self.reserved_keys.iter().any(|k| k == key)
    }

    /// Declared default for a key, first declaration wins
    pub fn declared_default(&self, key: &str) -> Option<&Value> {
        self.defaults.iter().find(|(k, _)| k == key).map(|(_, value)| value)
    }

    /// Persisted form of a logical key
    pub fn persisted_key(&self, key: &str) -> String {
        format!("{}{}", self.key_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = SaveConfig::default();
        assert_eq!(config.key_prefix, "DataPro");
        assert_eq!(config.scheduler.debounce, Duration::from_millis(3100));
        assert_eq!(config.scheduler.periodic_interval, Duration::from_secs(60));
        assert_eq!(config.compression.threshold, 100);
        assert!(!config.compression.enabled);
    }

    #[test]
    fn test_builder() {
        let config = SaveConfig::new()
            .key_prefix("Game")
            .default_value("coins", 0)
            .default_value("skins", json!(["basic"]))
            .reserved_keys(["platform", "lang"])
            .debounce(Duration::from_millis(500));

        assert_eq!(config.persisted_key("coins"), "Gamecoins");
        assert_eq!(config.defaults.len(), 2);
        assert!(config.is_reserved("lang"));
        assert!(!config.is_reserved("coins"));
        assert_eq!(config.scheduler.debounce, Duration::from_millis(500));
    }

    #[test]
    fn test_declared_default_first_wins() {
        let config = SaveConfig::new()
            .default_value("music", true)
            .default_value("music", false);

        assert_eq!(config.declared_default("music"), Some(&json!(true)));
        assert_eq!(config.declared_default("coins"), None);
    }
}
