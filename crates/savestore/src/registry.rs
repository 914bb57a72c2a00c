//! Tracked key registry
//!
//! The registry is the ordered set of keys that get persisted on every flush,
//! each with the default text used when no saved value exists. It grows on its
//! own: reading or writing an unknown key registers it.

use serde_json::Value;
use std::collections::HashSet;

use crate::normalize;

/// A tracked key with its default value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Logical key (without the persistence prefix)
    pub key: String,
    /// Default value text
    pub default_value: String,
}

impl Entry {
    /// Create a new entry
    pub fn new(key: impl Into<String>, default_value: impl Into<String>) -> Self {
        Self { key: key.into(), default_value: default_value.into() }
    }
}

/// Ordered registry of tracked keys
#[derive(Debug, Clone, Default)]
pub struct Registry {
    entries: Vec<Entry>,
    index: HashSet<String>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry from declared defaults
    ///
    /// Later duplicates of a key are ignored.
    pub fn with_defaults<I>(defaults: I) -> Self
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut registry = Self::new();
        for (key, default) in defaults {
            registry.ensure(&key, &default);
        }
        registry
    }

    /// Register `key` if it is not tracked yet
    ///
    /// The default is derived from the observed value's shape. Returns `true`
    /// when a new entry was appended; existing entries are never modified.
    pub fn ensure(&mut self, key: &str, observed: &Value) -> bool {
        if self.index.contains(key) {
            return false;
        }

        let default_value = normalize::default_text(observed);
        tracing::debug!(key, default = %default_value, "registered new save key");

        self.index.insert(key.to_string());
        self.entries.push(Entry::new(key, default_value));
        true
    }

    /// All entries in registration order
    pub fn all(&self) -> &[Entry] {
        &self.entries
    }

    /// Check whether a key is tracked
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains(key)
    }

    /// Default value text for a tracked key
    pub fn default_of(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| entry.default_value.as_str())
    }

    /// Stop tracking a key
    pub fn remove(&mut self, key: &str) -> bool {
        if !self.index.remove(key) {
            return false;
        }
        self.entries.retain(|entry| entry.key != key);
        true
    }

    /// Number of tracked keys
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if no keys are tracked
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tracked keys in registration order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.key.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ensure_appends_once() {
        let mut registry = Registry::new();

        assert!(registry.ensure("newKey", &json!(5)));
        assert!(!registry.ensure("newKey", &json!(7)));

        assert_eq!(registry.all(), &[Entry::new("newKey", "5")]);
    }

    #[test]
    fn test_default_derivation() {
        let mut registry = Registry::new();
        registry.ensure("flag", &json!(true));
        registry.ensure("items", &json!(["a", "b"]));
        registry.ensure("name", &json!("hero"));
        registry.ensure("missing", &Value::Null);

        assert_eq!(registry.default_of("flag"), Some("true"));
        assert_eq!(registry.default_of("items"), Some("[\"a\",\"b\"]"));
        assert_eq!(registry.default_of("name"), Some("hero"));
        assert_eq!(registry.default_of("missing"), Some(""));
    }

    #[test]
    fn test_order_is_append_order() {
        let mut registry = Registry::new();
        registry.ensure("b", &json!(1));
        registry.ensure("a", &json!(2));
        registry.ensure("c", &json!(3));

        let keys: Vec<&str> = registry.keys().collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_with_defaults_ignores_duplicates() {
        let registry = Registry::with_defaults(vec![
            ("coins".to_string(), json!(0)),
            ("coins".to_string(), json!(99)),
            ("level".to_string(), json!([1, 2])),
        ]);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.default_of("coins"), Some("0"));
        assert_eq!(registry.default_of("level"), Some("[1,2]"));
    }

    #[test]
    fn test_remove() {
        let mut registry = Registry::new();
        registry.ensure("coins", &json!(1));

        assert!(registry.remove("coins"));
        assert!(!registry.remove("coins"));
        assert!(!registry.contains("coins"));
        assert!(registry.is_empty());

        assert!(registry.ensure("coins", &json!(2)));
        assert_eq!(registry.default_of("coins"), Some("2"));
    }
}
