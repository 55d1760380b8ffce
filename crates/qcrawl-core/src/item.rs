//! Scraped item: a loosely-typed bag of scalar data yielded by a spider's `parse`.

use serde_json::{Map, Value};

/// A dict-like container of scraped fields, with an attached `metadata` map for
/// pipeline bookkeeping (e.g. the response it was scraped from, timestamps).
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Item {
    data: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl Item {
    /// Creates an empty item.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the scraped field data.
    #[must_use]
    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    /// Returns pipeline metadata attached to this item.
    #[must_use]
    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    /// Returns a mutable reference to the metadata map.
    pub fn metadata_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.metadata
    }

    /// Sets a field, returning `self` for chaining.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Returns a field value by key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// Returns whether `key` is present.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.data.contains_key(key)
    }

    /// Inserts or overwrites a field.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.data.insert(key.into(), value.into())
    }
}

impl From<Map<String, Value>> for Item {
    fn from(data: Map<String, Value>) -> Self {
        Self { data, metadata: Map::new() }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let item = Item::new().with("title", "hello").with("price", 9.99);
        assert_eq!(item.get("title").unwrap(), "hello");
        assert!(item.contains_key("price"));
    }
}
