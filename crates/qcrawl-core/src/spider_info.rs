//! Lightweight, read-only spider identity shared with middleware.
//!
//! Middleware hooks receive a [`SpiderInfo`] snapshot rather than the full
//! spider object: they rarely need more than the spider's name, domain
//! whitelist, and per-spider settings, and keeping the dependency one-way
//! (spider -> middleware, never the reverse) avoids a circular crate
//! dependency between the spider trait and the middleware chain.

use serde_json::{Map, Value};

/// Read-only snapshot of a spider's identity, passed to middleware hooks.
#[derive(Debug, Clone)]
pub struct SpiderInfo {
    name: String,
    allowed_domains: Vec<String>,
    custom_settings: Map<String, Value>,
}

impl SpiderInfo {
    /// Creates a new snapshot.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), allowed_domains: Vec::new(), custom_settings: Map::new() }
    }

    /// Sets the allowed-domains whitelist.
    #[must_use]
    pub fn with_allowed_domains(mut self, domains: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.allowed_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-spider custom settings overlay.
    #[must_use]
    pub fn with_custom_settings(mut self, settings: Map<String, Value>) -> Self {
        self.custom_settings = settings;
        self
    }

    /// Returns the spider's identifier.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the configured domain whitelist (empty means unrestricted).
    #[must_use]
    pub fn allowed_domains(&self) -> &[String] {
        &self.allowed_domains
    }

    /// Returns the per-spider settings overlay.
    #[must_use]
    pub fn custom_settings(&self) -> &Map<String, Value> {
        &self.custom_settings
    }
}
