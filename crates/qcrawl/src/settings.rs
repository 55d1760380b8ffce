//! Runtime settings: immutable configuration snapshot shared by the crawler,
//! scheduler and download handlers.

use std::collections::BTreeMap;
use std::time::Duration;

use serde_json::Value;

/// Immutable runtime configuration for a crawl.
///
/// Field names double as the canonical (uppercase) keys a spider's
/// `custom_settings` map is matched against in [`Settings::with_overrides`] —
/// unknown keys are ignored rather than rejected, mirroring the
/// "keep only overrides mapping to known runtime keys" behavior of the
/// reference settings loader this type is modeled on.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Number of concurrent worker tasks draining the scheduler.
    pub concurrency: u32,
    /// Soft cap on in-flight requests per domain (enforced by middleware, not the engine).
    pub concurrency_per_domain: u32,
    /// Minimum delay between requests to the same domain (enforced by middleware).
    pub delay_per_domain: Duration,
    /// Maximum crawl depth; `0` means unlimited.
    pub max_depth: u32,
    /// Per-request fetch timeout.
    pub timeout: Duration,
    /// Maximum retry attempts for a failed request.
    pub max_retries: u32,
    /// `User-Agent` header value applied by default.
    pub user_agent: String,
    /// Headers merged into every outgoing request unless overridden.
    pub default_request_headers: BTreeMap<String, String>,
    /// Opaque handler-specific settings (e.g. connection pool sizing).
    pub downloader_settings: BTreeMap<String, Value>,
}

impl Settings {
    /// Applies a spider's `custom_settings` map on top of this snapshot.
    ///
    /// Keys are matched case-insensitively against the canonical field
    /// names; unrecognized keys are ignored rather than causing an error.
    #[must_use]
    pub fn with_overrides(&self, overrides: &serde_json::Map<String, Value>) -> Self {
        let mut next = self.clone();
        for (key, value) in overrides {
            match key.to_ascii_uppercase().as_str() {
                "CONCURRENCY" => {
                    if let Some(n) = value.as_u64().filter(|n| (1..=10_000).contains(n)) {
                        next.concurrency = n as u32;
                    }
                }
                "CONCURRENCY_PER_DOMAIN" => {
                    if let Some(n) = value.as_u64() {
                        next.concurrency_per_domain = n as u32;
                    }
                }
                "DELAY_PER_DOMAIN" => {
                    if let Some(secs) = value.as_f64() {
                        next.delay_per_domain = Duration::from_secs_f64(secs);
                    }
                }
                "MAX_DEPTH" => {
                    if let Some(n) = value.as_u64() {
                        next.max_depth = n as u32;
                    }
                }
                "TIMEOUT" => {
                    if let Some(secs) = value.as_f64() {
                        next.timeout = Duration::from_secs_f64(secs);
                    }
                }
                "MAX_RETRIES" => {
                    if let Some(n) = value.as_u64() {
                        next.max_retries = n as u32;
                    }
                }
                "USER_AGENT" => {
                    if let Some(s) = value.as_str() {
                        next.user_agent = s.to_string();
                    }
                }
                _ => {}
            }
        }
        next
    }
}

impl Default for Settings {
    fn default() -> Self {
        let mut default_request_headers = BTreeMap::new();
        default_request_headers.insert(
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8".to_string(),
        );
        default_request_headers.insert("Accept-Language".to_string(), "en".to_string());

        let mut downloader_settings = BTreeMap::new();
        downloader_settings.insert("max_connections".to_string(), Value::from(200));
        downloader_settings.insert("max_connections_per_host".to_string(), Value::from(10));

        Self {
            concurrency: 10,
            concurrency_per_domain: 2,
            delay_per_domain: Duration::from_millis(250),
            max_depth: 0,
            timeout: Duration::from_secs(30),
            max_retries: 3,
            user_agent: "qcrawl/0.1".to_string(),
            default_request_headers,
            downloader_settings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_overrides_applies_known_keys_only() {
        let base = Settings::default();
        let mut overrides = serde_json::Map::new();
        overrides.insert("concurrency".to_string(), Value::from(42));
        overrides.insert("unknown_key".to_string(), Value::from("ignored"));

        let merged = base.with_overrides(&overrides);
        assert_eq!(merged.concurrency, 42);
        assert_eq!(merged.timeout, base.timeout);
    }

    #[test]
    fn default_has_sane_concurrency() {
        let settings = Settings::default();
        assert_eq!(settings.concurrency, 10);
        assert!(settings.timeout.as_secs() > 0);
    }
}
