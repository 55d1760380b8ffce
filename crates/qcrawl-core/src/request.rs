//! Crawl request: a normalized URL plus scheduling metadata.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::url;
use crate::Result;

/// Key under which [`Request::depth`] is stored in [`Request::meta`].
pub const META_DEPTH: &str = "depth";
/// Key under which [`Request::retry_count`] is stored in [`Request::meta`].
pub const META_RETRY_COUNT: &str = "retry_count";
/// Key under which a forced handler name is stored in [`Request::meta`].
pub const META_USE_HANDLER: &str = "use_handler";

/// HTTP request with crawling metadata.
///
/// The `url` is normalized (see [`crate::url::normalize`]) at construction time; a
/// request can only exist in normalized form, which keeps fingerprinting and
/// deduplication well-defined. Compare with [`crate::error::ErrorKind::Url`].
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    url: String,
    method: http::Method,
    headers: BTreeMap<String, String>,
    priority: i64,
    body: Option<Bytes>,
    meta: serde_json::Map<String, Value>,
}

impl Request {
    /// Creates a `GET` request for `url`, normalizing it immediately.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Url`] if `url` cannot be normalized.
    pub fn get(url: impl AsRef<str>) -> Result<Self> {
        Self::new(http::Method::GET, url)
    }

    /// Creates a request with an explicit method, normalizing `url` immediately.
    pub fn new(method: http::Method, url: impl AsRef<str>) -> Result<Self> {
        let url = url::normalize(url.as_ref())?;
        Ok(Self {
            url,
            method,
            headers: BTreeMap::new(),
            priority: 0,
            body: None,
            meta: serde_json::Map::new(),
        })
    }

    /// Returns the normalized URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP method.
    #[must_use]
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    /// Returns the scheduling priority. Lower values are processed first.
    #[must_use]
    pub fn priority(&self) -> i64 {
        self.priority
    }

    /// Sets the scheduling priority.
    #[must_use]
    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    /// Returns the request body, if any.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Sets the request body.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Returns the header map.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Inserts a header, overwriting any previous value.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the opaque metadata map.
    #[must_use]
    pub fn meta(&self) -> &serde_json::Map<String, Value> {
        &self.meta
    }

    /// Sets a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Returns the crawl depth, defaulting to `0` when absent or non-numeric.
    #[must_use]
    pub fn depth(&self) -> u32 {
        self.meta.get(META_DEPTH).and_then(Value::as_u64).unwrap_or(0) as u32
    }

    /// Returns a copy of `self` with depth set to `depth`.
    #[must_use]
    pub fn with_depth(self, depth: u32) -> Self {
        self.with_meta(META_DEPTH, depth)
    }

    /// Returns the retry count, defaulting to `0`.
    #[must_use]
    pub fn retry_count(&self) -> u32 {
        self.meta.get(META_RETRY_COUNT).and_then(Value::as_u64).unwrap_or(0) as u32
    }

    /// Returns a copy of `self` with the retry count incremented by one.
    #[must_use]
    pub fn with_incremented_retry(self) -> Self {
        let next = self.retry_count() + 1;
        self.with_meta(META_RETRY_COUNT, next)
    }

    /// Returns the handler name forced via [`META_USE_HANDLER`], if any.
    #[must_use]
    pub fn use_handler(&self) -> Option<&str> {
        self.meta.get(META_USE_HANDLER).and_then(Value::as_str)
    }

    /// Returns a shallow copy, optionally overriding the URL (which is re-normalized).
    ///
    /// Mirrors the common retry/redirect idiom of rebuilding a request from a
    /// previous one while preserving its metadata and headers.
    pub fn copy_with_url(&self, url: Option<&str>) -> Result<Self> {
        let url = match url {
            Some(url) => crate::url::normalize(url)?,
            None => self.url.clone(),
        };
        Ok(Self { url, ..self.clone() })
    }

    /// Returns a minimal, `body`-free snapshot intended for debugging and logging.
    #[must_use]
    pub fn to_debug_json(&self) -> Value {
        serde_json::json!({
            "url": self.url,
            "method": self.method.as_str(),
            "priority": self.priority,
            "headers": self.headers,
            "meta": self.meta,
        })
    }

    /// Serializes the request, including its body, to a byte buffer that can be
    /// round-tripped through [`Request::from_bytes`].
    pub fn to_bytes(&self) -> Result<Bytes> {
        let wire = WireRequest::from(self);
        let bytes = serde_json::to_vec(&wire)?;
        Ok(Bytes::from(bytes))
    }

    /// Deserializes a request previously produced by [`Request::to_bytes`].
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let wire: WireRequest = serde_json::from_slice(data)?;
        wire.try_into()
    }
}

#[derive(Serialize, Deserialize)]
struct WireRequest {
    url: String,
    method: String,
    headers: BTreeMap<String, String>,
    priority: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Bytes>,
    meta: serde_json::Map<String, Value>,
}

impl From<&Request> for WireRequest {
    fn from(r: &Request) -> Self {
        Self {
            url: r.url.clone(),
            method: r.method.as_str().to_string(),
            headers: r.headers.clone(),
            priority: r.priority,
            body: r.body.clone(),
            meta: r.meta.clone(),
        }
    }
}

impl TryFrom<WireRequest> for Request {
    type Error = Error;

    fn try_from(w: WireRequest) -> Result<Self> {
        let method = w
            .method
            .parse::<http::Method>()
            .map_err(|e| Error::with_source(ErrorKind::Url, "invalid HTTP method", Box::new(e)))?;
        Ok(Self {
            url: crate::url::normalize(&w.url)?,
            method,
            headers: w.headers,
            priority: w.priority,
            body: w.body,
            meta: w.meta,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn normalizes_url_on_construction() {
        let req = Request::get("HTTPS://Example.com:443/a/b/").unwrap();
        assert_eq!(req.url(), "https://example.com/a/b");
    }

    #[test]
    fn rejects_unparseable_url() {
        assert!(Request::get("::not a url::").is_err());
    }

    #[test]
    fn depth_defaults_to_zero_and_round_trips() {
        let req = Request::get("https://example.com").unwrap().with_depth(3);
        assert_eq!(req.depth(), 3);
    }

    #[test]
    fn to_bytes_from_bytes_round_trip() {
        let req = Request::get("https://example.com/x?y=1")
            .unwrap()
            .with_priority(-5)
            .with_header("accept", "text/html")
            .with_body(Bytes::from_static(b"payload"))
            .with_depth(2);
        let bytes = req.to_bytes().unwrap();
        let back = Request::from_bytes(&bytes).unwrap();
        assert_eq!(req, back);
    }

    #[test]
    fn copy_with_url_overrides_and_renormalizes() {
        let req = Request::get("https://example.com/a").unwrap().with_priority(1);
        let copy = req.copy_with_url(Some("https://example.com/b/")).unwrap();
        assert_eq!(copy.url(), "https://example.com/b");
        assert_eq!(copy.priority(), 1);
    }
}
