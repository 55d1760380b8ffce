//! Crawl response: the result of fetching a [`Request`] through a download handler.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde_json::Value;

use crate::error::{Error, ErrorKind};
use crate::request::Request;
use crate::Result;

/// HTTP response wrapper with cached accessors for decoded content.
#[derive(Debug, Clone)]
pub struct Response {
    url: String,
    content: Bytes,
    status: http::StatusCode,
    headers: BTreeMap<String, String>,
    request: Option<Request>,
    meta: serde_json::Map<String, Value>,
}

impl Response {
    /// Creates a new [`Response`].
    #[must_use]
    pub fn new(url: impl Into<String>, status: http::StatusCode, content: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            content: content.into(),
            status,
            headers: BTreeMap::new(),
            request: None,
            meta: serde_json::Map::new(),
        }
    }

    /// Attaches the originating request.
    #[must_use]
    pub fn with_request(mut self, request: Request) -> Self {
        self.request = Some(request);
        self
    }

    /// Attaches a response header.
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Returns the final (post-redirect) URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the HTTP status code.
    #[must_use]
    pub fn status(&self) -> http::StatusCode {
        self.status
    }

    /// Returns the raw response body.
    #[must_use]
    pub fn content(&self) -> &Bytes {
        &self.content
    }

    /// Returns the response headers.
    #[must_use]
    pub fn headers(&self) -> &BTreeMap<String, String> {
        &self.headers
    }

    /// Returns the originating request, if attached.
    #[must_use]
    pub fn request(&self) -> Option<&Request> {
        self.request.as_ref()
    }

    /// Returns the mutable opaque metadata map (filled in by middleware).
    pub fn meta_mut(&mut self) -> &mut serde_json::Map<String, Value> {
        &mut self.meta
    }

    /// Returns the opaque metadata map.
    #[must_use]
    pub fn meta(&self) -> &serde_json::Map<String, Value> {
        &self.meta
    }

    /// Decodes the body as UTF-8, substituting the replacement character for
    /// invalid byte sequences.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.content).into_owned()
    }

    /// Parses the body as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Other`] if the body is not valid JSON.
    pub fn json(&self) -> Result<Value> {
        serde_json::from_slice(&self.content)
            .map_err(|e| Error::with_source(ErrorKind::Other, format!("invalid JSON in {}", self.url), Box::new(e)))
    }

    /// Resolves `href` against this response's URL and normalizes the result.
    pub fn follow(&self, href: &str) -> Result<String> {
        crate::url::join_and_normalize(&self.url, href)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn text_replaces_invalid_utf8() {
        let resp = Response::new("https://example.com", http::StatusCode::OK, vec![0xff, 0xfe]);
        assert!(resp.text().contains('\u{FFFD}'));
    }

    #[test]
    fn json_parses_body() {
        let resp = Response::new("https://example.com", http::StatusCode::OK, br#"{"a":1}"#.to_vec());
        assert_eq!(resp.json().unwrap()["a"], 1);
    }

    #[test]
    fn follow_resolves_relative_href() {
        let resp = Response::new("https://example.com/a/b", http::StatusCode::OK, Vec::new());
        assert_eq!(resp.follow("../c").unwrap(), "https://example.com/a/c");
    }
}
