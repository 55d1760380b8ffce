//! Reqwest-based download handler for the qcrawl web crawling framework.
//!
//! [`ReqwestHandler`] is the default handler registered under `"http"` and
//! `"https"`: it converts a [`qcrawl_core::request::Request`] into a
//! [`reqwest::Request`], executes it, and converts the result back.

#![forbid(unsafe_code)]

use std::time::Duration;

use async_trait::async_trait;
use qcrawl_core::error::{Error, ErrorKind, Result};
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;
use qcrawl_handlers::Handler;

/// Download handler backed by a [`reqwest::Client`].
///
/// Clones of the inner client are cheap (it is itself `Arc`-backed), so
/// `ReqwestHandler` can be registered under multiple names and shared
/// across concurrent fetches without extra synchronization.
#[derive(Clone)]
pub struct ReqwestHandler {
    client: reqwest::Client,
}

impl ReqwestHandler {
    /// Wraps an existing reqwest client.
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Builds a handler from a default-configured reqwest client.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Handler`] if the underlying client fails to build
    /// (e.g. TLS backend initialization failure).
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| Error::with_source(ErrorKind::Handler, "failed to build reqwest client", Box::new(err)))?;
        Ok(Self::from_client(client))
    }
}

impl Default for ReqwestHandler {
    fn default() -> Self {
        Self::from_client(reqwest::Client::new())
    }
}

#[async_trait]
impl Handler for ReqwestHandler {
    async fn fetch(&self, request: &Request, _spider: &SpiderInfo, timeout: Duration) -> Result<Response> {
        let mut builder = self
            .client
            .request(request.method().clone(), request.url())
            .timeout(timeout);

        for (name, value) in request.headers() {
            builder = builder.header(name, value);
        }
        if let Some(body) = request.body() {
            builder = builder.body(body.clone());
        }

        let started = builder
            .build()
            .map_err(|err| Error::with_source(ErrorKind::Handler, "failed to build request", Box::new(err)))?;

        let response = self
            .client
            .execute(started)
            .await
            .map_err(|err| {
                let kind = if err.is_timeout() { ErrorKind::Timeout } else { ErrorKind::Handler };
                Error::with_source(kind, format!("request to {} failed", request.url()), Box::new(err))
            })?;

        let status = response.status();
        let mut headers = std::collections::BTreeMap::new();
        for (name, value) in response.headers() {
            if let Ok(value) = value.to_str() {
                headers.insert(name.as_str().to_string(), value.to_string());
            }
        }

        let body = response
            .bytes()
            .await
            .map_err(|err| Error::with_source(ErrorKind::Handler, "failed to read response body", Box::new(err)))?;

        let mut built = Response::new(request.url(), status, body.to_vec());
        for (name, value) in headers {
            built = built.with_header(name, value);
        }
        Ok(built.with_request(request.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn builds_default_client() {
        let handler = ReqwestHandler::new().unwrap();
        // Constructing the client is the observable behavior here; actually
        // dispatching a request needs a live server, covered by the http
        // crate's own integration tests rather than this unit test.
        let _ = handler;
    }
}
