//! Downloader middleware: participates in the request/response/exception
//! phases surrounding the actual network fetch.

use async_trait::async_trait;
use qcrawl_core::error::Error;
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;

/// Outcome of a downloader middleware hook, expressing the requested engine action.
#[derive(Debug)]
pub enum MiddlewareResult {
    /// No opinion; let the chain/engine proceed as usual.
    Continue,
    /// Accept or replace the response.
    Keep(Response),
    /// Schedule `Request` for retry instead of proceeding.
    Retry(Request),
    /// Drop the current response/request.
    Drop,
}

impl MiddlewareResult {
    /// Returns whether this result is [`MiddlewareResult::Continue`].
    #[must_use]
    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

/// Participates in the request/response/exception phases around a download.
///
/// All hooks default to passing through unchanged; implementations override
/// only the phases they care about.
#[async_trait]
pub trait DownloaderMiddleware: Send + Sync {
    /// Inspects or short-circuits a request before it is downloaded.
    async fn process_request(&self, _request: &Request, _spider: &SpiderInfo) -> MiddlewareResult {
        MiddlewareResult::Continue
    }

    /// Inspects or replaces a response after download.
    async fn process_response(&self, _request: &Request, response: Response, _spider: &SpiderInfo) -> MiddlewareResult {
        MiddlewareResult::Keep(response)
    }

    /// Handles an exception raised while downloading.
    async fn process_exception(&self, _request: &Request, _error: &Error, _spider: &SpiderInfo) -> MiddlewareResult {
        MiddlewareResult::Continue
    }

    /// Called once when the spider this middleware is attached to opens.
    async fn open_spider(&self, _spider: &SpiderInfo) {}

    /// Called once when the spider this middleware is attached to closes.
    async fn close_spider(&self, _spider: &SpiderInfo) {}
}
