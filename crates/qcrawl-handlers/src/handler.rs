//! The trait a concrete download handler implements.

use std::time::Duration;

use async_trait::async_trait;
use qcrawl_core::error::Result;
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;

/// Default request timeout used when a caller doesn't specify one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(180);

/// Performs the actual network (or protocol-specific) fetch for a [`Request`].
///
/// Implementations own a single protocol ("http", "https", a headless
/// browser, ...) and are looked up by name through a [`crate::HandlerRouter`].
/// `close` must be idempotent; the router calls it at most once per handler
/// instance but implementations may be reused directly.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Fetches `request`, returning the resulting [`Response`].
    async fn fetch(&self, request: &Request, spider: &SpiderInfo, timeout: Duration) -> Result<Response>;

    /// Releases any resources held by this handler (connection pools,
    /// browser processes, ...). Safe to call more than once.
    async fn close(&self) {}
}
