//! The `Spider` trait: a crawl's starting points and parsing logic.

use async_trait::async_trait;
use futures::stream;
use futures::stream::StreamExt;
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;
use qcrawl_middleware::{ParseStream, RequestStream};

/// A crawl target: produces the initial requests and parses every response.
///
/// `start_requests` has a default implementation that issues a `GET` for
/// each of [`Spider::start_urls`] at depth `0`; override it to build more
/// specific initial requests (custom methods, headers, or priorities).
#[async_trait]
pub trait Spider: Send + Sync {
    /// Unique, human-readable spider name; used in logs and stats.
    fn name(&self) -> &str;

    /// Seed URLs used by the default `start_requests` implementation.
    fn start_urls(&self) -> &[String] {
        &[]
    }

    /// Domains this spider is restricted to, or empty for no restriction.
    ///
    /// Enforcement is left to an offsite-filtering spider middleware; this
    /// is metadata the middleware reads via [`SpiderInfo`].
    fn allowed_domains(&self) -> &[String] {
        &[]
    }

    /// Settings overrides this spider wants merged into the runtime snapshot.
    fn custom_settings(&self) -> serde_json::Map<String, serde_json::Value> {
        serde_json::Map::new()
    }

    /// Returns a read-only snapshot for middleware hooks.
    fn info(&self) -> SpiderInfo {
        SpiderInfo::new(self.name())
            .with_allowed_domains(self.allowed_domains().to_vec())
            .with_custom_settings(self.custom_settings())
    }

    /// Produces the initial stream of requests to schedule.
    async fn start_requests(&self) -> RequestStream {
        let requests: Vec<Request> = self
            .start_urls()
            .iter()
            .filter_map(|url| Request::get(url).ok().map(|r| r.with_depth(0)))
            .collect();
        stream::iter(requests).boxed()
    }

    /// Parses a downloaded response into items and/or follow-up requests.
    ///
    /// A yielded `Err` is routed to the spider-exception middleware chain
    /// instead of being treated as a scraped outcome; see
    /// [`qcrawl_middleware::SpiderMiddleware::process_spider_exception`].
    async fn parse(&self, response: Response) -> ParseStream;

    /// Called once after the engine is wired up, before any requests run.
    async fn open_spider(&self) {}

    /// Called once after the crawl finishes, successfully or not.
    async fn close_spider(&self, _reason: &str) {}
}
