//! Async web crawling framework.
//!
//! A [`Spider`] describes what to crawl and how to parse it; a [`Crawler`]
//! wires it to middleware, a download handler, and a [`CrawlEngine`] worker
//! pool, and drives the crawl to completion.

#![forbid(unsafe_code)]

pub mod crawler;
pub mod engine;
pub mod settings;
pub mod spider;
pub mod stats;

pub use crawler::Crawler;
pub use engine::CrawlEngine;
pub use settings::Settings;
pub use spider::Spider;
pub use stats::{StatValue, StatsCollector};

/// Re-exports for glob-importing the common surface of this crate, along
/// with the lower layers most implementations will also need directly.
pub mod prelude {
    pub use crate::crawler::Crawler;
    pub use crate::engine::CrawlEngine;
    pub use crate::settings::Settings;
    pub use crate::spider::Spider;
    pub use crate::stats::{StatValue, StatsCollector};

    pub use qcrawl_core::prelude::*;
    pub use qcrawl_handlers::prelude::*;
    pub use qcrawl_middleware::prelude::*;
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use futures::stream;
    use futures::stream::StreamExt;
    use qcrawl_core::item::Item;
    use qcrawl_core::response::Response;
    use qcrawl_handlers::Handler;
    use qcrawl_middleware::{ParseOutcome, ParseStream};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    struct FakeHandler;

    #[async_trait]
    impl Handler for FakeHandler {
        async fn fetch(&self, request: &qcrawl_core::request::Request, _spider: &qcrawl_core::spider_info::SpiderInfo, _timeout: Duration) -> qcrawl_core::error::Result<Response> {
            let body = format!("<html>hello from {}</html>", request.url());
            Ok(Response::new(request.url(), http::StatusCode::OK, body.into_bytes()))
        }
    }

    struct EchoSpider {
        parsed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Spider for EchoSpider {
        fn name(&self) -> &str {
            "echo"
        }

        fn start_urls(&self) -> &[String] {
            static URLS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
            URLS.get_or_init(|| vec!["https://example.com".to_string()])
        }

        async fn parse(&self, response: Response) -> ParseStream {
            self.parsed.fetch_add(1, Ordering::SeqCst);
            let item = Item::new().with("body", response.text());
            stream::iter(vec![Ok(ParseOutcome::Item(item))]).boxed()
        }
    }

    #[tokio::test]
    async fn crawl_fetches_start_urls_and_emits_item() {
        let parsed = Arc::new(AtomicUsize::new(0));
        let spider = EchoSpider { parsed: parsed.clone() };

        let mut crawler = Crawler::new(spider, Settings { concurrency: 1, ..Settings::default() });
        crawler.register_handler("http", || Arc::new(FakeHandler) as Arc<dyn Handler>);
        crawler.register_handler("https", || Arc::new(FakeHandler) as Arc<dyn Handler>);

        let stats = crawler.stats();
        crawler.crawl().await.unwrap();

        assert_eq!(parsed.load(Ordering::SeqCst), 1);
        assert_eq!(
            stats.get_value("pipeline/item_scraped_count"),
            Some(crate::stats::StatValue::Counter(1.0))
        );
    }

    struct FailingSpider;

    #[async_trait]
    impl Spider for FailingSpider {
        fn name(&self) -> &str {
            "failing"
        }

        fn start_urls(&self) -> &[String] {
            static URLS: std::sync::OnceLock<Vec<String>> = std::sync::OnceLock::new();
            URLS.get_or_init(|| vec!["https://example.com".to_string()])
        }

        async fn parse(&self, _response: Response) -> ParseStream {
            stream::iter(vec![Err(qcrawl_core::error::Error::new(qcrawl_core::error::ErrorKind::Spider, "parse blew up"))]).boxed()
        }
    }

    struct RecoverWithFallbackItem;

    #[async_trait]
    impl qcrawl_middleware::SpiderMiddleware for RecoverWithFallbackItem {
        async fn process_spider_exception(
            &self,
            _response: &Response,
            _error: &qcrawl_core::error::Error,
            _spider: &qcrawl_core::spider_info::SpiderInfo,
        ) -> Option<ParseStream> {
            let item = Item::new().with("recovered", true);
            Some(stream::iter(vec![Ok(ParseOutcome::Item(item))]).boxed())
        }
    }

    #[tokio::test]
    async fn parse_error_is_routed_through_spider_exception_chain() {
        let mut crawler = Crawler::new(FailingSpider, Settings { concurrency: 1, ..Settings::default() });
        crawler.register_handler("http", || Arc::new(FakeHandler) as Arc<dyn Handler>);
        crawler.register_handler("https", || Arc::new(FakeHandler) as Arc<dyn Handler>);
        crawler.add_spider_middleware(RecoverWithFallbackItem);

        let stats = crawler.stats();
        crawler.crawl().await.unwrap();

        assert_eq!(
            stats.get_value("pipeline/item_scraped_count"),
            Some(crate::stats::StatValue::Counter(1.0))
        );
    }
}
