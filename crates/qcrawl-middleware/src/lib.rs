//! Downloader and spider middleware chains for the qcrawl web crawling framework.

#![forbid(unsafe_code)]

pub mod downloader;
pub mod pipeline;
pub mod spider;

pub use downloader::{DownloaderMiddleware, MiddlewareResult};
pub use pipeline::MiddlewarePipeline;
pub use spider::{ParseOutcome, ParseStream, RequestStream, SpiderMiddleware};

/// Re-exports for glob-importing the common surface of this crate.
pub mod prelude {
    pub use crate::downloader::{DownloaderMiddleware, MiddlewareResult};
    pub use crate::pipeline::MiddlewarePipeline;
    pub use crate::spider::{ParseOutcome, ParseStream, RequestStream, SpiderMiddleware};
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use futures::stream::{self, StreamExt};
    use qcrawl_core::error::{Error, ErrorKind};
    use qcrawl_core::request::Request;
    use qcrawl_core::response::Response;
    use qcrawl_core::spider_info::SpiderInfo;

    use super::*;

    struct TagHeader(&'static str);

    #[async_trait]
    impl DownloaderMiddleware for TagHeader {
        async fn process_request(&self, _request: &Request, _spider: &SpiderInfo) -> MiddlewareResult {
            MiddlewareResult::Continue
        }

        async fn process_response(&self, _request: &Request, response: Response, _spider: &SpiderInfo) -> MiddlewareResult {
            let mut response = response;
            response.meta_mut().insert(self.0.to_string(), true.into());
            MiddlewareResult::Keep(response)
        }
    }

    struct AlwaysDrop;

    #[async_trait]
    impl DownloaderMiddleware for AlwaysDrop {
        async fn process_request(&self, _request: &Request, _spider: &SpiderInfo) -> MiddlewareResult {
            MiddlewareResult::Drop
        }
    }

    fn spider() -> SpiderInfo {
        SpiderInfo::new("test")
    }

    #[tokio::test]
    async fn process_request_short_circuits_on_drop() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add_downloader(TagHeader("first"));
        pipeline.add_downloader(AlwaysDrop);
        let req = Request::get("https://example.com").unwrap();
        let result = pipeline.process_request(&req, &spider()).await;
        assert!(matches!(result, MiddlewareResult::Drop));
    }

    #[tokio::test]
    async fn process_response_applies_in_reverse_order() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add_downloader(TagHeader("outer"));
        pipeline.add_downloader(TagHeader("inner"));
        let req = Request::get("https://example.com").unwrap();
        let response = Response::new("https://example.com", http::StatusCode::OK, Vec::new());
        let result = pipeline.process_response(&req, response, &spider()).await;
        match result {
            MiddlewareResult::Keep(resp) => {
                assert!(resp.meta().contains_key("outer"));
                assert!(resp.meta().contains_key("inner"));
            }
            _ => panic!("expected Keep"),
        }
    }

    #[tokio::test]
    async fn open_spider_runs_downloader_then_spider_in_order() {
        struct Counter(Arc<AtomicUsize>, usize);

        #[async_trait]
        impl DownloaderMiddleware for Counter {
            async fn open_spider(&self, _spider: &SpiderInfo) {
                assert_eq!(self.0.fetch_add(1, Ordering::SeqCst), self.1);
            }
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add_downloader(Counter(seen.clone(), 0));
        pipeline.open_spider(&spider()).await;
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    struct DropEmptyUrls;

    #[async_trait]
    impl SpiderMiddleware for DropEmptyUrls {
        async fn process_spider_output(&self, _response: &Response, output: ParseStream, _spider: &SpiderInfo) -> ParseStream {
            output
                .filter(|outcome| {
                    let keep = !matches!(outcome, Ok(ParseOutcome::Url(u)) if u.is_empty());
                    futures::future::ready(keep)
                })
                .boxed()
        }
    }

    #[tokio::test]
    async fn process_spider_output_filters_through_middleware() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add_spider(DropEmptyUrls);
        let response = Response::new("https://example.com", http::StatusCode::OK, Vec::new());
        let items = stream::iter(vec![Ok(ParseOutcome::Url(String::new())), Ok(ParseOutcome::Url("https://example.com/x".into()))]).boxed();
        let out: Vec<_> = pipeline.process_spider_output(&response, items, &spider()).await.collect().await;
        assert_eq!(out.len(), 1);
    }

    struct RecoverWithEmpty;

    #[async_trait]
    impl SpiderMiddleware for RecoverWithEmpty {
        async fn process_spider_exception(&self, _response: &Response, _error: &Error, _spider: &SpiderInfo) -> Option<ParseStream> {
            Some(stream::empty().boxed())
        }
    }

    #[tokio::test]
    async fn process_spider_exception_recovers() {
        let mut pipeline = MiddlewarePipeline::new();
        pipeline.add_spider(RecoverWithEmpty);
        let response = Response::new("https://example.com", http::StatusCode::OK, Vec::new());
        let err = Error::new(ErrorKind::Spider, "boom");
        let recovered = pipeline.process_spider_exception(&response, &err, &spider()).await;
        assert!(recovered.is_some());
    }
}
