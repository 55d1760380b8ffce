//! Composes registered downloader/spider middleware into ordered chains.

use std::sync::Arc;

use qcrawl_core::error::Error;
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;

use crate::downloader::{DownloaderMiddleware, MiddlewareResult};
use crate::spider::{ParseStream, RequestStream, SpiderMiddleware};

/// Coordinates the downloader and spider middleware chains.
///
/// - `process_request` runs the downloader stack in registration order.
/// - `process_response`/`process_exception` run it in reverse order.
/// - Spider hooks run in registration order; stream-returning hooks compose
///   by feeding each middleware's output into the next.
#[derive(Default, Clone)]
pub struct MiddlewarePipeline {
    downloader: Vec<Arc<dyn DownloaderMiddleware>>,
    spider: Vec<Arc<dyn SpiderMiddleware>>,
}

impl MiddlewarePipeline {
    /// Creates an empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a downloader middleware to the end of the chain.
    pub fn add_downloader(&mut self, middleware: impl DownloaderMiddleware + 'static) -> &mut Self {
        self.downloader.push(Arc::new(middleware));
        self
    }

    /// Appends a spider middleware to the end of the chain.
    pub fn add_spider(&mut self, middleware: impl SpiderMiddleware + 'static) -> &mut Self {
        self.spider.push(Arc::new(middleware));
        self
    }

    /// Runs the downloader `process_request` chain in registration order.
    ///
    /// Stops at the first non-[`MiddlewareResult::Continue`] result.
    pub async fn process_request(&self, request: &Request, spider: &SpiderInfo) -> MiddlewareResult {
        for mw in &self.downloader {
            let result = mw.process_request(request, spider).await;
            if result.is_continue() {
                continue;
            }
            return result;
        }
        MiddlewareResult::Continue
    }

    /// Runs the downloader `process_response` chain in reverse registration order.
    ///
    /// `Keep` results update the in-flight response and the chain continues;
    /// `Retry`/`Drop` short-circuit immediately.
    pub async fn process_response(&self, request: &Request, response: Response, spider: &SpiderInfo) -> MiddlewareResult {
        let mut current = response;
        for mw in self.downloader.iter().rev() {
            // `process_response` takes `current` by value and must hand back a
            // response for `Continue`/`Keep`, so reconstruct the next `current`
            // from a clone and only commit to `mw`'s verdict afterwards.
            match mw.process_response(request, current.clone(), spider).await {
                MiddlewareResult::Continue => continue,
                MiddlewareResult::Keep(next) => current = next,
                other @ (MiddlewareResult::Retry(_) | MiddlewareResult::Drop) => return other,
            }
        }
        MiddlewareResult::Keep(current)
    }

    /// Runs the downloader `process_exception` chain in reverse registration order.
    pub async fn process_exception(&self, request: &Request, error: &Error, spider: &SpiderInfo) -> MiddlewareResult {
        for mw in self.downloader.iter().rev() {
            let result = mw.process_exception(request, error, spider).await;
            if result.is_continue() {
                continue;
            }
            return result;
        }
        MiddlewareResult::Continue
    }

    /// Calls `open_spider` on every registered downloader and spider
    /// middleware, in registration order.
    pub async fn open_spider(&self, spider: &SpiderInfo) {
        for mw in &self.downloader {
            mw.open_spider(spider).await;
        }
        for mw in &self.spider {
            mw.open_spider(spider).await;
        }
    }

    /// Calls `close_spider` on every registered middleware, in reverse
    /// registration order.
    pub async fn close_spider(&self, spider: &SpiderInfo) {
        for mw in self.spider.iter().rev() {
            mw.close_spider(spider).await;
        }
        for mw in self.downloader.iter().rev() {
            mw.close_spider(spider).await;
        }
    }

    /// Feeds `requests` through each spider middleware's `process_start_requests`,
    /// composing them in registration order.
    pub async fn process_start_requests(&self, requests: RequestStream, spider: &SpiderInfo) -> RequestStream {
        let mut stream = requests;
        for mw in &self.spider {
            stream = mw.process_start_requests(stream, spider).await;
        }
        stream
    }

    /// Runs the spider `process_spider_input` chain; the first non-`None`
    /// result short-circuits the remaining middleware.
    pub async fn process_spider_input(&self, response: &Response, spider: &SpiderInfo) -> Option<Error> {
        for mw in &self.spider {
            if let Some(err) = mw.process_spider_input(response, spider).await {
                return Some(err);
            }
        }
        None
    }

    /// Feeds a spider's parse output through each spider middleware's
    /// `process_spider_output`, composing them in registration order.
    pub async fn process_spider_output(&self, response: &Response, output: ParseStream, spider: &SpiderInfo) -> ParseStream {
        let mut stream = output;
        for mw in &self.spider {
            stream = mw.process_spider_output(response, stream, spider).await;
        }
        stream
    }

    /// Runs the spider `process_spider_exception` chain in registration
    /// order; the first middleware to supply a recovery stream wins.
    pub async fn process_spider_exception(&self, response: &Response, error: &Error, spider: &SpiderInfo) -> Option<ParseStream> {
        for mw in &self.spider {
            if let Some(stream) = mw.process_spider_exception(response, error, spider).await {
                return Some(stream);
            }
        }
        None
    }
}

impl std::fmt::Debug for MiddlewarePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MiddlewarePipeline")
            .field("downloader", &self.downloader.len())
            .field("spider", &self.spider.len())
            .finish()
    }
}
