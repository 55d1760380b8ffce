//! Crawl engine: drives the scheduler/middleware/handler pipeline to completion.

use std::sync::Arc;
use std::time::Duration;

use futures::stream::StreamExt;
use qcrawl_core::error::{Error, Result};
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::scheduler::Scheduler;
use qcrawl_core::signal::{Payload, Signal, SignalDispatcher};
use qcrawl_core::spider_info::SpiderInfo;
use qcrawl_handlers::HandlerRouter;
use qcrawl_middleware::{MiddlewarePipeline, MiddlewareResult, ParseOutcome, ParseStream};

use crate::spider::Spider;

/// Orchestrates one crawl: wires the scheduler, middleware chains, and
/// handler router together and runs a fixed-size worker pool against them.
pub struct CrawlEngine {
    scheduler: Arc<Scheduler>,
    router: Arc<HandlerRouter>,
    pipeline: Arc<MiddlewarePipeline>,
    spider: Arc<dyn Spider>,
    signals: SignalDispatcher,
    concurrency: u32,
    timeout: Duration,
}

impl CrawlEngine {
    /// Wires together the components needed for a crawl run.
    #[must_use]
    pub fn new(
        scheduler: Arc<Scheduler>,
        router: Arc<HandlerRouter>,
        pipeline: Arc<MiddlewarePipeline>,
        spider: Arc<dyn Spider>,
        signals: SignalDispatcher,
        concurrency: u32,
        timeout: Duration,
    ) -> Self {
        Self { scheduler, router, pipeline, spider, signals, concurrency, timeout }
    }

    /// Runs the crawl to completion: seeds start requests, spawns workers,
    /// and waits for the scheduler to drain.
    ///
    /// # Errors
    ///
    /// Propagates the first unhandled error raised while scheduling start
    /// requests, after emitting [`Signal::SpiderError`].
    pub async fn crawl(&self) -> Result<()> {
        let spider_info = self.spider.info();

        let result = self.schedule_start_requests(&spider_info).await;
        if let Err(err) = &result {
            self.signals.emit(Signal::SpiderError, Arc::new(err.to_string()) as Payload).await;
        }

        let mut workers = Vec::with_capacity(self.concurrency as usize);
        if result.is_ok() {
            for _ in 0..self.concurrency.max(1) {
                let worker = Worker {
                    scheduler: self.scheduler.clone(),
                    router: self.router.clone(),
                    pipeline: self.pipeline.clone(),
                    spider: self.spider.clone(),
                    signals: self.signals.clone(),
                    spider_info: spider_info.clone(),
                    timeout: self.timeout,
                };
                workers.push(tokio::spawn(worker.run()));
            }
            self.scheduler.join().await;
        }

        self.scheduler.close().await;
        for worker in workers {
            worker.abort();
            let _ = worker.await;
        }

        result
    }

    async fn schedule_start_requests(&self, spider_info: &SpiderInfo) -> Result<()> {
        let requests = self.spider.start_requests().await;
        let mut requests = self.pipeline.process_start_requests(requests, spider_info).await;
        while let Some(request) = requests.next().await {
            self.scheduler.add(request).await?;
        }
        Ok(())
    }
}

/// Per-task worker loop: pulls a request from the scheduler, runs it through
/// the downloader and spider phases, and marks it done.
struct Worker {
    scheduler: Arc<Scheduler>,
    router: Arc<HandlerRouter>,
    pipeline: Arc<MiddlewarePipeline>,
    spider: Arc<dyn Spider>,
    signals: SignalDispatcher,
    spider_info: SpiderInfo,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        loop {
            let Some(request) = self.scheduler.get().await else { break };

            match self.process_request(&request).await {
                Ok(Some(response)) => self.process_parse_results(&request, response).await,
                Ok(None) => {}
                Err(err) => self.handle_exception(&request, err).await,
            }

            self.scheduler.task_done().await;
        }
    }

    async fn process_request(&self, request: &Request) -> Result<Option<Response>> {
        match self.pipeline.process_request(request, &self.spider_info).await {
            MiddlewareResult::Keep(response) => return Ok(Some(response)),
            result @ (MiddlewareResult::Retry(_) | MiddlewareResult::Drop) => {
                self.handle_retry_or_drop(result, request).await;
                return Ok(None);
            }
            MiddlewareResult::Continue => {}
        }

        self.signals.emit(Signal::RequestReachedDownloader, Arc::new(request.clone()) as Payload).await;

        let response = self.router.fetch(request, &self.spider_info, Some(self.timeout)).await?;
        self.signals.emit(Signal::ResponseReceived, Arc::new(response.clone()) as Payload).await;

        match self.pipeline.process_response(request, response, &self.spider_info).await {
            MiddlewareResult::Keep(response) => Ok(Some(response)),
            result @ (MiddlewareResult::Retry(_) | MiddlewareResult::Drop) => {
                self.handle_retry_or_drop(result, request).await;
                Ok(None)
            }
            MiddlewareResult::Continue => Ok(None),
        }
    }

    async fn process_parse_results(&self, request: &Request, response: Response) {
        if let Some(err) = self.pipeline.process_spider_input(&response, &self.spider_info).await {
            self.handle_exception(request, err).await;
            return;
        }

        let outcomes = self.spider.parse(response.clone()).await;
        let outcomes = self.pipeline.process_spider_output(&response, outcomes, &self.spider_info).await;

        self.drain_parse_stream(request, &response, outcomes).await;
    }

    /// Drains a parse stream, dispatching each outcome and routing a
    /// mid-stream parse failure through the spider-exception chain before
    /// falling back to [`Worker::handle_exception`].
    async fn drain_parse_stream(&self, request: &Request, response: &Response, mut outcomes: ParseStream) {
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(ParseOutcome::Item(item)) => {
                    self.signals.emit(Signal::ItemScraped, Arc::new(item) as Payload).await;
                }
                Ok(ParseOutcome::Request(request)) => {
                    let _ = self.scheduler.add(request).await;
                }
                Ok(ParseOutcome::Url(url)) => {
                    if let Ok(request) = Request::get(&url) {
                        let _ = self.scheduler.add(request).await;
                    }
                }
                Err(err) => {
                    match self.pipeline.process_spider_exception(response, &err, &self.spider_info).await {
                        Some(recovery) => {
                            // Box the recursive drain so an async fn isn't infinitely sized.
                            Box::pin(self.drain_parse_stream(request, response, recovery)).await;
                        }
                        None => self.handle_exception(request, err).await,
                    }
                    return;
                }
            }
        }
    }

    async fn handle_retry_or_drop(&self, result: MiddlewareResult, original: &Request) {
        match result {
            MiddlewareResult::Retry(retry) => {
                let _ = self.scheduler.add(retry).await;
            }
            MiddlewareResult::Drop => {
                self.signals.emit(Signal::RequestDropped, Arc::new(original.clone()) as Payload).await;
            }
            MiddlewareResult::Continue | MiddlewareResult::Keep(_) => {}
        }
    }

    async fn handle_exception(&self, request: &Request, error: Error) {
        let result = self.pipeline.process_exception(request, &error, &self.spider_info).await;
        match result {
            result @ (MiddlewareResult::Retry(_) | MiddlewareResult::Drop) => {
                self.handle_retry_or_drop(result, request).await;
            }
            MiddlewareResult::Continue | MiddlewareResult::Keep(_) => {
                self.signals.emit(Signal::RequestDropped, Arc::new(request.clone()) as Payload).await;
            }
        }
    }
}
