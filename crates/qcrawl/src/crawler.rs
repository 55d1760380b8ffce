//! High-level crawler API: wires settings, middleware, and handlers into a
//! running [`CrawlEngine`] and owns the crawl's lifecycle signals.

use std::sync::Arc;

use jiff::Zoned;
use qcrawl_core::error::Result;
use qcrawl_core::fingerprint::Fingerprinter;
use qcrawl_core::queue::{MemoryQueue, RequestQueue};
use qcrawl_core::response::Response;
use qcrawl_core::scheduler::Scheduler;
use qcrawl_core::signal::{Payload, Signal, SignalBus, Subscription};
use qcrawl_handlers::{Handler, HandlerRouter};
use qcrawl_middleware::{DownloaderMiddleware, MiddlewarePipeline, SpiderMiddleware};

use crate::engine::CrawlEngine;
use crate::settings::Settings;
use crate::spider::Spider;
use crate::stats::StatsCollector;

/// Drives one spider through a full crawl: resolves its settings overlay,
/// registers middleware and handlers, wires up stats collection, and runs
/// lifecycle signals around [`CrawlEngine::crawl`].
pub struct Crawler {
    spider: Arc<dyn Spider>,
    settings: Settings,
    bus: SignalBus,
    pipeline: MiddlewarePipeline,
    router: HandlerRouter,
    queue: Option<Arc<dyn RequestQueue>>,
    stats: Arc<StatsCollector>,
    stats_subscriptions: Vec<Subscription>,
}

impl Crawler {
    /// Creates a crawler for `spider` with a base settings snapshot.
    ///
    /// Registers [`qcrawl_http::ReqwestHandler`] under `"http"`/`"https"` when
    /// the `http` feature is enabled; call [`Crawler::register_handler`] to
    /// add or replace handlers.
    #[must_use]
    pub fn new(spider: impl Spider + 'static, settings: Settings) -> Self {
        let mut router = HandlerRouter::new();
        #[cfg(feature = "http")]
        {
            router.register("http", || Arc::new(qcrawl_http::ReqwestHandler::default()) as Arc<dyn Handler>);
            router.register("https", || Arc::new(qcrawl_http::ReqwestHandler::default()) as Arc<dyn Handler>);
        }

        Self {
            spider: Arc::new(spider),
            settings,
            bus: SignalBus::new(),
            pipeline: MiddlewarePipeline::new(),
            router,
            queue: None,
            stats: Arc::new(StatsCollector::new()),
            stats_subscriptions: Vec::new(),
        }
    }

    /// Registers (or replaces) the handler used for requests routed to `name`.
    pub fn register_handler(&mut self, name: impl Into<String>, factory: impl Fn() -> Arc<dyn Handler> + Send + Sync + 'static) -> &mut Self {
        self.router.register(name, factory);
        self
    }

    /// Appends a downloader middleware to the request/response chain.
    pub fn add_downloader_middleware(&mut self, middleware: impl DownloaderMiddleware + 'static) -> &mut Self {
        self.pipeline.add_downloader(middleware);
        self
    }

    /// Appends a spider middleware to the parse input/output chain.
    pub fn add_spider_middleware(&mut self, middleware: impl SpiderMiddleware + 'static) -> &mut Self {
        self.pipeline.add_spider(middleware);
        self
    }

    /// Overrides the backing request queue (defaults to an unbounded in-memory queue).
    pub fn with_queue(&mut self, queue: Arc<dyn RequestQueue>) -> &mut Self {
        self.queue = Some(queue);
        self
    }

    /// Returns the stats collector, for inspection after [`Crawler::crawl`] returns.
    #[must_use]
    pub fn stats(&self) -> Arc<StatsCollector> {
        self.stats.clone()
    }

    /// Provides the signal bus backing this crawler, for external observers
    /// (custom logging, metrics exporters) to subscribe to before `crawl()` runs.
    #[must_use]
    pub fn signals(&self) -> &SignalBus {
        &self.bus
    }

    /// Runs the full crawl lifecycle: settings merge, stats wiring, spider
    /// open/close hooks, and the engine's worker pool.
    ///
    /// # Errors
    ///
    /// Propagates an error from [`CrawlEngine::crawl`] after still running
    /// spider close hooks and emitting `spider_closed`.
    pub async fn crawl(mut self) -> Result<()> {
        let settings = self.settings.with_overrides(&self.spider.custom_settings());
        self.connect_stats_handlers();

        let signals = self.bus.for_sender(qcrawl_core::signal::SenderId::new());

        let queue = self.queue.clone().unwrap_or_else(|| Arc::new(MemoryQueue::new(0).expect("unbounded queue")));
        let scheduler = Arc::new(Scheduler::new(queue, Fingerprinter::new(), &self.bus));
        let router = Arc::new(self.router);
        let pipeline = Arc::new(self.pipeline);
        let spider_info = self.spider.info();

        self.stats.open_spider(self.spider.name(), now());
        pipeline.open_spider(&spider_info).await;
        self.spider.open_spider().await;
        signals.emit(Signal::SpiderOpened, Arc::new(self.spider.name().to_string()) as Payload).await;

        let engine = CrawlEngine::new(
            scheduler.clone(),
            router,
            pipeline.clone(),
            self.spider.clone(),
            signals.clone(),
            settings.concurrency,
            settings.timeout,
        );

        let result = engine.crawl().await;
        let reason = if result.is_ok() { "finished" } else { "error" };

        self.spider.close_spider(reason).await;
        pipeline.close_spider(&spider_info).await;
        signals.emit(Signal::SpiderClosed, Arc::new(reason.to_string()) as Payload).await;
        self.stats.close_spider(reason, now());

        tracing_log_final_stats(&self.stats);

        result
    }

    fn connect_stats_handlers(&mut self) {
        let stats = self.stats.clone();
        self.stats_subscriptions.push(self.bus.connect(Signal::ItemScraped, 0, None, move |_sender, _payload: &Payload| {
            stats.inc_value("pipeline/item_scraped_count", 1.0);
        }));

        let stats = self.stats.clone();
        self.stats_subscriptions.push(self.bus.connect(Signal::RequestScheduled, 0, None, move |_sender, _payload: &Payload| {
            stats.inc_value("scheduler/request_scheduled_count", 1.0);
        }));

        let stats = self.stats.clone();
        self.stats_subscriptions.push(self.bus.connect(Signal::RequestReachedDownloader, 0, None, move |_sender, _payload: &Payload| {
            stats.inc_value("downloader/request_downloaded_count", 1.0);
        }));

        let stats = self.stats.clone();
        self.stats_subscriptions.push(self.bus.connect(Signal::ResponseReceived, 0, None, move |_sender, payload: &Payload| {
            if let Some(response) = payload.downcast_ref::<Response>() {
                stats.inc_value("downloader/response_status_count", 1.0);
                stats.inc_value(&format!("downloader/response_status_{}", response.status().as_u16()), 1.0);
            }
        }));

        let stats = self.stats.clone();
        self.stats_subscriptions.push(self.bus.connect(Signal::RequestDropped, 0, None, move |_sender, _payload: &Payload| {
            stats.inc_value("scheduler/dequeued", 1.0);
            stats.inc_value("engine/error_count", 1.0);
        }));
    }
}

fn now() -> Zoned {
    Zoned::now()
}

fn tracing_log_final_stats(stats: &StatsCollector) {
    #[cfg(feature = "tracing")]
    tracing::info!("final stats:\n{}", stats.log_stats());
    #[cfg(not(feature = "tracing"))]
    let _ = stats.log_stats();
}
