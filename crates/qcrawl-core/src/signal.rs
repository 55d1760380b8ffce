//! Typed pub/sub signal bus used for crawl lifecycle notifications.
//!
//! Unlike the weak-reference based registry this crate's behavior is modeled
//! on, subscriptions here are tracked explicitly: [`SignalBus::connect`]
//! returns a [`Subscription`] handle that unsubscribes itself on drop (or via
//! an explicit [`Subscription::unsubscribe`] call). There is no reliance on
//! garbage collection to reclaim dead handlers.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Semaphore;

/// Opaque identity of a signal sender (a [`crate::scheduler::Scheduler`], a
/// downloader, a spider, ...), used for sender-scoped filtering in place of
/// Python's object-identity (`is`) comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SenderId(u64);

static NEXT_SENDER_ID: AtomicU64 = AtomicU64::new(1);

impl SenderId {
    /// Allocates a fresh, process-unique sender identity.
    #[must_use]
    pub fn new() -> Self {
        Self(NEXT_SENDER_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SenderId {
    fn default() -> Self {
        Self::new()
    }
}

/// A lifecycle event name understood by [`SignalBus`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    SpiderOpened,
    SpiderClosed,
    SpiderIdle,
    SpiderError,
    RequestScheduled,
    RequestDropped,
    RequestReachedDownloader,
    RequestFailed,
    ResponseReceived,
    ItemScraped,
    ItemDropped,
    ItemError,
    BytesReceived,
    HeadersReceived,
}

impl Signal {
    /// Returns the wire/log name of the signal, matching the crawl engine's
    /// configuration vocabulary.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SpiderOpened => "spider_opened",
            Self::SpiderClosed => "spider_closed",
            Self::SpiderIdle => "spider_idle",
            Self::SpiderError => "spider_error",
            Self::RequestScheduled => "request_scheduled",
            Self::RequestDropped => "request_dropped",
            Self::RequestReachedDownloader => "request_reached_downloader",
            Self::RequestFailed => "request_failed",
            Self::ResponseReceived => "response_received",
            Self::ItemScraped => "item_scraped",
            Self::ItemDropped => "item_dropped",
            Self::ItemError => "item_error",
            Self::BytesReceived => "bytes_received",
            Self::HeadersReceived => "headers_received",
        }
    }
}

/// Type-erased payload delivered alongside a [`Signal`].
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Implemented by async signal handlers registered via [`SignalBus::connect`].
#[async_trait]
pub trait Handler: Send + Sync {
    /// Invoked for each matching, delivered signal.
    async fn handle(&self, sender: SenderId, payload: &Payload);
}

#[async_trait]
impl<F> Handler for F
where
    F: Fn(SenderId, &Payload) + Send + Sync,
{
    async fn handle(&self, sender: SenderId, payload: &Payload) {
        self(sender, payload);
    }
}

struct Registration {
    id: u64,
    priority: i32,
    sender_filter: Option<SenderId>,
    handler: Arc<dyn Handler>,
}

#[derive(Default)]
struct Inner {
    handlers: Mutex<HashMap<Signal, Vec<Registration>>>,
}

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Central registry of signal handlers and dispatcher of emitted signals.
#[derive(Clone, Default)]
pub struct SignalBus {
    inner: Arc<Inner>,
}

impl SignalBus {
    /// Creates an empty bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `signal`. Handlers with a higher `priority` run
    /// first; `sender` restricts delivery to events emitted for that sender.
    ///
    /// Returns a [`Subscription`] that unregisters the handler when dropped or
    /// explicitly [`unsubscribe`](Subscription::unsubscribe)d.
    pub fn connect(
        &self,
        signal: Signal,
        priority: i32,
        sender: Option<SenderId>,
        handler: impl Handler + 'static,
    ) -> Subscription {
        let id = NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed);
        let mut handlers = self.inner.handlers.lock().expect("signal bus lock poisoned");
        let list = handlers.entry(signal).or_default();
        list.push(Registration { id, priority, sender_filter: sender, handler: Arc::new(handler) });
        list.sort_by(|a, b| b.priority.cmp(&a.priority));
        drop(handlers);
        Subscription { inner: Arc::downgrade(&self.inner), signal, id, active: true }
    }

    /// Returns a [`SignalDispatcher`] that defaults `sender` to `sender` on every call.
    #[must_use]
    pub fn for_sender(&self, sender: SenderId) -> SignalDispatcher {
        SignalDispatcher { bus: self.clone(), sender }
    }

    /// Emits `signal` sequentially, in priority order, to handlers matching `sender`.
    ///
    /// Handler panics are not caught; handlers are expected to be infallible or
    /// to report failures through their own side channel (e.g. logging).
    pub async fn emit(&self, signal: Signal, sender: SenderId, payload: Payload) {
        for handler in self.collect(signal, sender) {
            handler.handle(sender, &payload).await;
        }
    }

    /// Emits `signal` concurrently to all matching handlers, optionally bounding
    /// the number of handlers running at once via `max_concurrency`.
    pub async fn emit_concurrent(
        &self,
        signal: Signal,
        sender: SenderId,
        payload: Payload,
        max_concurrency: Option<usize>,
    ) {
        let handlers = self.collect(signal, sender);
        if handlers.is_empty() {
            return;
        }
        let sem = max_concurrency.map(|n| Arc::new(Semaphore::new(n.max(1))));
        let mut tasks = Vec::with_capacity(handlers.len());
        for handler in handlers {
            let payload = payload.clone();
            let sem = sem.clone();
            tasks.push(async move {
                let _permit = match &sem {
                    Some(sem) => Some(sem.acquire().await.expect("semaphore closed")),
                    None => None,
                };
                handler.handle(sender, &payload).await;
            });
        }
        futures::future::join_all(tasks).await;
    }

    fn collect(&self, signal: Signal, sender: SenderId) -> Vec<Arc<dyn Handler>> {
        let handlers = self.inner.handlers.lock().expect("signal bus lock poisoned");
        handlers
            .get(&signal)
            .into_iter()
            .flatten()
            .filter(|r| r.sender_filter.map_or(true, |f| f == sender))
            .map(|r| r.handler.clone())
            .collect()
    }

    fn unsubscribe(&self, signal: Signal, id: u64) {
        let mut handlers = self.inner.handlers.lock().expect("signal bus lock poisoned");
        if let Some(list) = handlers.get_mut(&signal) {
            list.retain(|r| r.id != id);
        }
    }
}

/// Sender-bound proxy over a [`SignalBus`], reducing boilerplate for a single
/// component (scheduler, downloader, spider, ...) that always emits as itself.
#[derive(Clone)]
pub struct SignalDispatcher {
    bus: SignalBus,
    sender: SenderId,
}

impl SignalDispatcher {
    /// Returns the bound sender identity.
    #[must_use]
    pub fn sender(&self) -> SenderId {
        self.sender
    }

    /// Registers `handler` for `signal`, filtered to this dispatcher's sender
    /// unless `sender` overrides it.
    pub fn connect(
        &self,
        signal: Signal,
        priority: i32,
        sender: Option<SenderId>,
        handler: impl Handler + 'static,
    ) -> Subscription {
        self.bus.connect(signal, priority, Some(sender.unwrap_or(self.sender)), handler)
    }

    /// Emits `signal` as this dispatcher's sender.
    pub async fn emit(&self, signal: Signal, payload: Payload) {
        self.bus.emit(signal, self.sender, payload).await;
    }

    /// Emits `signal` concurrently as this dispatcher's sender.
    pub async fn emit_concurrent(&self, signal: Signal, payload: Payload, max_concurrency: Option<usize>) {
        self.bus.emit_concurrent(signal, self.sender, payload, max_concurrency).await;
    }
}

/// Scope guard returned by [`SignalBus::connect`]; unregisters the handler on
/// drop or on an explicit [`unsubscribe`](Subscription::unsubscribe) call.
#[must_use = "dropping a Subscription immediately unsubscribes the handler"]
pub struct Subscription {
    inner: std::sync::Weak<Inner>,
    signal: Signal,
    id: u64,
    active: bool,
}

impl Subscription {
    /// Unregisters the handler immediately.
    pub fn unsubscribe(mut self) {
        self.remove();
    }

    fn remove(&mut self) {
        if !self.active {
            return;
        }
        self.active = false;
        if let Some(inner) = self.inner.upgrade() {
            let bus = SignalBus { inner };
            bus.unsubscribe(self.signal, self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn delivers_to_connected_handler() {
        let bus = SignalBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let _sub = bus.connect(Signal::ItemScraped, 0, None, move |_sender: SenderId, _payload: &Payload| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Signal::ItemScraped, SenderId::new(), Arc::new(())).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn drop_unsubscribes() {
        let bus = SignalBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let sub = bus.connect(Signal::ItemScraped, 0, None, move |_s: SenderId, _p: &Payload| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        drop(sub);
        bus.emit(Signal::ItemScraped, SenderId::new(), Arc::new(())).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn sender_filter_restricts_delivery() {
        let bus = SignalBus::new();
        let target = SenderId::new();
        let other = SenderId::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let _sub = bus.connect(Signal::SpiderIdle, 0, Some(target), move |_s: SenderId, _p: &Payload| {
            count2.fetch_add(1, Ordering::SeqCst);
        });
        bus.emit(Signal::SpiderIdle, other, Arc::new(())).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        bus.emit(Signal::SpiderIdle, target, Arc::new(())).await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn higher_priority_runs_first() {
        let bus = SignalBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        let o2 = order.clone();
        let _low = bus.connect(Signal::SpiderOpened, 0, None, move |_s: SenderId, _p: &Payload| {
            o1.lock().unwrap().push("low");
        });
        let _high = bus.connect(Signal::SpiderOpened, 10, None, move |_s: SenderId, _p: &Payload| {
            o2.lock().unwrap().push("high");
        });
        bus.emit(Signal::SpiderOpened, SenderId::new(), Arc::new(())).await;
        assert_eq!(*order.lock().unwrap(), vec!["high", "low"]);
    }
}
