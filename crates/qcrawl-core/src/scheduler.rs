//! Request scheduler: deduplication, priority ordering, and direct handoff to
//! waiting consumers.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::{oneshot, Mutex, Notify};

use crate::fingerprint::Fingerprinter;
use crate::queue::RequestQueue;
use crate::request::Request;
use crate::signal::{Payload, Signal, SignalBus, SignalDispatcher};
use crate::Result;

struct State {
    seen: HashSet<Vec<u8>>,
    waiters: VecDeque<oneshot::Sender<Request>>,
    closed: bool,
    pending: u64,
}

/// Coordinates request intake (with fingerprint-based deduplication), priority
/// ordering via a backing [`RequestQueue`], and direct handoff to idle workers.
pub struct Scheduler {
    queue: Arc<dyn RequestQueue>,
    fingerprinter: Fingerprinter,
    state: Mutex<State>,
    finished: Notify,
    pub signals: SignalDispatcher,
}

impl Scheduler {
    /// Creates a scheduler over `queue`, deduplicating via `fingerprinter` and
    /// emitting lifecycle signals on `bus`.
    #[must_use]
    pub fn new(queue: Arc<dyn RequestQueue>, fingerprinter: Fingerprinter, bus: &SignalBus) -> Self {
        let signals = bus.for_sender(crate::signal::SenderId::new());
        Self {
            queue,
            fingerprinter,
            state: Mutex::new(State {
                seen: HashSet::new(),
                waiters: VecDeque::new(),
                closed: false,
                pending: 0,
            }),
            finished: Notify::new(),
            signals,
        }
    }

    /// Adds `request` to the scheduler, idempotently.
    ///
    /// Deduplicates by fingerprint, hands off directly to the oldest idle
    /// [`get`](Scheduler::get) caller if one is waiting, otherwise enqueues
    /// through the backing [`RequestQueue`]. A no-op once [`close`](Scheduler::close)d
    /// or if an identical in-flight request has already been seen this run.
    ///
    /// If the backing queue is bounded and full, the request is dropped and its
    /// fingerprint is released from the seen-set, so a later retry is not
    /// silently swallowed by deduplication.
    pub async fn add(&self, request: Request) -> Result<()> {
        let fp = self.fingerprinter.fingerprint_bytes(&request)?;

        let mut state = self.state.lock().await;
        if state.closed {
            return Ok(());
        }
        if state.seen.contains(&fp) {
            return Ok(());
        }
        state.seen.insert(fp.clone());
        state.pending += 1;

        let mut delivered = None;
        while let Some(waiter) = state.waiters.pop_front() {
            match waiter.send(request.clone_for_delivery()) {
                Ok(()) => {
                    delivered = Some(());
                    break;
                }
                Err(_returned) => continue,
            }
        }
        drop(state);

        self.signals
            .emit(Signal::RequestScheduled, Arc::new(request.clone_for_delivery()) as Payload)
            .await;

        if delivered.is_some() {
            return Ok(());
        }

        let capacity = self.queue.maxsize();
        if capacity > 0 && self.queue.size().await >= capacity {
            self.drop_pending(&fp).await;
            self.signals.emit(Signal::RequestDropped, Arc::new(request) as Payload).await;
            return Ok(());
        }

        self.queue.put(request).await?;
        Ok(())
    }

    async fn drop_pending(&self, fp: &[u8]) {
        let mut state = self.state.lock().await;
        state.pending -= 1;
        state.seen.remove(fp);
        if state.pending == 0 {
            self.finished.notify_waiters();
        }
    }

    /// Awaits and returns the next scheduled request, or `None` once the
    /// scheduler is closed and both the queue and waiter list are empty.
    ///
    /// Registers as both a direct-handoff waiter and a queue consumer and
    /// races the two: a request that lands in the queue (rather than being
    /// handed off directly) between the initial empty-check and the waiter
    /// registration would otherwise park this call forever, since nothing
    /// but a *future* direct handoff would ever complete the oneshot.
    pub async fn get(&self) -> Option<Request> {
        {
            let state = self.state.lock().await;
            if state.closed && self.queue.size().await == 0 {
                return None;
            }
        }

        if self.queue.size().await > 0 {
            if let Some(req) = self.queue.get().await {
                return Some(req);
            }
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut state = self.state.lock().await;
            state.waiters.push_back(tx);
        }

        tokio::select! {
            handoff = rx => handoff.ok(),
            queued = self.queue.get() => queued,
        }
    }

    /// Marks one request retrieved via [`get`](Scheduler::get) as fully processed.
    ///
    /// # Panics
    ///
    /// Panics if called more times than [`get`](Scheduler::get) has returned a request.
    pub async fn task_done(&self) {
        let mut state = self.state.lock().await;
        assert!(state.pending > 0, "task_done() called too many times");
        state.pending -= 1;
        if state.pending == 0 {
            self.finished.notify_waiters();
        }
    }

    /// Waits until all work added via [`add`](Scheduler::add) has been marked
    /// done via [`task_done`](Scheduler::task_done).
    pub async fn join(&self) {
        loop {
            // Must be created before the `pending` check: `notify_waiters`
            // stores no permit, so a `task_done` landing in the gap between
            // checking `pending` and awaiting `notified()` would otherwise be
            // missed entirely and `join` would block forever.
            let notified = self.finished.notified();
            {
                let state = self.state.lock().await;
                if state.pending == 0 {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Returns the number of requests queued (excludes in-flight/pending work).
    pub async fn qsize(&self) -> usize {
        self.queue.size().await
    }

    /// Returns the number of requests retrieved but not yet marked done.
    pub async fn pending(&self) -> u64 {
        self.state.lock().await.pending
    }

    /// Closes the scheduler: further [`add`](Scheduler::add) calls are no-ops,
    /// waiting [`get`](Scheduler::get) callers are released with `None`, and the
    /// backing queue is closed. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        while let Some(waiter) = state.waiters.pop_front() {
            drop(waiter);
        }
        drop(state);
        self.queue.close().await;
    }
}

impl Request {
    fn clone_for_delivery(&self) -> Request {
        self.clone()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::queue::MemoryQueue;

    fn scheduler(maxsize: i64) -> Scheduler {
        let queue = Arc::new(MemoryQueue::new(maxsize).unwrap());
        Scheduler::new(queue, Fingerprinter::new(), &SignalBus::new())
    }

    #[tokio::test]
    async fn dedups_identical_requests() {
        let s = scheduler(0);
        s.add(Request::get("https://example.com/a").unwrap()).await.unwrap();
        s.add(Request::get("https://example.com/a").unwrap()).await.unwrap();
        assert_eq!(s.qsize().await, 1);
        assert_eq!(s.pending().await, 1);
    }

    #[tokio::test]
    async fn direct_handoff_to_waiting_consumer() {
        let s = Arc::new(scheduler(0));
        let s2 = s.clone();
        let handle = tokio::spawn(async move { s2.get().await });
        tokio::task::yield_now().await;
        s.add(Request::get("https://example.com/a").unwrap()).await.unwrap();
        let got = handle.await.unwrap().unwrap();
        assert_eq!(got.url(), "https://example.com/a");
        assert_eq!(s.qsize().await, 0);
    }

    #[tokio::test]
    async fn join_waits_for_task_done() {
        let s = scheduler(0);
        s.add(Request::get("https://example.com/a").unwrap()).await.unwrap();
        let req = s.get().await.unwrap();
        let s = Arc::new(s);
        let s2 = s.clone();
        let handle = tokio::spawn(async move { s2.join().await });
        tokio::task::yield_now().await;
        drop(req);
        s.task_done().await;
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn close_releases_waiters_with_none() {
        let s = Arc::new(scheduler(0));
        let s2 = s.clone();
        let handle = tokio::spawn(async move { s2.get().await });
        tokio::task::yield_now().await;
        s.close().await;
        assert!(handle.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn full_queue_drops_request_and_releases_fingerprint() {
        let s = scheduler(1);
        s.add(Request::get("https://example.com/a").unwrap()).await.unwrap();
        // Queue now holds 1 item (capacity 1); a second distinct request is dropped.
        s.add(Request::get("https://example.com/b").unwrap()).await.unwrap();
        assert_eq!(s.qsize().await, 1);
        // Because the fingerprint was released, re-adding the dropped URL is accepted again.
        s.add(Request::get("https://example.com/b").unwrap()).await.unwrap();
        // Still only 1 slot available; it's dropped again rather than growing unbounded.
        assert_eq!(s.qsize().await, 1);
    }
}
