//! Pluggable, priority-ordered [`Request`] queues.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify, Semaphore};

use crate::error::{Error, ErrorKind};
use crate::request::Request;
use crate::Result;

/// An asynchronous, priority-ordered queue of [`Request`]s.
///
/// Implementations back the [`crate::scheduler::Scheduler`]'s request backlog.
/// `get` returns `None` once the queue has been [`close`](RequestQueue::close)d
/// and fully drained, mirroring the end of an async stream rather than using an
/// error for a routine shutdown signal.
#[async_trait]
pub trait RequestQueue: Send + Sync {
    /// Enqueues `request`. A no-op once the queue is closed.
    async fn put(&self, request: Request) -> Result<()>;

    /// Awaits and returns the next request in priority order, or `None` once
    /// the queue is closed and empty.
    async fn get(&self) -> Option<Request>;

    /// Returns the number of items currently queued.
    async fn size(&self) -> usize;

    /// Returns the maximum capacity, or `0` for unbounded.
    fn maxsize(&self) -> usize;

    /// Drains all queued items without closing the queue.
    async fn clear(&self);

    /// Marks the queue closed: further `put`s are no-ops and `get` returns
    /// `None` once drained.
    async fn close(&self);

    /// Returns whether [`close`](RequestQueue::close) has been called.
    fn is_closed(&self) -> bool;
}

struct Entry {
    priority: i64,
    seq: u64,
    request: Request,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse so lower `priority` and earlier
        // `seq` (FIFO tie-break) pop first.
        other.priority.cmp(&self.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

struct State {
    heap: BinaryHeap<Entry>,
    counter: u64,
    closed: bool,
}

/// In-memory [`RequestQueue`] backed by a binary heap.
///
/// Mirrors `(priority, monotonic_counter, request)` tuple semantics: equal
/// priorities are served first-in-first-out.
pub struct MemoryQueue {
    state: Mutex<State>,
    capacity: Option<Semaphore>,
    maxsize: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl MemoryQueue {
    /// Creates a queue with the given `maxsize` (`0` means unbounded).
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Queue`] if `maxsize` is negative.
    pub fn new(maxsize: i64) -> Result<Self> {
        if maxsize < 0 {
            return Err(Error::new(ErrorKind::Queue, "maxsize must be >= 0"));
        }
        let capacity = (maxsize > 0).then(|| Semaphore::new(maxsize as usize));
        Ok(Self {
            state: Mutex::new(State { heap: BinaryHeap::new(), counter: 0, closed: false }),
            capacity,
            maxsize: maxsize as usize,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        })
    }

    /// Creates an unbounded queue.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(0).expect("0 is always a valid maxsize")
    }

    /// Enqueues `request` with an explicit priority, bypassing [`Request::priority`].
    pub async fn put_with_priority(&self, request: Request, priority: i64) -> Result<()> {
        if self.is_closed() {
            return Ok(());
        }
        if let Some(sem) = &self.capacity {
            let permit = sem.acquire().await.map_err(|e| {
                Error::with_source(ErrorKind::Queue, "queue semaphore closed", Box::new(e))
            })?;
            permit.forget();
        }
        let mut state = self.state.lock().await;
        let seq = state.counter;
        state.counter += 1;
        state.heap.push(Entry { priority, seq, request });
        drop(state);
        self.not_empty.notify_one();
        Ok(())
    }
}

#[async_trait]
impl RequestQueue for MemoryQueue {
    async fn put(&self, request: Request) -> Result<()> {
        let priority = request.priority();
        self.put_with_priority(request, priority).await
    }

    async fn get(&self) -> Option<Request> {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some(entry) = state.heap.pop() {
                    drop(state);
                    if let Some(sem) = &self.capacity {
                        sem.add_permits(1);
                    }
                    self.not_full.notify_one();
                    return Some(entry.request);
                }
                if state.closed {
                    return None;
                }
            }
            self.not_empty.notified().await;
        }
    }

    async fn size(&self) -> usize {
        self.state.lock().await.heap.len()
    }

    fn maxsize(&self) -> usize {
        self.maxsize
    }

    async fn clear(&self) {
        let mut state = self.state.lock().await;
        let drained = state.heap.len();
        state.heap.clear();
        drop(state);
        if let Some(sem) = &self.capacity {
            sem.add_permits(drained);
        }
        self.not_full.notify_waiters();
    }

    async fn close(&self) {
        let mut state = self.state.lock().await;
        state.closed = true;
        drop(state);
        self.not_empty.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        // Best-effort, lock-free peek; `try_lock` never blocks the caller.
        self.state.try_lock().map(|s| s.closed).unwrap_or(false)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::request::Request;

    #[tokio::test]
    async fn lower_priority_number_served_first() {
        let q = MemoryQueue::unbounded();
        q.put(Request::get("https://example.com/low").unwrap().with_priority(5)).await.unwrap();
        q.put(Request::get("https://example.com/high").unwrap().with_priority(-5)).await.unwrap();
        let first = q.get().await.unwrap();
        assert_eq!(first.url(), "https://example.com/high");
    }

    #[tokio::test]
    async fn equal_priority_is_fifo() {
        let q = MemoryQueue::unbounded();
        q.put(Request::get("https://example.com/a").unwrap()).await.unwrap();
        q.put(Request::get("https://example.com/b").unwrap()).await.unwrap();
        assert_eq!(q.get().await.unwrap().url(), "https://example.com/a");
        assert_eq!(q.get().await.unwrap().url(), "https://example.com/b");
    }

    #[test]
    fn negative_maxsize_is_an_error() {
        assert!(MemoryQueue::new(-1).is_err());
    }

    #[tokio::test]
    async fn closed_empty_queue_yields_none() {
        let q = MemoryQueue::unbounded();
        q.close().await;
        assert!(q.get().await.is_none());
    }

    #[tokio::test]
    async fn closed_queue_drains_before_yielding_none() {
        let q = MemoryQueue::unbounded();
        q.put(Request::get("https://example.com").unwrap()).await.unwrap();
        q.close().await;
        assert!(q.get().await.is_some());
        assert!(q.get().await.is_none());
    }

    #[tokio::test]
    async fn put_after_close_is_a_noop() {
        let q = MemoryQueue::unbounded();
        q.close().await;
        q.put(Request::get("https://example.com").unwrap()).await.unwrap();
        assert_eq!(q.size().await, 0);
    }
}
