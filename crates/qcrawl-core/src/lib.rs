//! Core types and traits shared by the qcrawl web crawling framework:
//! requests, responses, items, fingerprinting, the request queue/scheduler,
//! and the lifecycle signal bus.

#![forbid(unsafe_code)]

pub mod error;
pub mod fingerprint;
pub mod item;
pub mod queue;
pub mod request;
pub mod response;
pub mod scheduler;
pub mod signal;
pub mod spider_info;
pub mod url;

pub use error::{BoxError, Error, ErrorKind, Result};
pub use item::Item;
pub use request::Request;
pub use response::Response;

/// Re-exports for glob-importing the common surface of this crate.
pub mod prelude {
    pub use crate::error::{BoxError, Error, ErrorKind, Result};
    pub use crate::fingerprint::{Fingerprint, Fingerprinter};
    pub use crate::item::Item;
    pub use crate::queue::{MemoryQueue, RequestQueue};
    pub use crate::request::Request;
    pub use crate::response::Response;
    pub use crate::scheduler::Scheduler;
    pub use crate::signal::{Payload, SenderId, Signal, SignalBus, SignalDispatcher};
    pub use crate::spider_info::SpiderInfo;
}
