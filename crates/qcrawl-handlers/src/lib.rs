//! Download handler routing for the qcrawl web crawling framework.
//!
//! A [`Handler`] owns one protocol's fetch logic; a [`HandlerRouter`] picks
//! which handler a given request should use and lazily instantiates it.

#![forbid(unsafe_code)]

pub mod handler;
pub mod router;

pub use handler::{Handler, DEFAULT_TIMEOUT};
pub use router::{HandlerFactory, HandlerRouter};

/// Re-exports for glob-importing the common surface of this crate.
pub mod prelude {
    pub use crate::handler::{Handler, DEFAULT_TIMEOUT};
    pub use crate::router::{HandlerFactory, HandlerRouter};
}
