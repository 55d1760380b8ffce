//! Spider middleware: wraps the async streams a spider produces and consumes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use qcrawl_core::error::Error;
use qcrawl_core::item::Item;
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;

/// One value yielded by a spider's `parse` callback.
#[derive(Debug)]
pub enum ParseOutcome {
    /// A scraped record.
    Item(Item),
    /// A follow-up request to schedule.
    Request(Request),
    /// A bare URL to schedule with default priority/depth inheritance.
    Url(String),
}

/// A stream of [`Request`]s, e.g. a spider's `start_requests`.
pub type RequestStream = BoxStream<'static, Request>;

/// A stream of [`ParseOutcome`]s, e.g. a spider's `parse` output.
///
/// Items are fallible: a spider that fails partway through parsing a
/// response yields an `Err`, which the engine routes to
/// [`SpiderMiddleware::process_spider_exception`] instead of treating it as
/// a scraped outcome.
pub type ParseStream = BoxStream<'static, Result<ParseOutcome, Error>>;

/// Wraps the streams a spider produces/consumes at each lifecycle phase.
///
/// Every hook defaults to a passthrough, matching the "return `None` means
/// unchanged" convention of the reference implementation this chain is
/// modeled on, expressed here as returning the input stream unmodified.
#[async_trait]
pub trait SpiderMiddleware: Send + Sync {
    /// Transforms the spider's initial `start_requests` stream.
    async fn process_start_requests(&self, requests: RequestStream, _spider: &SpiderInfo) -> RequestStream {
        requests
    }

    /// Inspects a response immediately before it is handed to `parse`.
    ///
    /// Returning `Some(error)` short-circuits parsing and routes `error` to
    /// the exception-handling path instead.
    async fn process_spider_input(&self, _response: &Response, _spider: &SpiderInfo) -> Option<Error> {
        None
    }

    /// Transforms the stream produced by a spider's `parse` call.
    async fn process_spider_output(&self, _response: &Response, output: ParseStream, _spider: &SpiderInfo) -> ParseStream {
        output
    }

    /// Handles an exception raised while draining a spider's `parse` stream.
    ///
    /// Returning `Some(stream)` supplies a recovery stream that replaces the
    /// failed one; `None` defers to the next middleware (or to the engine's
    /// default exception handling if none handle it).
    async fn process_spider_exception(&self, _response: &Response, _error: &Error, _spider: &SpiderInfo) -> Option<ParseStream> {
        None
    }

    /// Called once when the spider this middleware is attached to opens.
    async fn open_spider(&self, _spider: &SpiderInfo) {}

    /// Called once when the spider this middleware is attached to closes.
    async fn close_spider(&self, _spider: &SpiderInfo) {}
}
