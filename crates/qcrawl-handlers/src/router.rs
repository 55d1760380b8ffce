//! Routes requests to a named [`Handler`], instantiating handlers lazily.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use qcrawl_core::error::{Error, ErrorKind, Result};
use qcrawl_core::request::Request;
use qcrawl_core::response::Response;
use qcrawl_core::spider_info::SpiderInfo;
use tokio::sync::Mutex;

use crate::handler::{Handler, DEFAULT_TIMEOUT};

/// Builds a [`Handler`] on first use.
///
/// A factory rather than a dotted-path string: there is no runtime class
/// loading in Rust, so handlers are registered by closure instead of by
/// name lookup into a module path.
pub type HandlerFactory = Arc<dyn Fn() -> Arc<dyn Handler> + Send + Sync>;

/// Routes requests to the handler registered under a name, creating and
/// caching handler instances on first use.
///
/// Routing priority, checked in order:
/// 1. [`Request::use_handler`] — an explicit name set in request metadata.
/// 2. The request URL's scheme, if a handler is registered under that name.
/// 3. The handler registered as `"http"`.
/// 4. Whatever handler was registered first.
///
/// If no handlers are registered at all, routing fails.
pub struct HandlerRouter {
    factories: HashMap<String, HandlerFactory>,
    registration_order: Vec<String>,
    handlers: Mutex<HashMap<String, Arc<dyn Handler>>>,
    closed: Mutex<bool>,
}

impl HandlerRouter {
    /// Creates a router with no handlers registered.
    #[must_use]
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            registration_order: Vec::new(),
            handlers: Mutex::new(HashMap::new()),
            closed: Mutex::new(false),
        }
    }

    /// Registers a handler factory under `name`. Later registrations under
    /// the same name replace earlier ones.
    pub fn register(&mut self, name: impl Into<String>, factory: impl Fn() -> Arc<dyn Handler> + Send + Sync + 'static) -> &mut Self {
        let name = name.into();
        if !self.factories.contains_key(&name) {
            self.registration_order.push(name.clone());
        }
        self.factories.insert(name, Arc::new(factory));
        self
    }

    /// Fetches `request` by routing it to the appropriate handler, creating
    /// that handler on first use.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Handler`] if the router is closed, no handler
    /// could be selected, or the selected handler's `fetch` fails.
    pub async fn fetch(&self, request: &Request, spider: &SpiderInfo, timeout: Option<Duration>) -> Result<Response> {
        if *self.closed.lock().await {
            return Err(Error::new(ErrorKind::Handler, "cannot fetch: handler router is closed"));
        }

        let handler_name = self.select_handler(request)?;
        let handler = self.get_or_create_handler(&handler_name).await?;
        handler
            .fetch(request, spider, timeout.unwrap_or(DEFAULT_TIMEOUT))
            .await
            .map_err(|err| Error::with_source(ErrorKind::Handler, format!("handler {handler_name:?} failed for {}", request.url()), Box::new(err)))
    }

    fn select_handler(&self, request: &Request) -> Result<String> {
        if let Some(name) = request.use_handler() {
            if self.factories.contains_key(name) {
                return Ok(name.to_string());
            }
        }

        if let Some(scheme) = scheme_of(request.url()) {
            if self.factories.contains_key(scheme.as_str()) {
                return Ok(scheme);
            }
        }

        if self.factories.contains_key("http") {
            return Ok("http".to_string());
        }

        self.registration_order
            .first()
            .cloned()
            .ok_or_else(|| Error::new(ErrorKind::Handler, "no download handlers registered"))
    }

    async fn get_or_create_handler(&self, name: &str) -> Result<Arc<dyn Handler>> {
        let mut handlers = self.handlers.lock().await;
        if let Some(handler) = handlers.get(name) {
            return Ok(handler.clone());
        }

        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::new(ErrorKind::Handler, format!("handler {name:?} not registered")))?;
        let handler = factory();
        handlers.insert(name.to_string(), handler.clone());
        Ok(handler)
    }

    /// Closes every handler created so far. Idempotent; safe to call more
    /// than once or concurrently.
    pub async fn close(&self) {
        let mut closed = self.closed.lock().await;
        if *closed {
            return;
        }
        *closed = true;

        let handlers = self.handlers.lock().await;
        for handler in handlers.values() {
            handler.close().await;
        }
    }

    /// Returns whether [`HandlerRouter::close`] has been called.
    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

impl Default for HandlerRouter {
    fn default() -> Self {
        Self::new()
    }
}

fn scheme_of(url: &str) -> Option<String> {
    url.split_once("://").map(|(scheme, _)| scheme.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct Echo(Arc<AtomicUsize>);

    #[async_trait]
    impl Handler for Echo {
        async fn fetch(&self, request: &Request, _spider: &SpiderInfo, _timeout: Duration) -> Result<Response> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(Response::new(request.url(), http::StatusCode::OK, Vec::new()))
        }
    }

    fn spider() -> SpiderInfo {
        SpiderInfo::new("test")
    }

    #[tokio::test]
    async fn routes_by_scheme_and_caches_instance() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut router = HandlerRouter::new();
        let counter = calls.clone();
        router.register("http", move || Arc::new(Echo(counter.clone())) as Arc<dyn Handler>);

        let req = Request::get("https://example.com").unwrap();
        router.fetch(&req, &spider(), None).await.unwrap_err();
        // No "https" handler registered and no "http" fallback applies only
        // when present; register https explicitly for this case instead.
        let mut router = HandlerRouter::new();
        let counter = calls.clone();
        router.register("https", move || Arc::new(Echo(counter.clone())) as Arc<dyn Handler>);
        router.fetch(&req, &spider(), None).await.unwrap();
        router.fetch(&req, &spider(), None).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn explicit_use_handler_overrides_scheme() {
        let mut router = HandlerRouter::new();
        router.register("http", || Arc::new(Echo(Arc::new(AtomicUsize::new(0)))) as Arc<dyn Handler>);
        router.register("custom", || Arc::new(Echo(Arc::new(AtomicUsize::new(0)))) as Arc<dyn Handler>);

        let req = Request::get("https://example.com").unwrap().with_meta("use_handler", "custom");
        let name = router.select_handler(&req).unwrap();
        assert_eq!(name, "custom");
    }

    #[tokio::test]
    async fn falls_back_to_http_then_first_registered() {
        let mut router = HandlerRouter::new();
        router.register("ftp", || Arc::new(Echo(Arc::new(AtomicUsize::new(0)))) as Arc<dyn Handler>);
        let req = Request::get("https://example.com").unwrap();
        assert_eq!(router.select_handler(&req).unwrap(), "ftp");

        router.register("http", || Arc::new(Echo(Arc::new(AtomicUsize::new(0)))) as Arc<dyn Handler>);
        assert_eq!(router.select_handler(&req).unwrap(), "http");
    }

    #[tokio::test]
    async fn fetch_after_close_fails() {
        let mut router = HandlerRouter::new();
        router.register("http", || Arc::new(Echo(Arc::new(AtomicUsize::new(0)))) as Arc<dyn Handler>);
        router.close().await;
        router.close().await; // idempotent
        let req = Request::get("https://example.com").unwrap();
        let err = router.fetch(&req, &spider(), None).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Handler);
    }

    #[tokio::test]
    async fn no_handlers_registered_fails_selection() {
        let router = HandlerRouter::new();
        let req = Request::get("https://example.com").unwrap();
        let err = router.select_handler(&req).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Handler);
    }
}
