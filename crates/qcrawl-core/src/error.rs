use std::convert::Infallible;
use std::{fmt, io};

/// Type alias for a type-erased [`std::error::Error`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Convenience alias for `Result<T, Error>`.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Category of failure that occurred somewhere in the crawl pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or unreachable URL.
    Url,
    /// Fingerprinting failures (conflicting configuration, hashing).
    Fingerprint,
    /// Request queue errors (closed queue, negative capacity).
    Queue,
    /// Scheduler-level errors.
    Scheduler,
    /// Download handler routing or I/O failures.
    Handler,
    /// Downloader or spider middleware failures.
    Middleware,
    /// Spider parse-callback failures.
    Spider,
    /// Settings resolution errors.
    Settings,
    /// I/O errors (file system, network).
    Io,
    /// Operation timed out.
    Timeout,
    /// Other unclassified errors.
    Other,
}

impl ErrorKind {
    /// Returns a string representation of the error kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Url => "url",
            Self::Fingerprint => "fingerprint",
            Self::Queue => "queue",
            Self::Scheduler => "scheduler",
            Self::Handler => "handler",
            Self::Middleware => "middleware",
            Self::Spider => "spider",
            Self::Settings => "settings",
            Self::Io => "io",
            Self::Timeout => "timeout",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carrying a [`ErrorKind`], a message, and an optional source.
#[must_use]
#[derive(thiserror::Error)]
pub struct Error {
    kind: ErrorKind,
    message: String,
    #[source]
    source: Option<BoxError>,
}

impl Error {
    /// Creates a new [`Error`] with the given kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), source: None }
    }

    /// Creates a new [`Error`] with the given kind, message, and source error.
    pub fn with_source(kind: ErrorKind, message: impl Into<String>, source: BoxError) -> Self {
        Self { kind, message: message.into(), source: Some(source) }
    }

    /// Wraps a boxable error, inferring a kind from its `Display` text on a best-effort basis.
    pub fn from_boxed(error: impl Into<BoxError>) -> Self {
        let boxed = error.into();
        let message = boxed.to_string();
        let lower = message.to_ascii_lowercase();

        let kind = if lower.contains("timeout") || lower.contains("timed out") {
            ErrorKind::Timeout
        } else if lower.contains("url") {
            ErrorKind::Url
        } else if lower.contains("io") || lower.contains("file") || lower.contains("connect") {
            ErrorKind::Io
        } else {
            ErrorKind::Other
        };

        Self { kind, message, source: Some(boxed) }
    }

    /// Returns the error kind.
    #[inline]
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the error message, without the source chain.
    #[inline]
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("Error");
        debug.field("kind", &self.kind).field("message", &self.message);
        if let Some(ref source) = self.source {
            debug.field("source", source);
        }
        debug.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.message)
    }
}

impl From<BoxError> for Error {
    #[inline]
    fn from(value: BoxError) -> Self {
        Self::from_boxed(value)
    }
}

impl From<Infallible> for Error {
    #[inline]
    fn from(_: Infallible) -> Self {
        unreachable!()
    }
}

impl From<http::Error> for Error {
    #[inline]
    fn from(error: http::Error) -> Self {
        Self::with_source(ErrorKind::Url, "malformed HTTP request", Box::new(error))
    }
}

impl From<http::uri::InvalidUri> for Error {
    #[inline]
    fn from(error: http::uri::InvalidUri) -> Self {
        Self::with_source(ErrorKind::Url, "invalid URL", Box::new(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::with_source(ErrorKind::Io, "I/O error", Box::new(error))
    }
}

impl From<serde_json::Error> for Error {
    #[inline]
    fn from(error: serde_json::Error) -> Self {
        Self::with_source(ErrorKind::Other, "(de)serialization error", Box::new(error))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn display_includes_kind() {
        let err = Error::new(ErrorKind::Scheduler, "queue closed");
        assert_eq!(err.to_string(), "[scheduler] queue closed");
    }

    #[test]
    fn from_boxed_infers_timeout() {
        let io_err = io::Error::new(io::ErrorKind::TimedOut, "timed out");
        let err = Error::from_boxed(Box::new(io_err) as BoxError);
        assert_eq!(err.kind(), ErrorKind::Timeout);
    }
}
