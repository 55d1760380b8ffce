//! Request fingerprinting for in-run deduplication.
//!
//! A fingerprint is the BLAKE2b(16-byte) digest of `method \x00 normalized-url
//! [\x00 body]`, matching the scheduler's notion of "the same request".

use std::collections::BTreeSet;

use blake2::Blake2bVar;
use digest::{Update, VariableOutput};
use url::Url;

use crate::error::{Error, ErrorKind};
use crate::request::Request;
use crate::Result;

/// Number of bytes in a canonical [`Fingerprint`].
pub const DIGEST_SIZE: usize = 16;

/// A 16-byte BLAKE2b digest uniquely identifying a [`Request`] for deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; DIGEST_SIZE]);

impl Fingerprint {
    /// Returns the raw digest bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; DIGEST_SIZE] {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Computes [`Fingerprint`]s for requests, with optional query-string filtering.
///
/// `ignore_query_params` and `keep_query_params` are mutually exclusive: the
/// former drops the named params before hashing, the latter keeps only them.
#[derive(Debug, Clone, Default)]
pub struct Fingerprinter {
    ignore_query_params: BTreeSet<String>,
    keep_query_params: BTreeSet<String>,
}

impl Fingerprinter {
    /// Creates a fingerprinter with no query-string filtering.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fingerprinter that drops the named query parameters before hashing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Fingerprint`] if a `keep_query_params` filter was
    /// already configured; the two modes are mutually exclusive.
    pub fn with_ignored_query_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        if !self.keep_query_params.is_empty() {
            return Err(Error::new(
                ErrorKind::Fingerprint,
                "cannot combine ignore_query_params with keep_query_params",
            ));
        }
        self.ignore_query_params.extend(params.into_iter().map(Into::into));
        Ok(self)
    }

    /// Builds a fingerprinter that keeps only the named query parameters before hashing.
    ///
    /// # Errors
    ///
    /// Returns [`ErrorKind::Fingerprint`] if an `ignore_query_params` filter was
    /// already configured; the two modes are mutually exclusive.
    pub fn with_kept_query_params(mut self, params: impl IntoIterator<Item = impl Into<String>>) -> Result<Self> {
        if !self.ignore_query_params.is_empty() {
            return Err(Error::new(
                ErrorKind::Fingerprint,
                "cannot combine ignore_query_params with keep_query_params",
            ));
        }
        self.keep_query_params.extend(params.into_iter().map(Into::into));
        Ok(self)
    }

    fn filtered_url(&self, url: &str) -> Result<String> {
        let mut parsed = Url::parse(url)
            .map_err(|e| Error::with_source(ErrorKind::Url, "invalid URL", Box::new(e)))?;
        if parsed.query().is_none() {
            return crate::url::normalize(url);
        }

        let pairs: Vec<(String, String)> = parsed
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .filter(|(k, _)| {
                if !self.keep_query_params.is_empty() {
                    self.keep_query_params.contains(k)
                } else {
                    !self.ignore_query_params.contains(k)
                }
            })
            .collect();

        if pairs.is_empty() {
            parsed.set_query(None);
        } else {
            let mut serializer = url::form_urlencoded::Serializer::new(String::new());
            for (k, v) in &pairs {
                serializer.append_pair(k, v);
            }
            parsed.set_query(Some(&serializer.finish()));
        }
        crate::url::normalize(parsed.as_str())
    }

    /// Computes the raw fingerprint bytes for `request`.
    pub fn fingerprint_bytes(&self, request: &Request) -> Result<Vec<u8>> {
        let method = request.method().as_str().as_bytes().to_vec();
        let url = self.filtered_url(request.url())?.into_bytes();
        let body = request.body().map(|b| b.to_vec()).unwrap_or_default();

        let parts: Vec<&[u8]> = [&method[..], &url[..], &body[..]]
            .into_iter()
            .filter(|p| !p.is_empty())
            .collect();
        Ok(parts.join(&b'\0'))
    }

    /// Computes the 16-byte BLAKE2b [`Fingerprint`] for `request`.
    pub fn fingerprint(&self, request: &Request) -> Result<Fingerprint> {
        let data = self.fingerprint_bytes(request)?;
        let mut hasher = Blake2bVar::new(DIGEST_SIZE)
            .map_err(|e| Error::with_source(ErrorKind::Fingerprint, "invalid digest size", Box::new(e)))?;
        hasher.update(&data);
        let mut out = [0u8; DIGEST_SIZE];
        hasher
            .finalize_variable(&mut out)
            .map_err(|e| Error::with_source(ErrorKind::Fingerprint, "failed to finalize digest", Box::new(e)))?;
        Ok(Fingerprint(out))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_request_same_fingerprint() {
        let fp = Fingerprinter::new();
        let r1 = Request::get("https://example.com/a?b=1").unwrap();
        let r2 = Request::get("https://example.com/a?b=1").unwrap();
        assert_eq!(fp.fingerprint(&r1).unwrap(), fp.fingerprint(&r2).unwrap());
    }

    #[test]
    fn differing_method_changes_fingerprint() {
        let fp = Fingerprinter::new();
        let get = Request::get("https://example.com/a").unwrap();
        let post = Request::new(http::Method::POST, "https://example.com/a").unwrap();
        assert_ne!(fp.fingerprint(&get).unwrap(), fp.fingerprint(&post).unwrap());
    }

    #[test]
    fn ignore_query_params_drops_named_param() {
        let fp = Fingerprinter::new().with_ignored_query_params(["session"]).unwrap();
        let r1 = Request::get("https://example.com/a?session=abc&x=1").unwrap();
        let r2 = Request::get("https://example.com/a?session=xyz&x=1").unwrap();
        assert_eq!(fp.fingerprint(&r1).unwrap(), fp.fingerprint(&r2).unwrap());
    }

    #[test]
    fn keep_query_params_is_a_whitelist() {
        let fp = Fingerprinter::new().with_kept_query_params(["x"]).unwrap();
        let r1 = Request::get("https://example.com/a?session=abc&x=1").unwrap();
        let r2 = Request::get("https://example.com/a?session=xyz&x=1").unwrap();
        assert_eq!(fp.fingerprint(&r1).unwrap(), fp.fingerprint(&r2).unwrap());
    }

    #[test]
    fn mutually_exclusive_query_param_modes_reject() {
        let fp = Fingerprinter::new().with_ignored_query_params(["a"]).unwrap();
        assert!(fp.with_kept_query_params(["b"]).is_err());
    }

    #[test]
    fn digest_is_sixteen_bytes() {
        let fp = Fingerprinter::new();
        let r = Request::get("https://example.com").unwrap();
        assert_eq!(fp.fingerprint(&r).unwrap().as_bytes().len(), DIGEST_SIZE);
    }
}
