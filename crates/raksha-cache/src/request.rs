//! Request, response, and payload types seen by the caching agent

use crate::error::RouteError;
use crate::hash::ContentHash;
use reqwest::{Method, Url};
use serde::{de::DeserializeOwned, Serialize};
use std::fmt::{self, Display, Formatter};
use std::sync::Arc;

/// Normalized absolute request identity (scheme + host + path + query)
///
/// The fragment never takes part in identity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct ResourceKey(String);

impl ResourceKey {
    /// Build the key for an already parsed URL
    #[must_use]
    pub fn from_url(url: &Url) -> Self {
        let mut url = url.clone();
        url.set_fragment(None);
        Self(url.to_string())
    }

    /// Parse an absolute URL into a key
    ///
    /// # Errors
    /// `RouteError::InvalidUrl` if the string is not an absolute URL
    pub fn parse(raw: &str) -> Result<Self, RouteError> {
        let url = Url::parse(raw).map_err(|e| RouteError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::from_url(&url))
    }

    /// Key as a string
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the requesting client will do with the response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Destination {
    /// Full-page navigation
    Document,
    /// Script resource
    Script,
    /// Stylesheet
    Style,
    /// Image or icon
    Image,
    /// Web app manifest
    Manifest,
    /// Programmatic fetch (API call)
    #[default]
    Fetch,
}

impl Destination {
    /// Whether the shell root page may stand in for this request
    #[inline]
    #[must_use]
    pub fn is_navigation(self) -> bool {
        matches!(self, Self::Document)
    }
}

/// Outbound request intercepted by the agent
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Absolute target
    pub url: Url,
    /// Client-side destination type
    pub destination: Destination,
    /// Optional body with its content type
    pub body: Option<(String, Vec<u8>)>,
}

impl Request {
    /// New request with an arbitrary method
    #[must_use]
    pub fn new(method: Method, url: Url, destination: Destination) -> Self {
        Self {
            method,
            url,
            destination,
            body: None,
        }
    }

    /// Programmatic GET
    #[must_use]
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Fetch)
    }

    /// Full-page navigation
    #[must_use]
    pub fn navigate(url: Url) -> Self {
        Self::new(Method::GET, url, Destination::Document)
    }

    /// POST with a JSON body
    ///
    /// # Errors
    /// Returns the serializer error if `body` cannot be encoded
    pub fn post_json<T: Serialize + ?Sized>(url: Url, body: &T) -> Result<Self, serde_json::Error> {
        let bytes = serde_json::to_vec(body)?;
        Ok(Self {
            method: Method::POST,
            url,
            destination: Destination::Fetch,
            body: Some(("application/json".to_string(), bytes)),
        })
    }

    /// Parse `raw` and build a request with the given destination
    ///
    /// # Errors
    /// `RouteError::InvalidUrl` if the URL is not absolute
    pub fn parse(method: Method, raw: &str, destination: Destination) -> Result<Self, RouteError> {
        let url = Url::parse(raw).map_err(|e| RouteError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(method, url, destination))
    }

    /// Cache identity of this request
    #[inline]
    #[must_use]
    pub fn key(&self) -> ResourceKey {
        ResourceKey::from_url(&self.url)
    }

    /// Safe, idempotent read
    #[inline]
    #[must_use]
    pub fn is_idempotent_read(&self) -> bool {
        self.method == Method::GET || self.method == Method::HEAD
    }
}

/// Stored or fetched response body with metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    /// HTTP status
    pub status: u16,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Body bytes (shared, immutable)
    pub body: Arc<[u8]>,
    /// Blake3 digest of `body`
    pub digest: ContentHash,
}

impl Payload {
    /// Build a payload, computing its digest
    #[must_use]
    pub fn new(status: u16, content_type: Option<String>, body: impl Into<Vec<u8>>) -> Self {
        let body: Vec<u8> = body.into();
        let digest = ContentHash::compute(&body);
        Self {
            status,
            content_type,
            body: Arc::from(body),
            digest,
        }
    }

    /// 200 OK payload, the common test and install shape
    #[must_use]
    pub fn ok(content_type: &str, body: impl Into<Vec<u8>>) -> Self {
        Self::new(200, Some(content_type.to_string()), body)
    }

    /// 2xx status
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Body length in bytes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.body.len()
    }

    /// Empty body
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }
}

/// Where a response came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    /// Fresh from the network
    Network,
    /// Exact match in the live generation
    Cache,
    /// Shell root page standing in for an uncached navigation
    Shell,
}

/// Response handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Body and metadata
    pub payload: Payload,
    /// Provenance
    pub source: ResponseSource,
}

impl Response {
    /// Wrap a payload with its provenance
    #[inline]
    #[must_use]
    pub fn new(payload: Payload, source: ResponseSource) -> Self {
        Self { payload, source }
    }

    /// HTTP status
    #[inline]
    #[must_use]
    pub fn status(&self) -> u16 {
        self.payload.status
    }

    /// 2xx status
    #[inline]
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.payload.is_success()
    }

    /// Body as lossy UTF-8
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.payload.body).into_owned()
    }

    /// Decode a JSON body
    ///
    /// # Errors
    /// Returns the decoder error if the body is not valid JSON for `T`
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.payload.body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_drops_fragment_keeps_query() {
        let a = ResourceKey::parse("https://app.test/pages/journey.html?x=1#map").unwrap();
        let b = ResourceKey::parse("https://app.test/pages/journey.html?x=1").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, ResourceKey::parse("https://app.test/pages/journey.html").unwrap());
    }

    #[test]
    fn key_normalizes_host_case() {
        let a = ResourceKey::parse("HTTPS://App.Test/index.html").unwrap();
        assert_eq!(a.as_str(), "https://app.test/index.html");
    }

    #[test]
    fn invalid_url_rejected() {
        assert!(matches!(
            ResourceKey::parse("/index.html"),
            Err(RouteError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn post_json_is_not_idempotent() {
        let url = Url::parse("https://backend.test/check-in").unwrap();
        let req = Request::post_json(url, &serde_json::json!({"userId": "a"})).unwrap();
        assert!(!req.is_idempotent_read());
        assert_eq!(req.body.unwrap().0, "application/json");
    }

    #[test]
    fn payload_digest_matches_body() {
        let p = Payload::ok("text/html", "<html></html>");
        assert_eq!(p.digest, ContentHash::compute(b"<html></html>"));
        assert!(p.is_success());
        assert_eq!(p.len(), 13);
    }
}
