//! Network path
//!
//! [`Fetcher`] is the only way the agent talks to the network. The router,
//! the installer, and the backend notifier all go through it, which keeps
//! offline behaviour testable with a scripted implementation.

use crate::error::FetchError;
use crate::request::{Payload, Request};
use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use std::fmt::Debug;
use std::time::Duration;

/// Performs exactly one network attempt for a request
#[async_trait]
pub trait Fetcher: Send + Sync + Debug {
    /// Fetch `request`; any HTTP status counts as a response, only transport
    /// failures are errors
    async fn fetch(&self, request: &Request) -> Result<Payload, FetchError>;
}

/// `reqwest`-backed fetcher with a per-request timeout
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpFetcher {
    /// Build a fetcher whose requests give up after `timeout`
    ///
    /// # Errors
    /// Returns `FetchError::Unreachable` if the TLS backend cannot initialize
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("rakshanet/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetchError::unreachable("<client>", e.to_string()))?;
        Ok(Self { client, timeout })
    }

    /// Configured timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn classify(&self, url: &str, err: &reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::timeout(url, u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX))
        } else {
            FetchError::unreachable(url, err.to_string())
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Payload, FetchError> {
        let url = request.url.as_str();
        let mut builder = self.client.request(request.method.clone(), request.url.clone());
        if let Some((content_type, body)) = &request.body {
            builder = builder.header(CONTENT_TYPE, content_type).body(body.clone());
        }

        let response = builder.send().await.map_err(|e| self.classify(url, &e))?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await.map_err(|e| FetchError::Body {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        tracing::trace!(%url, status, bytes = body.len(), "network response");
        Ok(Payload::new(status, content_type, body.to_vec()))
    }
}
