//! Request routing
//!
//! Every outbound request gets a [`RoutingDecision`] from the request shape
//! alone, then is executed against the network and the live generation:
//!
//! | Decision | Network ok | Network down |
//! |---|---|---|
//! | `NetworkOnly` | response | error |
//! | `CacheFirst` | cached, else network + store | cached, else shell/error |
//! | `NetworkFirstFallbackToCacheOrShell` | response + store | cached, else shell/error |
//!
//! Stores are write-behind: the response is returned while the copy is
//! written on a spawned task.

use crate::error::{FetchError, RouteError};
use crate::fetch::Fetcher;
use crate::request::{Payload, Request, ResourceKey, Response, ResponseSource};
use crate::store::VersionedCacheStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a request is served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingDecision {
    /// Always the network; never answered from cache
    NetworkOnly,
    /// Live generation first, network on miss
    CacheFirst,
    /// Network first; on failure the cached copy, then the shell root
    NetworkFirstFallbackToCacheOrShell,
}

/// Host and path patterns driving [`RoutingDecision`]
///
/// Host patterns match the host itself or any subdomain of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RoutingPolicy {
    /// Audit backend, identity provider, AI endpoints
    pub network_only_hosts: Vec<String>,
    /// Same-origin API prefixes that must reflect current state
    pub network_only_path_prefixes: Vec<String>,
    /// Hosts serving immutable, versioned assets
    pub cache_first_hosts: Vec<String>,
}

impl Default for RoutingPolicy {
    fn default() -> Self {
        Self {
            network_only_hosts: vec![
                "onrender.com".to_string(),
                "firebaseapp.com".to_string(),
                "googleapis.com".to_string(),
                "openai.com".to_string(),
            ],
            network_only_path_prefixes: vec!["/api/".to_string()],
            cache_first_hosts: Vec::new(),
        }
    }
}

impl RoutingPolicy {
    /// Add a network-only host (e.g. the configured backend)
    #[must_use]
    pub fn with_network_only_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into().to_ascii_lowercase();
        if !self.network_only_hosts.contains(&host) {
            self.network_only_hosts.push(host);
        }
        self
    }

    /// Add a network-only path prefix (e.g. a backend sharing the app origin)
    #[must_use]
    pub fn with_network_only_path_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        if !self.network_only_path_prefixes.contains(&prefix) {
            self.network_only_path_prefixes.push(prefix);
        }
        self
    }

    /// Add a cache-first host
    #[must_use]
    pub fn with_cache_first_host(mut self, host: impl Into<String>) -> Self {
        self.cache_first_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    /// Classify a request; pure function of its shape
    #[must_use]
    pub fn classify(&self, request: &Request) -> RoutingDecision {
        let host = request.url.host_str().unwrap_or_default();
        let path = request.url.path();

        if !request.is_idempotent_read()
            || matches_any_host(host, &self.network_only_hosts)
            || self
                .network_only_path_prefixes
                .iter()
                .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return RoutingDecision::NetworkOnly;
        }

        if matches_any_host(host, &self.cache_first_hosts) {
            return RoutingDecision::CacheFirst;
        }

        RoutingDecision::NetworkFirstFallbackToCacheOrShell
    }
}

fn matches_any_host(host: &str, patterns: &[String]) -> bool {
    let host = host.trim_end_matches('.');
    patterns.iter().any(|pattern| {
        let pattern = pattern.trim_start_matches('.');
        host.eq_ignore_ascii_case(pattern)
            || (host.len() > pattern.len()
                && host[host.len() - pattern.len()..].eq_ignore_ascii_case(pattern)
                && host.as_bytes()[host.len() - pattern.len() - 1] == b'.')
    })
}

/// Routes requests between the network and the live cache generation
#[derive(Debug, Clone)]
pub struct RequestRouter {
    policy: RoutingPolicy,
    store: Arc<VersionedCacheStore>,
    fetcher: Arc<dyn Fetcher>,
    shell_root: ResourceKey,
}

impl RequestRouter {
    /// Router over `store`, falling back to `shell_root` for navigations
    #[must_use]
    pub fn new(
        policy: RoutingPolicy,
        store: Arc<VersionedCacheStore>,
        fetcher: Arc<dyn Fetcher>,
        shell_root: ResourceKey,
    ) -> Self {
        Self {
            policy,
            store,
            fetcher,
            shell_root,
        }
    }

    /// Active policy
    #[inline]
    #[must_use]
    pub fn policy(&self) -> &RoutingPolicy {
        &self.policy
    }

    /// Decide how `request` is served
    #[inline]
    #[must_use]
    pub fn route(&self, request: &Request) -> RoutingDecision {
        self.policy.classify(request)
    }

    /// Route and execute
    ///
    /// # Errors
    /// `RouteError::NetworkUnavailable` when neither network nor cache can answer
    pub async fn handle(&self, request: Request) -> Result<Response, RouteError> {
        let decision = self.route(&request);
        self.execute(request, decision).await
    }

    /// Execute `request` under `decision`
    ///
    /// # Errors
    /// `RouteError::NetworkUnavailable` when neither network nor cache can answer
    pub async fn execute(
        &self,
        request: Request,
        decision: RoutingDecision,
    ) -> Result<Response, RouteError> {
        let key = request.key();
        tracing::debug!(%key, method = %request.method, ?decision, "routing request");

        match decision {
            RoutingDecision::NetworkOnly => self.network(&request).await,
            RoutingDecision::CacheFirst => {
                if let Some(cached) = self.cached(&request, &key).await {
                    return Ok(cached);
                }
                match self.fetcher.fetch(&request).await {
                    Ok(payload) => Ok(self.store_behind(&request, key, payload)),
                    Err(source) => self.fallback(&request, key, source, false).await,
                }
            }
            RoutingDecision::NetworkFirstFallbackToCacheOrShell => {
                match self.fetcher.fetch(&request).await {
                    Ok(payload) => Ok(self.store_behind(&request, key, payload)),
                    Err(source) => self.fallback(&request, key, source, true).await,
                }
            }
        }
    }

    /// Network path with no cache involvement in either direction
    ///
    /// # Errors
    /// `RouteError::NetworkUnavailable` on any transport failure
    pub async fn network(&self, request: &Request) -> Result<Response, RouteError> {
        self.fetcher
            .fetch(request)
            .await
            .map(|payload| Response::new(payload, ResponseSource::Network))
            .map_err(|source| RouteError::NetworkUnavailable {
                key: request.key(),
                source,
            })
    }

    // Stored payloads are GET bodies; HEAD must not be answered with one.
    async fn cached(&self, request: &Request, key: &ResourceKey) -> Option<Response> {
        if request.method != reqwest::Method::GET {
            return None;
        }
        self.store
            .lookup(key)
            .await
            .map(|payload| Response::new(payload, ResponseSource::Cache))
    }

    async fn fallback(
        &self,
        request: &Request,
        key: ResourceKey,
        source: FetchError,
        try_exact: bool,
    ) -> Result<Response, RouteError> {
        tracing::debug!(%key, error = %source, "network failed, trying cache");

        if try_exact {
            if let Some(cached) = self.cached(request, &key).await {
                return Ok(cached);
            }
        }

        if request.destination.is_navigation() && request.method == reqwest::Method::GET {
            if let Some(shell) = self.store.lookup(&self.shell_root).await {
                tracing::info!(%key, "serving shell root offline");
                return Ok(Response::new(shell, ResponseSource::Shell));
            }
        }

        Err(RouteError::NetworkUnavailable { key, source })
    }

    /// Return the network response and copy it into the live generation on
    /// a spawned task when it is cacheable
    fn store_behind(&self, request: &Request, key: ResourceKey, payload: Payload) -> Response {
        if request.method == reqwest::Method::GET && payload.status == 200 {
            let store = Arc::clone(&self.store);
            let copy = payload.clone();
            tokio::spawn(async move {
                if !store.put(key.clone(), copy).await {
                    tracing::debug!(%key, "no live generation, skipped passive cache write");
                }
            });
        }
        Response::new(payload, ResponseSource::Network)
    }
}
