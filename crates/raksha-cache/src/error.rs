//! Error types for the caching agent
//!
//! - Fetch failures (network path)
//! - Install failures (fatal to caching only)
//! - Routing failures surfaced to callers

use crate::request::ResourceKey;

/// Errors from a single network attempt
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchError {
    /// Host unreachable, connection refused, DNS failure, or the device is offline
    #[error("network unavailable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    /// No response within the configured budget
    #[error("request to {url} timed out after {after_ms}ms")]
    Timeout { url: String, after_ms: u64 },

    /// Response arrived but the body could not be read
    #[error("failed reading body from {url}: {reason}")]
    Body { url: String, reason: String },
}

impl FetchError {
    /// Create an unreachable error
    pub fn unreachable(url: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            url: url.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(url: impl Into<String>, after_ms: u64) -> Self {
        Self::Timeout {
            url: url.into(),
            after_ms,
        }
    }
}

/// Errors while installing a new cache generation
///
/// Any of these abandons the whole generation; the previous live
/// generation stays live.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InstallError {
    /// Manifest entry could not be resolved to an absolute key
    #[error("invalid manifest entry '{entry}': {reason}")]
    InvalidEntry { entry: String, reason: String },

    /// Manifest does not contain its own root page
    #[error("shell root {0} is not listed in the manifest")]
    MissingRoot(String),

    /// Network attempt for a manifest resource failed
    #[error("failed to fetch {key}: {source}")]
    Fetch {
        key: ResourceKey,
        #[source]
        source: FetchError,
    },

    /// Manifest resource answered with a non-success status
    #[error("manifest resource {key} returned status {status}")]
    BadStatus { key: ResourceKey, status: u16 },
}

impl InstallError {
    /// Create an invalid entry error
    pub fn invalid_entry(entry: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidEntry {
            entry: entry.into(),
            reason: reason.into(),
        }
    }
}

/// Errors surfaced by the request router
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    /// Network failed and nothing in the live generation could stand in
    #[error("network unavailable for {key}: {source}")]
    NetworkUnavailable {
        key: ResourceKey,
        #[source]
        source: FetchError,
    },

    /// Request URL could not be normalized into a resource key
    #[error("invalid request url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl RouteError {
    /// True when the failure came from the network path
    #[inline]
    #[must_use]
    pub fn is_network_unavailable(&self) -> bool {
        matches!(self, Self::NetworkUnavailable { .. })
    }
}

/// Configuration errors for the cache layer
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheConfigError {
    /// Field failed validation
    #[error("invalid cache config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

/// Combined caching-agent error
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("install error: {0}")]
    Install(#[from] InstallError),

    #[error("route error: {0}")]
    Route(#[from] RouteError),

    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    #[error("config error: {0}")]
    Config(#[from] CacheConfigError),
}

impl CacheError {
    /// Whether the application can keep running (always true for this layer)
    ///
    /// Install failures only disable offline support; route failures are
    /// per-request notices.
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Config(_))
    }
}

/// Result type alias for cache operations
pub type CacheResult<T> = Result<T, CacheError>;
