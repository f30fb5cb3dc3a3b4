//! Cache layer configuration

use crate::error::CacheConfigError;
use crate::manifest::{ShellManifest, DEFAULT_SHELL, DEFAULT_SHELL_ROOT};
use crate::router::RoutingPolicy;
use reqwest::Url;
use serde::{Deserialize, Serialize};

/// Build version tag of the stock client
pub const DEFAULT_CACHE_VERSION: &str = "rakshanet-v1";

/// Origin the shell is served from when none is configured
pub const DEFAULT_ORIGIN: &str = "http://localhost:8080/";

/// Settings for the caching agent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Version tag for installed generations; bump to invalidate
    pub version: String,
    /// Application origin that relative shell entries resolve against
    pub origin: String,
    /// Shell manifest entries
    pub shell: Vec<String>,
    /// Page served for offline navigations
    pub shell_root: String,
    /// Routing rules
    pub routing: RoutingPolicy,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            version: DEFAULT_CACHE_VERSION.to_string(),
            origin: DEFAULT_ORIGIN.to_string(),
            shell: DEFAULT_SHELL.iter().map(|s| (*s).to_string()).collect(),
            shell_root: DEFAULT_SHELL_ROOT.to_string(),
            routing: RoutingPolicy::default(),
        }
    }
}

impl CacheConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With version tag
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// With app origin
    #[inline]
    #[must_use]
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    /// With shell entries
    #[inline]
    #[must_use]
    pub fn with_shell(mut self, shell: Vec<String>) -> Self {
        self.shell = shell;
        self
    }

    /// With routing policy
    #[inline]
    #[must_use]
    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Parsed origin
    ///
    /// # Errors
    /// `CacheConfigError::InvalidValue` if `origin` is not an absolute URL
    pub fn origin_url(&self) -> Result<Url, CacheConfigError> {
        Url::parse(&self.origin).map_err(|e| CacheConfigError::InvalidValue {
            field: "cache.origin",
            reason: e.to_string(),
        })
    }

    /// Manifest described by this configuration
    ///
    /// # Errors
    /// `CacheConfigError::InvalidValue` if the origin does not parse
    pub fn manifest(&self) -> Result<ShellManifest, CacheConfigError> {
        Ok(ShellManifest::new(
            self.origin_url()?,
            self.shell.clone(),
            self.shell_root.clone(),
        ))
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// The first invalid field
    pub fn validate(&self) -> Result<(), CacheConfigError> {
        if self.version.trim().is_empty() {
            return Err(CacheConfigError::InvalidValue {
                field: "cache.version",
                reason: "must not be empty".to_string(),
            });
        }
        if self.shell.is_empty() {
            return Err(CacheConfigError::InvalidValue {
                field: "cache.shell",
                reason: "at least one entry is required".to_string(),
            });
        }
        self.manifest()?
            .resolve()
            .map_err(|e| CacheConfigError::InvalidValue {
                field: "cache.shell",
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
