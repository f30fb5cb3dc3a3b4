//! Caching agent lifecycle
//!
//! `on_install` → `on_activate` → `on_request`*. Install failures only cost
//! offline support; the agent keeps routing with whatever generation is live.

use crate::config::CacheConfig;
use crate::error::{CacheConfigError, RouteError};
use crate::fetch::Fetcher;
use crate::installer::{CacheInstaller, InstallReport};
use crate::manifest::ShellManifest;
use crate::request::{Request, Response};
use crate::router::RequestRouter;
use crate::store::{Activation, VersionedCacheStore};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Intercepts every outbound request of the client
#[derive(Debug)]
pub struct CacheAgent {
    manifest: ShellManifest,
    store: Arc<VersionedCacheStore>,
    installer: CacheInstaller,
    router: RequestRouter,
    claimed: AtomicBool,
}

impl CacheAgent {
    /// Build an agent from validated configuration
    ///
    /// # Errors
    /// Returns the first invalid configuration field
    pub fn new(config: &CacheConfig, fetcher: Arc<dyn Fetcher>) -> Result<Self, CacheConfigError> {
        config.validate()?;
        let manifest = config.manifest()?;
        let shell_root = manifest
            .root_key()
            .map_err(|e| CacheConfigError::InvalidValue {
                field: "cache.shell_root",
                reason: e.to_string(),
            })?;

        let store = Arc::new(VersionedCacheStore::new());
        let installer =
            CacheInstaller::new(Arc::clone(&store), Arc::clone(&fetcher), config.version.clone());
        let router = RequestRouter::new(
            config.routing.clone(),
            Arc::clone(&store),
            fetcher,
            shell_root,
        );

        Ok(Self {
            manifest,
            store,
            installer,
            router,
            claimed: AtomicBool::new(false),
        })
    }

    /// Install the shell as a new generation
    ///
    /// Never fails: an install error is logged and the agent keeps running
    /// without a new generation.
    pub async fn on_install(&self) -> Option<InstallReport> {
        match self.installer.install(&self.manifest).await {
            Ok(report) => Some(report),
            Err(e) => {
                tracing::warn!(
                    version = self.installer.version(),
                    error = %e,
                    "shell install failed, offline support unavailable for this version"
                );
                None
            }
        }
    }

    /// Activate the newest generation, sweep the rest, then claim clients
    pub fn on_activate(&self) -> Activation {
        let activation = self.installer.activate();
        if !self.claimed.swap(true, Ordering::AcqRel) {
            tracing::info!(live = ?activation.live_tag, "agent controls open clients");
        }
        activation
    }

    /// Install then activate
    pub async fn start(&self) -> Activation {
        self.on_install().await;
        self.on_activate()
    }

    /// Serve one intercepted request
    ///
    /// # Errors
    /// `RouteError::NetworkUnavailable` when neither network nor cache can answer
    pub async fn on_request(&self, request: Request) -> Result<Response, RouteError> {
        self.router.handle(request).await
    }

    /// Whether `on_activate` has run
    #[inline]
    #[must_use]
    pub fn clients_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }

    /// Shared router (the notification path goes through it)
    #[inline]
    #[must_use]
    pub fn router(&self) -> &RequestRouter {
        &self.router
    }

    /// Underlying store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &Arc<VersionedCacheStore> {
        &self.store
    }

    /// Manifest this agent installs
    #[inline]
    #[must_use]
    pub fn manifest(&self) -> &ShellManifest {
        &self.manifest
    }
}
