//! Cache installer
//!
//! Populates a fresh generation from the shell manifest. All-or-nothing: the
//! generation is committed only after every resource arrived with a success
//! status, so a half-fetched shell never becomes live.

use crate::error::InstallError;
use crate::fetch::Fetcher;
use crate::manifest::ShellManifest;
use crate::request::{Payload, Request, ResourceKey};
use crate::store::{Activation, VersionedCacheStore};
use futures::future::try_join_all;
use reqwest::Url;
use std::sync::Arc;

/// Summary of a successful install
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Version tag of the committed generation
    pub tag: String,
    /// Number of resources stored
    pub resources: usize,
    /// Total body bytes fetched
    pub bytes: usize,
}

/// Installs shell generations into a [`VersionedCacheStore`]
#[derive(Debug, Clone)]
pub struct CacheInstaller {
    store: Arc<VersionedCacheStore>,
    fetcher: Arc<dyn Fetcher>,
    version: String,
}

impl CacheInstaller {
    /// Installer tagging generations with `version`
    #[must_use]
    pub fn new(
        store: Arc<VersionedCacheStore>,
        fetcher: Arc<dyn Fetcher>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            version: version.into(),
        }
    }

    /// Build version this installer writes
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fetch every manifest resource and commit them as one new generation
    ///
    /// # Errors
    /// The first failing resource aborts the install; nothing is committed
    /// and the live generation is untouched.
    pub async fn install(&self, manifest: &ShellManifest) -> Result<InstallReport, InstallError> {
        let keys = manifest.resolve()?;
        tracing::info!(version = %self.version, resources = keys.len(), "installing shell");

        let fetched = try_join_all(keys.into_iter().map(|key| self.fetch_one(key))).await?;

        let generation = self.store.begin_generation(self.version.clone());
        let mut bytes = 0;
        let resources = fetched.len();
        for (key, payload) in fetched {
            bytes += payload.len();
            generation.insert(key, payload).await;
        }
        self.store.commit(generation);

        tracing::info!(version = %self.version, resources, bytes, "shell installed");
        Ok(InstallReport {
            tag: self.version.clone(),
            resources,
            bytes,
        })
    }

    /// Promote the newest install and sweep stale generations
    pub fn activate(&self) -> Activation {
        self.store.activate()
    }

    async fn fetch_one(&self, key: ResourceKey) -> Result<(ResourceKey, Payload), InstallError> {
        let url = Url::parse(key.as_str())
            .map_err(|e| InstallError::invalid_entry(key.as_str(), e.to_string()))?;
        let payload = self
            .fetcher
            .fetch(&Request::get(url))
            .await
            .map_err(|source| InstallError::Fetch {
                key: key.clone(),
                source,
            })?;

        if !payload.is_success() {
            return Err(InstallError::BadStatus {
                key,
                status: payload.status,
            });
        }
        Ok((key, payload))
    }
}
