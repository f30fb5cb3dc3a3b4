//! Shell manifest: the resources that must be resident to run with zero network

use crate::error::InstallError;
use crate::request::ResourceKey;
use reqwest::Url;

/// Application shell shipped with the RakshaNet client
pub const DEFAULT_SHELL: &[&str] = &[
    "/",
    "/index.html",
    "/pages/safety-tips.html",
    "/pages/emergency-contacts.html",
    "/pages/dashboard.html",
    "/pages/journey.html",
    "/src/script.js",
    "/src/fake-call.js",
    "/src/location-share.js",
    "/src/map.js",
    "/src/ai.js",
    "/src/firebase-init.js",
    "/manifest.json",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css",
    "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js",
];

/// Page served for navigations that are neither online nor cached
pub const DEFAULT_SHELL_ROOT: &str = "/index.html";

/// Fixed list of shell resources, resolved against the app origin
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellManifest {
    origin: Url,
    entries: Vec<String>,
    root: String,
}

impl ShellManifest {
    /// Manifest with explicit entries and root page
    ///
    /// Entries may be origin-relative (`/index.html`) or absolute
    /// (third-party assets).
    #[must_use]
    pub fn new(origin: Url, entries: Vec<String>, root: impl Into<String>) -> Self {
        Self {
            origin,
            entries,
            root: root.into(),
        }
    }

    /// The stock RakshaNet shell for `origin`
    #[must_use]
    pub fn rakshanet(origin: Url) -> Self {
        Self::new(
            origin,
            DEFAULT_SHELL.iter().map(|s| (*s).to_string()).collect(),
            DEFAULT_SHELL_ROOT,
        )
    }

    /// Raw manifest entries
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// App origin
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &Url {
        &self.origin
    }

    /// Resolve every entry into an absolute key, deduplicated, in order
    ///
    /// # Errors
    /// `InstallError::InvalidEntry` for an unresolvable entry,
    /// `InstallError::MissingRoot` when the root page is not listed
    pub fn resolve(&self) -> Result<Vec<ResourceKey>, InstallError> {
        let mut keys: Vec<ResourceKey> = Vec::with_capacity(self.entries.len());
        for entry in &self.entries {
            let key = self.resolve_entry(entry)?;
            if !keys.contains(&key) {
                keys.push(key);
            }
        }

        let root = self.root_key()?;
        if !keys.contains(&root) {
            return Err(InstallError::MissingRoot(root.to_string()));
        }
        Ok(keys)
    }

    /// Key of the shell root page
    ///
    /// # Errors
    /// `InstallError::InvalidEntry` if the root cannot be resolved
    pub fn root_key(&self) -> Result<ResourceKey, InstallError> {
        self.resolve_entry(&self.root)
    }

    fn resolve_entry(&self, entry: &str) -> Result<ResourceKey, InstallError> {
        if entry.trim().is_empty() {
            return Err(InstallError::invalid_entry(entry, "empty entry"));
        }
        self.origin
            .join(entry)
            .map(|url| ResourceKey::from_url(&url))
            .map_err(|e| InstallError::invalid_entry(entry, e.to_string()))
    }
}
