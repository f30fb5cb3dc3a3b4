//! Versioned, content-addressed response store
//!
//! A [`CacheGeneration`] is an immutable-once-committed snapshot of resources
//! tagged with a build version. Exactly one generation is live at a time.
//! Installing builds a detached generation; [`VersionedCacheStore::activate`]
//! swaps the newest committed generation in and sweeps every other one.
//!
//! ```text
//! install ──► detached ──commit──► installed ──activate──► live
//!                                                   └──► sweep(all others)
//! ```

use crate::hash::ContentHash;
use crate::request::{Payload, ResourceKey};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use moka::future::Cache;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// One versioned snapshot of cached resources
///
/// Entries are keyed by request identity; bodies are interned by digest so
/// identical payloads under different keys share one allocation.
#[derive(Debug)]
pub struct CacheGeneration {
    tag: String,
    seq: u64,
    created_at: DateTime<Utc>,
    entries: Cache<ResourceKey, Payload>,
    blobs: DashMap<ContentHash, Arc<[u8]>>,
}

impl CacheGeneration {
    fn new(tag: String, seq: u64) -> Self {
        Self {
            tag,
            seq,
            created_at: Utc::now(),
            // Unbounded: shell entries must never be evicted.
            entries: Cache::builder().build(),
            blobs: DashMap::new(),
        }
    }

    /// Version tag this generation was installed under
    #[inline]
    #[must_use]
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Store-local install sequence (monotonic)
    #[inline]
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Creation time
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Read an entry
    pub async fn get(&self, key: &ResourceKey) -> Option<Payload> {
        self.entries.get(key).await
    }

    /// Write an entry, interning its body by digest
    pub async fn insert(&self, key: ResourceKey, mut payload: Payload) {
        let shared = Arc::clone(
            self.blobs
                .entry(payload.digest)
                .or_insert_with(|| Arc::clone(&payload.body))
                .value(),
        );
        payload.body = shared;
        self.entries.insert(key, payload).await;
    }

    /// Exact number of entries
    pub async fn entry_count(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }

    /// Number of distinct bodies
    #[inline]
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.blobs.len()
    }
}

/// Outcome of [`VersionedCacheStore::activate`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Activation {
    /// Tag of the generation now live, if any
    pub live_tag: Option<String>,
    /// Whether the live pointer moved
    pub swapped: bool,
    /// Number of generations deleted by the sweep
    pub swept: usize,
}

/// Namespaced store of cache generations with one live pointer
#[derive(Debug, Default)]
pub struct VersionedCacheStore {
    next_seq: AtomicU64,
    /// Committed generations by sequence (live one included)
    generations: DashMap<u64, Arc<CacheGeneration>>,
    live: RwLock<Option<Arc<CacheGeneration>>>,
}

impl VersionedCacheStore {
    /// Empty store, nothing live
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a detached generation; invisible until [`commit`](Self::commit)
    #[must_use]
    pub fn begin_generation(&self, tag: impl Into<String>) -> Arc<CacheGeneration> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        Arc::new(CacheGeneration::new(tag.into(), seq))
    }

    /// Register a fully populated generation as the newest install
    pub fn commit(&self, generation: Arc<CacheGeneration>) {
        tracing::debug!(tag = generation.tag(), seq = generation.seq(), "generation committed");
        self.generations.insert(generation.seq(), generation);
    }

    /// Make the newest committed generation live and delete all others
    ///
    /// Idempotent: repeated calls leave the same single live generation.
    pub fn activate(&self) -> Activation {
        let mut live = self.live.write();

        let newest = self
            .generations
            .iter()
            .max_by_key(|entry| *entry.key())
            .map(|entry| Arc::clone(entry.value()));

        let Some(newest) = newest else {
            return Activation {
                live_tag: None,
                swapped: false,
                swept: 0,
            };
        };

        let swapped = live.as_ref().map_or(true, |current| current.seq() != newest.seq());
        if swapped {
            *live = Some(Arc::clone(&newest));
        }

        // Anything committed after `newest` was picked survives for the next activation.
        let before = self.generations.len();
        self.generations.retain(|seq, _| *seq >= newest.seq());
        let swept = before - self.generations.len();

        if swapped || swept > 0 {
            tracing::info!(tag = newest.tag(), swapped, swept, "cache generation activated");
        }

        Activation {
            live_tag: Some(newest.tag().to_string()),
            swapped,
            swept,
        }
    }

    /// Snapshot of the live generation
    #[must_use]
    pub fn live(&self) -> Option<Arc<CacheGeneration>> {
        self.live.read().clone()
    }

    /// Tag of the live generation
    #[must_use]
    pub fn live_tag(&self) -> Option<String> {
        self.live.read().as_ref().map(|g| g.tag().to_string())
    }

    /// Read against the live generation only
    pub async fn lookup(&self, key: &ResourceKey) -> Option<Payload> {
        let live = self.live()?;
        live.get(key).await
    }

    /// Write into the live generation; returns false if nothing is live
    pub async fn put(&self, key: ResourceKey, payload: Payload) -> bool {
        match self.live() {
            Some(live) => {
                live.insert(key, payload).await;
                true
            }
            None => false,
        }
    }

    /// Number of committed generations (live one included)
    #[inline]
    #[must_use]
    pub fn generation_count(&self) -> usize {
        self.generations.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn key(path: &str) -> ResourceKey {
        ResourceKey::parse(&format!("https://app.test{path}")).unwrap()
    }

    #[tokio::test]
    async fn nothing_live_until_activate() {
        let store = VersionedCacheStore::new();
        let generation = store.begin_generation("v1");
        generation.insert(key("/"), Payload::ok("text/html", "root")).await;
        store.commit(generation);

        assert!(store.lookup(&key("/")).await.is_none());
        let activation = store.activate();
        assert_eq!(activation.live_tag.as_deref(), Some("v1"));
        assert!(activation.swapped);
        assert_eq!(store.lookup(&key("/")).await.unwrap().body.as_ref(), b"root");
    }

    #[tokio::test]
    async fn activate_sweeps_older_generations() {
        let store = VersionedCacheStore::new();
        for tag in ["v1", "v2", "v3"] {
            store.commit(store.begin_generation(tag));
        }
        assert_eq!(store.generation_count(), 3);

        let activation = store.activate();
        assert_eq!(activation.live_tag.as_deref(), Some("v3"));
        assert_eq!(activation.swept, 2);
        assert_eq!(store.generation_count(), 1);
    }

    #[tokio::test]
    async fn activate_is_idempotent() {
        let store = VersionedCacheStore::new();
        store.commit(store.begin_generation("v1"));

        let first = store.activate();
        let second = store.activate();
        assert!(first.swapped);
        assert!(!second.swapped);
        assert_eq!(second.swept, 0);
        assert_eq!(store.live_tag().as_deref(), Some("v1"));
        assert_eq!(store.generation_count(), 1);
    }

    #[tokio::test]
    async fn activate_on_empty_store_is_noop() {
        let store = VersionedCacheStore::new();
        let activation = store.activate();
        assert_eq!(activation.live_tag, None);
        assert_eq!(store.generation_count(), 0);
    }

    #[tokio::test]
    async fn put_without_live_generation_is_dropped() {
        let store = VersionedCacheStore::new();
        assert!(!store.put(key("/a"), Payload::ok("text/plain", "a")).await);
    }

    #[tokio::test]
    async fn identical_bodies_are_interned() {
        let store = VersionedCacheStore::new();
        let generation = store.begin_generation("v1");
        generation.insert(key("/"), Payload::ok("text/html", "same")).await;
        generation.insert(key("/index.html"), Payload::ok("text/html", "same")).await;
        assert_eq!(generation.blob_count(), 1);
        assert_eq!(generation.entry_count().await, 2);

        let a = generation.get(&key("/")).await.unwrap();
        let b = generation.get(&key("/index.html")).await.unwrap();
        assert!(Arc::ptr_eq(&a.body, &b.body));
    }

    proptest! {
        #[test]
        fn activation_leaves_single_newest_generation(ops in prop::collection::vec(any::<bool>(), 1..40)) {
            let store = VersionedCacheStore::new();
            let mut newest = None;
            for (i, commit) in ops.into_iter().enumerate() {
                if commit {
                    let tag = format!("v{i}");
                    store.commit(store.begin_generation(tag.clone()));
                    newest = Some(tag);
                } else {
                    let activation = store.activate();
                    prop_assert_eq!(activation.live_tag, newest.clone());
                    prop_assert!(store.generation_count() <= 1);
                }
            }
            store.activate();
            prop_assert_eq!(store.live_tag(), newest.clone());
            prop_assert_eq!(store.generation_count(), usize::from(newest.is_some()));
        }
    }
}
