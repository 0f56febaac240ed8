//! Storage backends for settled results.

use super::CacheKey;
use crate::core::PipelineResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// A stored result with metadata.
#[derive(Debug, Clone)]
pub struct CachedEntry {
    /// The stored result.
    pub result: Arc<PipelineResult>,
    /// When the entry was stored.
    pub stored_at: DateTime<Utc>,
}

impl CachedEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(result: Arc<PipelineResult>) -> Self {
        Self {
            result,
            stored_at: Utc::now(),
        }
    }
}

/// Protocol for result storage backends.
///
/// Entries never expire on their own; they leave the store only through
/// deletion, invalidation or clearing.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Gets a stored entry.
    async fn get(&self, key: &CacheKey) -> Option<CachedEntry>;

    /// Stores an entry, replacing any previous one.
    async fn set(&self, key: CacheKey, entry: CachedEntry);

    /// Deletes an entry. Returns true if one existed.
    async fn delete(&self, key: &CacheKey) -> bool;

    /// Deletes every entry for a resource. Returns how many were removed.
    async fn invalidate_resource(&self, resource_id: &str) -> usize;

    /// Clears all entries.
    async fn clear(&self);
}

/// In-memory result store.
#[derive(Debug, Default)]
pub struct InMemoryCacheStore {
    entries: Mutex<HashMap<CacheKey, CachedEntry>>,
}

impl InMemoryCacheStore {
    /// Creates a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Option<CachedEntry> {
        self.entries.lock().get(key).cloned()
    }

    async fn set(&self, key: CacheKey, entry: CachedEntry) {
        self.entries.lock().insert(key, entry);
    }

    async fn delete(&self, key: &CacheKey) -> bool {
        self.entries.lock().remove(key).is_some()
    }

    async fn invalidate_resource(&self, resource_id: &str) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|key, _| key.resource_id != resource_id);
        before - entries.len()
    }

    async fn clear(&self) {
        self.entries.lock().clear();
    }
}
