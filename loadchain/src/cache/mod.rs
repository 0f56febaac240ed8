//! Result caching with single-flight execution.
//!
//! [`LoaderCache`] wraps a [`LoaderRunner`]. Concurrent requests for the same
//! resource and chain share one run; cacheable results are kept in a
//! [`CacheStore`] and served without running the chain again.

mod key;
mod store;

pub use key::{hash_chain, CacheKey};
pub use store::{CacheStore, CachedEntry, InMemoryCacheStore};

use crate::core::{PipelineRequest, PipelineResult};
use crate::errors::LoaderError;
use crate::pipeline::{CancellationToken, LoaderRunner, RunOptions};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::debug;

type Outcome = Result<Arc<PipelineResult>, LoaderError>;

/// Counters describing cache behaviour.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Requests answered from the store.
    pub hits: u64,
    /// Runs actually executed.
    pub executions: u64,
    /// Requests that joined a run already in flight.
    pub coalesced: u64,
    /// Successful runs whose result could not be stored.
    pub uncacheable: u64,
}

/// One in-flight run shared by every waiter on its key.
struct Flight {
    outcome: OnceCell<Outcome>,
    cancellation: Arc<CancellationToken>,
}

impl Flight {
    fn new() -> Self {
        Self {
            outcome: OnceCell::new(),
            cancellation: CancellationToken::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    executions: AtomicU64,
    coalesced: AtomicU64,
    uncacheable: AtomicU64,
}

/// Caching, single-flight front end for a [`LoaderRunner`].
pub struct LoaderCache {
    runner: LoaderRunner,
    store: Arc<dyn CacheStore>,
    in_flight: DashMap<CacheKey, Arc<Flight>>,
    counters: Counters,
}

impl LoaderCache {
    /// Creates a cache backed by an in-memory store.
    #[must_use]
    pub fn new(runner: LoaderRunner) -> Self {
        Self::with_store(runner, Arc::new(InMemoryCacheStore::new()))
    }

    /// Creates a cache backed by a custom store.
    #[must_use]
    pub fn with_store(runner: LoaderRunner, store: Arc<dyn CacheStore>) -> Self {
        Self {
            runner,
            store,
            in_flight: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// Returns the wrapped runner.
    #[must_use]
    pub fn runner(&self) -> &LoaderRunner {
        &self.runner
    }

    /// Runs a request, reusing a stored or in-flight result when possible.
    ///
    /// # Errors
    ///
    /// Returns the run's [`LoaderError`]. Every coalesced waiter receives the
    /// same error, and failures are never stored.
    pub async fn run(&self, request: PipelineRequest) -> Outcome {
        let key = CacheKey::for_request(&request);

        if let Some(entry) = self.store.get(&key).await {
            debug!(key = %key, "Cache hit");
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(entry.result);
        }

        let flight = match self.in_flight.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                debug!(key = %key, "Joining in-flight run");
                self.counters.coalesced.fetch_add(1, Ordering::Relaxed);
                occupied.get().clone()
            }
            Entry::Vacant(vacant) => {
                let flight = Arc::new(Flight::new());
                vacant.insert(flight.clone());
                flight
            }
        };

        flight
            .outcome
            .get_or_init(|| self.execute(key.clone(), request, &flight))
            .await
            .clone()
    }

    async fn execute(&self, key: CacheKey, request: PipelineRequest, flight: &Arc<Flight>) -> Outcome {
        // A run for this key may have settled and been stored since the first lookup.
        if let Some(entry) = self.store.get(&key).await {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            self.evict(&key, flight);
            return Ok(entry.result);
        }

        debug!(key = %key, "Executing loader chain");
        self.counters.executions.fetch_add(1, Ordering::Relaxed);
        let options = RunOptions::new().with_cancellation(flight.cancellation.clone());
        let outcome = self.runner.run_with(request, options).await.map(Arc::new);

        if let Ok(result) = &outcome {
            if result.cacheable && !flight.cancellation.is_cancelled() {
                self.store
                    .set(key.clone(), CachedEntry::new(result.clone()))
                    .await;
                // An invalidation may have landed while the entry was being stored.
                if flight.cancellation.is_cancelled() {
                    debug!(key = %key, "Dropping result invalidated during store");
                    self.store.delete(&key).await;
                }
            } else {
                debug!(key = %key, "Result not cacheable");
                self.counters.uncacheable.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.evict(&key, flight);
        outcome
    }

    fn evict(&self, key: &CacheKey, flight: &Arc<Flight>) {
        self.in_flight
            .remove_if(key, |_, current| Arc::ptr_eq(current, flight));
    }

    /// Drops every stored result for a resource and aborts its in-flight runs.
    ///
    /// Returns the number of stored results removed.
    pub async fn invalidate_resource(&self, resource_id: &str) -> usize {
        let mut aborted = Vec::new();
        self.in_flight.retain(|key, flight| {
            if key.resource_id == resource_id {
                aborted.push(flight.clone());
                false
            } else {
                true
            }
        });
        for flight in aborted {
            flight
                .cancellation
                .cancel(format!("resource '{resource_id}' invalidated"));
        }

        let removed = self.store.invalidate_resource(resource_id).await;
        debug!(resource = %resource_id, removed, "Invalidated resource");
        removed
    }

    /// Drops the stored result for one key and aborts its in-flight run.
    ///
    /// Returns true if a stored result was removed.
    pub async fn invalidate(&self, key: &CacheKey) -> bool {
        if let Some((_, flight)) = self.in_flight.remove(key) {
            flight.cancellation.cancel(format!("cache key {key} invalidated"));
        }
        self.store.delete(key).await
    }

    /// Drops every stored result. In-flight runs continue.
    pub async fn flush(&self) {
        self.store.clear().await;
    }

    /// Returns a snapshot of the counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            executions: self.counters.executions.load(Ordering::Relaxed),
            coalesced: self.counters.coalesced.load(Ordering::Relaxed),
            uncacheable: self.counters.uncacheable.load(Ordering::Relaxed),
        }
    }

    /// Returns the number of runs currently in flight.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }
}

impl std::fmt::Debug for LoaderCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoaderCache")
            .field("runner", &self.runner)
            .field("in_flight", &self.in_flight.len())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
