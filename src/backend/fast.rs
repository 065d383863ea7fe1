//! The fast engine: a weak-value map for caches whose entries should live
//! exactly as long as callers hold them. Values are stored as `Weak<V>`:
//! once the last external `Arc<V>` drops, the mapping is reclaimed lazily
//! by reads and sweeps. No expiry, no listeners, no size bound.

use crate::backend::CacheBackend;
use crate::error::LoadError;
use crate::listener::RemovalCause;
use crate::metrics::{Metrics, MetricsSnapshot};

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;

/// Removal reasons native to this engine, translated to the unified
/// [`RemovalCause`] for metrics classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reclaim {
  /// Removed by an invalidation or a clear.
  Dropped,
  /// The last external handle to the value went away.
  Collected,
}

impl Reclaim {
  pub(crate) fn unify(self) -> RemovalCause {
    match self {
      Reclaim::Dropped => RemovalCause::Explicit,
      Reclaim::Collected => RemovalCause::Collected,
    }
  }
}

pub(crate) struct FastBackend<K, V> {
  map: RwLock<HashMap<K, Weak<V>, ahash::RandomState>>,
  metrics: Metrics,
}

impl<K, V> FastBackend<K, V> {
  pub(crate) fn new(initial_capacity: usize) -> Self {
    Self {
      map: RwLock::new(HashMap::with_capacity_and_hasher(
        initial_capacity,
        ahash::RandomState::new(),
      )),
      metrics: Metrics::default(),
    }
  }

  fn record(&self, reclaim: Reclaim) {
    match reclaim.unify() {
      RemovalCause::Explicit => {
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
      }
      RemovalCause::Collected => {
        self
          .metrics
          .evicted_by_collection
          .fetch_add(1, Ordering::Relaxed);
      }
      _ => {}
    }
  }
}

impl<K, V> CacheBackend<K, Arc<V>> for FastBackend<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  fn lookup(&self, key: &K) -> Option<Arc<V>> {
    let upgraded = self.map.read().get(key).map(|weak| weak.upgrade());
    match upgraded {
      Some(Some(value)) => {
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        Some(value)
      }
      Some(None) => {
        // Dead mapping; reclaim it if nobody replaced it meanwhile.
        let mut guard = self.map.write();
        if guard.get(key).map_or(false, |weak| weak.upgrade().is_none()) {
          guard.remove(key);
          self.record(Reclaim::Collected);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
      None => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
    }
  }

  fn load(
    &self,
    key: &K,
    loader: &dyn Fn(&K) -> Result<Arc<V>, LoadError>,
  ) -> Result<Arc<V>, LoadError> {
    if let Some(value) = self.lookup(key) {
      return Ok(value);
    }
    match loader(key) {
      Ok(value) => {
        self.metrics.loads.fetch_add(1, Ordering::Relaxed);
        self.store(key.clone(), value.clone(), None);
        Ok(value)
      }
      Err(err) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        Err(err)
      }
    }
  }

  /// A key with a live value keeps it; inserts only fill absent or dead
  /// slots. Per-entry deadlines are not supported and `ttl` is ignored.
  fn store(&self, key: K, value: Arc<V>, _ttl: Option<Duration>) {
    let mut guard = self.map.write();
    let live = guard.get(&key).map_or(false, |weak| weak.upgrade().is_some());
    if live {
      return;
    }
    if let Some(old) = guard.insert(key, Arc::downgrade(&value)) {
      if old.upgrade().is_none() {
        self.record(Reclaim::Collected);
      }
    }
    self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
  }

  fn set_expiry(&self, _key: &K, _ttl: Duration) -> bool {
    false
  }

  fn remove(&self, key: &K) -> bool {
    let removed = self.map.write().remove(key).is_some();
    if removed {
      self.record(Reclaim::Dropped);
    }
    removed
  }

  fn clear(&self) {
    let mut guard = self.map.write();
    let count = guard.len() as u64;
    guard.clear();
    self.metrics.invalidations.fetch_add(count, Ordering::Relaxed);
  }

  fn clean_up(&self) {
    let mut guard = self.map.write();
    let before = guard.len();
    guard.retain(|_, weak| weak.strong_count() > 0);
    let reclaimed = (before - guard.len()) as u64;
    self
      .metrics
      .evicted_by_collection
      .fetch_add(reclaimed, Ordering::Relaxed);
  }

  /// Counts only mappings whose value is still alive.
  fn len(&self) -> usize {
    self
      .map
      .read()
      .values()
      .filter(|weak| weak.strong_count() > 0)
      .count()
  }

  fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn reclaim_kinds_map_to_unified_causes() {
    assert_eq!(Reclaim::Dropped.unify(), RemovalCause::Explicit);
    assert_eq!(Reclaim::Collected.unify(), RemovalCause::Collected);
  }

  #[test]
  fn collection_counts_as_an_eviction() {
    assert!(!Reclaim::Dropped.unify().is_eviction());
    assert!(Reclaim::Collected.unify().is_eviction());
  }
}
