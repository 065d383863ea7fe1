//! The concurrent engine: sharded storage with per-shard recency queues,
//! single-flight loads, and a janitor thread for expiry sweeps. Capacity is
//! still enforced promptly on the write path; the janitor only backstops
//! expiry and any slack the write path could not claim.

use crate::backend::{fire_after, AfterEvent, BackendConfig, CacheBackend, DefaultLoader};
use crate::entry::CacheEntry;
use crate::error::{LoadAborted, LoadError};
use crate::listener::{ListenerSet, RemovalCause};
use crate::loader::LoadFuture;
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::store::ShardedStore;
use crate::task::janitor::{self, Janitor};

use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Removal reasons native to this engine, translated to the unified
/// [`RemovalCause`] at the listener boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum EvictionReason {
  /// Removed by an invalidation or a clear.
  Invalidated,
  /// Displaced by a newer value for the same key.
  Displaced,
  /// Deadline or idle window elapsed.
  Expired,
  /// Evicted to satisfy the maximum size.
  Capacity,
}

impl EvictionReason {
  pub(crate) fn unify(self) -> RemovalCause {
    match self {
      EvictionReason::Invalidated => RemovalCause::Explicit,
      EvictionReason::Displaced => RemovalCause::Replaced,
      EvictionReason::Expired => RemovalCause::Expired,
      EvictionReason::Capacity => RemovalCause::Size,
    }
  }
}

/// State shared between cache handles, in-flight refresh threads, and the
/// janitor.
pub(crate) struct Shared<K, V> {
  pub(crate) store: ShardedStore<K, V>,
  pub(crate) metrics: Metrics,
  pub(crate) max_size: Option<u64>,
  pub(crate) expire_after_write: Option<Duration>,
  pub(crate) expire_after_access: Option<Duration>,
  pub(crate) refresh_after_write: Option<Duration>,
  pub(crate) loader: Option<DefaultLoader<K, V>>,
  pub(crate) listeners: ListenerSet<K, V>,
}

/// Clears a key's in-flight load if the loader never reaches an outcome.
/// A panicking loader unwinds through this guard, which removes the flight
/// and fails the future so parked waiters see an error instead of a wedged
/// key. Settled on the normal completion paths.
struct FlightGuard<K: Eq + Hash + Clone, V> {
  shared: Arc<Shared<K, V>>,
  key: K,
  future: Arc<LoadFuture<V>>,
  settled: bool,
}

impl<K: Eq + Hash + Clone, V> FlightGuard<K, V> {
  fn new(shared: Arc<Shared<K, V>>, key: K, future: Arc<LoadFuture<V>>) -> Self {
    Self {
      shared,
      key,
      future,
      settled: false,
    }
  }

  /// The flight reached an outcome and has already been cleared.
  fn settle(mut self) {
    self.settled = true;
  }
}

impl<K: Eq + Hash + Clone, V> Drop for FlightGuard<K, V> {
  fn drop(&mut self) {
    if self.settled {
      return;
    }
    self
      .shared
      .store
      .shard_for(&self.key)
      .pending
      .lock()
      .remove(&self.key);
    self.shared.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
    self.future.fail(Arc::new(LoadAborted));
  }
}

enum Probe<V> {
  Miss,
  /// Expired under the read lock; confirm and purge under the write lock.
  ExpiredCandidate,
  Hit { value: V, stale: bool },
}

impl<K, V> Shared<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  pub(crate) fn read_entry(self: &Arc<Self>, key: &K) -> Option<V> {
    let shard = self.store.shard_for(key);
    let probe = {
      let guard = shard.map.read();
      match guard.get(key) {
        None => Probe::Miss,
        Some(entry) if entry.is_expired(self.expire_after_access) => Probe::ExpiredCandidate,
        Some(entry) => {
          if self.expire_after_access.is_some() {
            entry.touch();
          }
          let stale = match (&self.loader, self.refresh_after_write) {
            (Some(_), Some(refresh)) => entry.needs_refresh(refresh),
            _ => false,
          };
          Probe::Hit {
            value: entry.value().clone(),
            stale,
          }
        }
      }
    };
    match probe {
      Probe::Miss => {
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
      Probe::ExpiredCandidate => {
        let mut events = Vec::new();
        {
          let mut guard = shard.map.write();
          let still_expired = guard
            .get(key)
            .map_or(false, |entry| entry.is_expired(self.expire_after_access));
          if still_expired {
            if let Some(entry) = guard.remove(key) {
              let value = entry.value().clone();
              let cause = EvictionReason::Expired.unify();
              if let Some(listener) = &self.listeners.remove {
                listener.before_remove(key, &value, cause);
              }
              self.metrics.evicted_by_expiry.fetch_add(1, Ordering::Relaxed);
              events.push(AfterEvent::Removed(key.clone(), value, cause));
            }
          }
        }
        // Only drop the recency slot if the purge went through; the
        // re-check can find the entry live again when a write landed
        // between the two locks.
        if !events.is_empty() {
          shard.forget(key);
        }
        fire_after(&self.listeners, events);
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);
        None
      }
      Probe::Hit { value, stale } => {
        shard.note_use(key);
        self.metrics.hits.fetch_add(1, Ordering::Relaxed);
        if stale {
          self.trigger_refresh(key);
        }
        Some(value)
      }
    }
  }

  pub(crate) fn write_entry(&self, key: K, value: V, ttl: Option<Duration>) {
    let shard = self.store.shard_for(&key);
    let mut events = Vec::new();
    {
      let mut guard = shard.map.write();
      let old = guard.get(&key).cloned();
      match old {
        Some(entry) => {
          let expired = entry.is_expired(self.expire_after_access);
          let old_value = entry.value().clone();
          let reason = if expired {
            EvictionReason::Expired
          } else {
            EvictionReason::Displaced
          };
          let cause = reason.unify();
          if expired {
            self.metrics.evicted_by_expiry.fetch_add(1, Ordering::Relaxed);
          } else {
            if let Some(listener) = &self.listeners.update {
              listener.before_update(&key, &old_value);
            }
            self.metrics.updates.fetch_add(1, Ordering::Relaxed);
            events.push(AfterEvent::Updated {
              key: key.clone(),
              old: old_value.clone(),
              new: value.clone(),
            });
          }
          if let Some(listener) = &self.listeners.remove {
            listener.before_remove(&key, &old_value, cause);
          }
          events.push(AfterEvent::Removed(key.clone(), old_value, cause));
        }
        None => {
          if let Some(listener) = &self.listeners.create {
            listener.before_create(&key);
          }
          events.push(AfterEvent::Created(key.clone(), value.clone()));
        }
      }
      let entry = match ttl {
        Some(deadline) => CacheEntry::new_pinned(value, deadline),
        None => CacheEntry::new(value, self.expire_after_write, self.expire_after_access),
      };
      guard.insert(key.clone(), Arc::new(entry));
    }
    shard.note_use(&key);
    self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
    fire_after(&self.listeners, events);
    // Prompt enforcement keeps the cache near its bound between janitor
    // ticks.
    janitor::enforce_capacity(self);
  }

  pub(crate) fn load_value(
    self: &Arc<Self>,
    key: &K,
    loader: &dyn Fn(&K) -> Result<V, LoadError>,
  ) -> Result<V, LoadError> {
    if let Some(value) = self.read_entry(key) {
      return Ok(value);
    }
    let shard = self.store.shard_for(key);
    let (future, leader) = {
      let mut pending = shard.pending.lock();
      match pending.get(key) {
        Some(future) => (future.clone(), false),
        None => {
          // Re-check the map under the pending lock: a load that finished
          // between our miss and acquiring this lock has already stored
          // its value and cleared its flight.
          let landed = {
            let guard = shard.map.read();
            guard
              .get(key)
              .filter(|entry| !entry.is_expired(self.expire_after_access))
              .map(|entry| entry.value().clone())
          };
          if let Some(value) = landed {
            self.metrics.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(value);
          }
          let future = Arc::new(LoadFuture::new());
          pending.insert(key.clone(), future.clone());
          (future, true)
        }
      }
    };
    if !leader {
      // Another thread is already loading this key; park until it finishes.
      return future.wait();
    }
    let guard = FlightGuard::new(Arc::clone(self), key.clone(), future.clone());
    match loader(key) {
      Ok(value) => {
        self.metrics.loads.fetch_add(1, Ordering::Relaxed);
        self.write_entry(key.clone(), value.clone(), None);
        shard.pending.lock().remove(key);
        future.complete(value.clone());
        guard.settle();
        Ok(value)
      }
      Err(err) => {
        self.metrics.load_failures.fetch_add(1, Ordering::Relaxed);
        shard.pending.lock().remove(key);
        future.fail(err.clone());
        guard.settle();
        Err(err)
      }
    }
  }

  pub(crate) fn remove_entry(&self, key: &K) -> bool {
    let shard = self.store.shard_for(key);
    let mut events = Vec::new();
    let removed = {
      let mut guard = shard.map.write();
      match guard.remove(key) {
        Some(entry) => {
          let value = entry.value().clone();
          let cause = EvictionReason::Invalidated.unify();
          if let Some(listener) = &self.listeners.remove {
            listener.before_remove(key, &value, cause);
          }
          events.push(AfterEvent::Removed(key.clone(), value, cause));
          true
        }
        None => false,
      }
    };
    if removed {
      shard.forget(key);
      self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
    }
    fire_after(&self.listeners, events);
    removed
  }

  pub(crate) fn clear_all(&self) {
    for shard in self.store.shards.iter() {
      let mut events = Vec::new();
      {
        let mut guard = shard.map.write();
        for (key, entry) in guard.drain() {
          let value = entry.value().clone();
          let cause = EvictionReason::Invalidated.unify();
          if let Some(listener) = &self.listeners.remove {
            listener.before_remove(&key, &value, cause);
          }
          self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
          events.push(AfterEvent::Removed(key, value, cause));
        }
      }
      shard.clear_recency();
      fire_after(&self.listeners, events);
    }
  }

  pub(crate) fn set_deadline(&self, key: &K, ttl: Duration) -> bool {
    let shard = self.store.shard_for(key);
    let guard = shard.map.read();
    match guard.get(key) {
      // Expired entries look absent; the janitor reclaims them.
      Some(entry) if !entry.is_expired(self.expire_after_access) => {
        entry.set_deadline(ttl);
        true
      }
      _ => false,
    }
  }

  /// Kicks off a background reload for an entry past its refresh threshold.
  /// At most one refresh per key is in flight; readers keep seeing the old
  /// value until the new one lands.
  fn trigger_refresh(self: &Arc<Self>, key: &K) {
    let loader = match &self.loader {
      Some(loader) => loader.clone(),
      None => return,
    };
    let shard = self.store.shard_for(key);
    let mut pending = match shard.pending.try_lock() {
      Some(pending) => pending,
      None => return,
    };
    if pending.contains_key(key) {
      return;
    }
    let future = Arc::new(LoadFuture::new());
    pending.insert(key.clone(), future.clone());
    drop(pending);
    let shared = Arc::clone(self);
    let key = key.clone();
    thread::spawn(move || {
      let guard = FlightGuard::new(Arc::clone(&shared), key.clone(), future.clone());
      let value = loader(&key);
      shared.metrics.loads.fetch_add(1, Ordering::Relaxed);
      shared.write_entry(key.clone(), value.clone(), None);
      shared.store.shard_for(&key).pending.lock().remove(&key);
      future.complete(value);
      guard.settle();
    });
  }
}

pub(crate) struct ConcurrentBackend<K, V> {
  shared: Arc<Shared<K, V>>,
  janitor: Option<Janitor>,
}

impl<K, V> ConcurrentBackend<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(config: BackendConfig<K, V>) -> Self {
    let needs_janitor = config.max_size.is_some()
      || config.expire_after_write.is_some()
      || config.expire_after_access.is_some();
    let shared = Arc::new(Shared {
      store: ShardedStore::new(config.shards, config.initial_capacity),
      metrics: Metrics::default(),
      max_size: config.max_size,
      expire_after_write: config.expire_after_write,
      expire_after_access: config.expire_after_access,
      refresh_after_write: config.refresh_after_write,
      loader: config.loader,
      listeners: config.listeners,
    });
    let janitor = if needs_janitor {
      Some(Janitor::spawn(shared.clone(), config.janitor_tick))
    } else {
      None
    };
    Self { shared, janitor }
  }
}

impl<K, V> Drop for ConcurrentBackend<K, V> {
  fn drop(&mut self) {
    if let Some(janitor) = &self.janitor {
      janitor.stop();
    }
  }
}

impl<K, V> CacheBackend<K, V> for ConcurrentBackend<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  fn lookup(&self, key: &K) -> Option<V> {
    self.shared.read_entry(key)
  }

  fn load(
    &self,
    key: &K,
    loader: &dyn Fn(&K) -> Result<V, LoadError>,
  ) -> Result<V, LoadError> {
    self.shared.load_value(key, loader)
  }

  fn store(&self, key: K, value: V, ttl: Option<Duration>) {
    self.shared.write_entry(key, value, ttl);
  }

  fn set_expiry(&self, key: &K, ttl: Duration) -> bool {
    self.shared.set_deadline(key, ttl)
  }

  fn remove(&self, key: &K) -> bool {
    self.shared.remove_entry(key)
  }

  fn clear(&self) {
    self.shared.clear_all();
  }

  fn clean_up(&self) {
    janitor::run_maintenance(&self.shared);
  }

  fn len(&self) -> usize {
    self.shared.store.len()
  }

  fn metrics(&self) -> MetricsSnapshot {
    self.shared.metrics.snapshot()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn eviction_reasons_map_to_unified_causes() {
    assert_eq!(EvictionReason::Invalidated.unify(), RemovalCause::Explicit);
    assert_eq!(EvictionReason::Displaced.unify(), RemovalCause::Replaced);
    assert_eq!(EvictionReason::Expired.unify(), RemovalCause::Expired);
    assert_eq!(EvictionReason::Capacity.unify(), RemovalCause::Size);
  }

  #[test]
  fn only_expiry_and_capacity_count_as_evictions() {
    assert!(!EvictionReason::Invalidated.unify().is_eviction());
    assert!(!EvictionReason::Displaced.unify().is_eviction());
    assert!(EvictionReason::Expired.unify().is_eviction());
    assert!(EvictionReason::Capacity.unify().is_eviction());
  }
}
