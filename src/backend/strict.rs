//! The strict engine: a single-lock map with exact LRU order and fully
//! synchronous eviction. Every operation that observes an expired or excess
//! entry removes it on the calling thread, so listener delivery and size
//! bounds are deterministic. Trades throughput for that predictability.

use crate::backend::{fire_after, AfterEvent, BackendConfig, CacheBackend, DefaultLoader};
use crate::entry::CacheEntry;
use crate::error::LoadError;
use crate::listener::{ListenerSet, RemovalCause};
use crate::metrics::{Metrics, MetricsSnapshot};

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;
use std::sync::atomic::Ordering;
use std::time::Duration;

use parking_lot::Mutex;

/// Removal reasons native to this engine, translated to the unified
/// [`RemovalCause`] at the listener boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PurgeKind {
  /// Removed by an invalidation or replaced by a clear.
  Removed,
  /// Displaced by a newer value for the same key.
  Overwritten,
  /// Deadline or idle window elapsed.
  Lapsed,
  /// Evicted to satisfy the maximum size.
  Overflow,
}

impl PurgeKind {
  pub(crate) fn unify(self) -> RemovalCause {
    match self {
      PurgeKind::Removed => RemovalCause::Explicit,
      PurgeKind::Overwritten => RemovalCause::Replaced,
      PurgeKind::Lapsed => RemovalCause::Expired,
      PurgeKind::Overflow => RemovalCause::Size,
    }
  }
}

struct Inner<K, V> {
  map: HashMap<K, CacheEntry<V>, ahash::RandomState>,
  /// Recency order, front = most recently used.
  order: VecDeque<K>,
}

impl<K: Eq + Hash + Clone, V> Inner<K, V> {
  fn promote(&mut self, key: &K) {
    if let Some(pos) = self.order.iter().position(|k| k == key) {
      if let Some(k) = self.order.remove(pos) {
        self.order.push_front(k);
      }
    } else {
      self.order.push_front(key.clone());
    }
  }

  fn take(&mut self, key: &K) -> Option<CacheEntry<V>> {
    let entry = self.map.remove(key)?;
    self.order.retain(|k| k != key);
    Some(entry)
  }
}

enum Probe<V> {
  Miss,
  Expired,
  Hit(V),
  /// Hit on an entry past its refresh threshold.
  Stale,
}

pub(crate) struct StrictBackend<K, V> {
  inner: Mutex<Inner<K, V>>,
  max_size: Option<u64>,
  expire_after_write: Option<Duration>,
  expire_after_access: Option<Duration>,
  refresh_after_write: Option<Duration>,
  loader: Option<DefaultLoader<K, V>>,
  listeners: ListenerSet<K, V>,
  metrics: Metrics,
}

impl<K, V> StrictBackend<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(config: BackendConfig<K, V>) -> Self {
    Self {
      inner: Mutex::new(Inner {
        map: HashMap::with_capacity_and_hasher(
          config.initial_capacity,
          ahash::RandomState::new(),
        ),
        order: VecDeque::new(),
      }),
      max_size: config.max_size,
      expire_after_write: config.expire_after_write,
      expire_after_access: config.expire_after_access,
      refresh_after_write: config.refresh_after_write,
      loader: config.loader,
      listeners: config.listeners,
      metrics: Metrics::default(),
    }
  }

  /// Removes `key` if mapped, firing the before-hook under the lock and
  /// queueing the after-hook.
  fn purge(
    &self,
    inner: &mut Inner<K, V>,
    key: &K,
    kind: PurgeKind,
    events: &mut Vec<AfterEvent<K, V>>,
  ) -> bool {
    let entry = match inner.take(key) {
      Some(entry) => entry,
      None => return false,
    };
    let value = entry.into_value();
    let cause = kind.unify();
    if let Some(listener) = &self.listeners.remove {
      listener.before_remove(key, &value, cause);
    }
    match kind {
      PurgeKind::Removed => {
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
      }
      PurgeKind::Overwritten => {}
      PurgeKind::Lapsed => {
        self.metrics.evicted_by_expiry.fetch_add(1, Ordering::Relaxed);
      }
      PurgeKind::Overflow => {
        self.metrics.evicted_by_size.fetch_add(1, Ordering::Relaxed);
      }
    }
    events.push(AfterEvent::Removed(key.clone(), value, cause));
    true
  }

  /// Purges expired entries found at the cold end of the recency queue.
  fn sweep_tail(&self, inner: &mut Inner<K, V>, events: &mut Vec<AfterEvent<K, V>>) {
    loop {
      let victim = match inner.order.back() {
        Some(key) => match inner.map.get(key) {
          Some(entry) if entry.is_expired(self.expire_after_access) => key.clone(),
          Some(_) => break,
          // Stale queue slot with no mapping; drop it and keep going.
          None => {
            inner.order.pop_back();
            continue;
          }
        },
        None => break,
      };
      self.purge(inner, &victim, PurgeKind::Lapsed, events);
    }
  }

  fn enforce_capacity(&self, inner: &mut Inner<K, V>, events: &mut Vec<AfterEvent<K, V>>) {
    let max = match self.max_size {
      Some(max) => max,
      None => return,
    };
    while inner.map.len() as u64 > max {
      let victim = match inner.order.pop_back() {
        Some(key) => key,
        None => break,
      };
      self.purge(inner, &victim, PurgeKind::Overflow, events);
    }
  }
}

impl<K, V> CacheBackend<K, V> for StrictBackend<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  fn lookup(&self, key: &K) -> Option<V> {
    let mut events = Vec::new();
    let result = {
      let mut inner = self.inner.lock();
      let probe = match inner.map.get(key) {
        None => Probe::Miss,
        Some(entry) if entry.is_expired(self.expire_after_access) => Probe::Expired,
        Some(entry) => {
          if self.expire_after_access.is_some() {
            entry.touch();
          }
          let stale = match (&self.loader, self.refresh_after_write) {
            (Some(_), Some(refresh)) => entry.needs_refresh(refresh),
            _ => false,
          };
          if stale {
            Probe::Stale
          } else {
            Probe::Hit(entry.value().clone())
          }
        }
      };
      match probe {
        Probe::Miss => None,
        Probe::Expired => {
          self.purge(&mut inner, key, PurgeKind::Lapsed, &mut events);
          None
        }
        Probe::Hit(value) => {
          inner.promote(key);
          Some(value)
        }
        Probe::Stale => {
          // This engine has no background machinery: refresh runs inline on
          // the reading thread, under the lock. The loader must not call
          // back into the cache.
          let loader = self.loader.clone();
          let old = inner.map.get(key).map(|entry| entry.value().clone());
          match (loader, old) {
            (Some(loader), Some(old)) => {
              let fresh = loader(key);
              if let Some(listener) = &self.listeners.update {
                listener.before_update(key, &old);
              }
              if let Some(listener) = &self.listeners.remove {
                listener.before_remove(key, &old, RemovalCause::Replaced);
              }
              inner.map.insert(
                key.clone(),
                CacheEntry::new(fresh.clone(), self.expire_after_write, self.expire_after_access),
              );
              inner.promote(key);
              self.metrics.loads.fetch_add(1, Ordering::Relaxed);
              self.metrics.updates.fetch_add(1, Ordering::Relaxed);
              events.push(AfterEvent::Removed(
                key.clone(),
                old.clone(),
                RemovalCause::Replaced,
              ));
              events.push(AfterEvent::Updated {
                key: key.clone(),
                old,
                new: fresh.clone(),
              });
              Some(fresh)
            }
            _ => None,
          }
        }
      }
    };
    match result {
      Some(_) => self.metrics.hits.fetch_add(1, Ordering::Relaxed),
      None => self.metrics.misses.fetch_add(1, Ordering::Relaxed),
    };
    fire_after(&self.listeners, events);
    result
  }

  fn load(
    &self,
    key: &K,
    loader: &dyn Fn(&K) -> Result<V, LoadError>,
  ) -> Result<V, LoadError> {
    if let Some(value) = self.lookup(key) {
      return Ok(value);
    }
    // No single-flight here: concurrent misses on the same key each run the
    // loader. Callers needing coalescing use the concurrent engine.
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

  fn store(&self, key: K, value: V, ttl: Option<Duration>) {
    let mut events = Vec::new();
    {
      let mut inner = self.inner.lock();
      let old = inner
        .map
        .get(&key)
        .map(|entry| (entry.value().clone(), entry.is_expired(self.expire_after_access)));
      match old {
        Some((old_value, expired)) => {
          let kind = if expired {
            PurgeKind::Lapsed
          } else {
            PurgeKind::Overwritten
          };
          if !expired {
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
          self.purge(&mut inner, &key, kind, &mut events);
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
      inner.map.insert(key.clone(), entry);
      inner.promote(&key);
      self.sweep_tail(&mut inner, &mut events);
      self.enforce_capacity(&mut inner, &mut events);
    }
    self.metrics.inserts.fetch_add(1, Ordering::Relaxed);
    fire_after(&self.listeners, events);
  }

  fn set_expiry(&self, key: &K, ttl: Duration) -> bool {
    let mut events = Vec::new();
    let updated = {
      let mut inner = self.inner.lock();
      let state = inner
        .map
        .get(key)
        .map(|entry| entry.is_expired(self.expire_after_access));
      match state {
        None => false,
        Some(true) => {
          self.purge(&mut inner, key, PurgeKind::Lapsed, &mut events);
          false
        }
        Some(false) => {
          if let Some(entry) = inner.map.get(key) {
            entry.set_deadline(ttl);
          }
          true
        }
      }
    };
    fire_after(&self.listeners, events);
    updated
  }

  fn remove(&self, key: &K) -> bool {
    let mut events = Vec::new();
    let removed = {
      let mut inner = self.inner.lock();
      self.purge(&mut inner, key, PurgeKind::Removed, &mut events)
    };
    fire_after(&self.listeners, events);
    removed
  }

  fn clear(&self) {
    let mut events = Vec::new();
    {
      let mut inner = self.inner.lock();
      let drained: Vec<(K, CacheEntry<V>)> = inner.map.drain().collect();
      inner.order.clear();
      for (key, entry) in drained {
        let value = entry.into_value();
        if let Some(listener) = &self.listeners.remove {
          listener.before_remove(&key, &value, RemovalCause::Explicit);
        }
        self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
        events.push(AfterEvent::Removed(key, value, RemovalCause::Explicit));
      }
    }
    fire_after(&self.listeners, events);
  }

  fn clean_up(&self) {
    let mut events = Vec::new();
    {
      let mut inner = self.inner.lock();
      let expired: Vec<K> = inner
        .map
        .iter()
        .filter(|(_, entry)| entry.is_expired(self.expire_after_access))
        .map(|(key, _)| key.clone())
        .collect();
      for key in expired {
        self.purge(&mut inner, &key, PurgeKind::Lapsed, &mut events);
      }
      self.enforce_capacity(&mut inner, &mut events);
    }
    fire_after(&self.listeners, events);
  }

  fn len(&self) -> usize {
    self.inner.lock().map.len()
  }

  fn metrics(&self) -> MetricsSnapshot {
    self.metrics.snapshot()
  }
}
