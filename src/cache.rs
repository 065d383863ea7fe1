//! The public cache handle. All convenience operations are layered here over
//! the engine's primitive surface, so every engine gets the full contract.

use crate::backend::fast::FastBackend;
use crate::backend::{CacheBackend, DefaultLoader};
use crate::builder::CacheBuilder;
use crate::error::{CacheError, LoadError};
use crate::listener::ReadListener;
use crate::metrics::MetricsSnapshot;

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

/// A thread-safe, in-memory key/value cache.
///
/// Handles are cheap to clone and share one underlying store. Values are
/// returned by clone, so `V` is typically an `Arc<T>` or another cheap-clone
/// type for anything large.
pub struct Cache<K, V> {
  backend: Arc<dyn CacheBackend<K, V>>,
  read_listener: Option<Arc<dyn ReadListener<K, V>>>,
  default_loader: Option<DefaultLoader<K, V>>,
}

impl<K, V> Clone for Cache<K, V> {
  fn clone(&self) -> Self {
    Self {
      backend: self.backend.clone(),
      read_listener: self.read_listener.clone(),
      default_loader: self.default_loader.clone(),
    }
  }
}

impl<K, V> fmt::Debug for Cache<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Cache")
      .field("len", &self.backend.len())
      .finish_non_exhaustive()
  }
}

impl<K, V> Cache<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  /// Starts configuring a new cache.
  pub fn builder() -> CacheBuilder<K, V> {
    CacheBuilder::new()
  }

  pub(crate) fn from_parts(
    backend: Arc<dyn CacheBackend<K, V>>,
    read_listener: Option<Arc<dyn ReadListener<K, V>>>,
    default_loader: Option<DefaultLoader<K, V>>,
  ) -> Self {
    Self {
      backend,
      read_listener,
      default_loader,
    }
  }

  /// A lookup that drives the read-listener hooks. Every read-only retrieval
  /// path funnels through here; loading paths do not, since their outcome is
  /// decided inside the engine.
  fn observed_lookup(&self, key: &K) -> Option<V> {
    if let Some(listener) = &self.read_listener {
      listener.before_read(key);
    }
    let result = self.backend.lookup(key);
    if let Some(listener) = &self.read_listener {
      match &result {
        Some(value) => listener.on_hit(key, value),
        None => listener.on_miss(key),
      }
    }
    result
  }

  /// Returns the value for `key`, or [`CacheError::NotFound`] when absent.
  /// Never runs a loader; see [`Cache::get_with`] for the loading variant.
  pub fn get(&self, key: &K) -> Result<V, CacheError> {
    self.observed_lookup(key).ok_or(CacheError::NotFound)
  }

  /// Returns the value for `key`, or `None` when absent.
  pub fn get_opt(&self, key: &K) -> Option<V> {
    self.observed_lookup(key)
  }

  /// Returns the value for `key`, loading it through the loader configured
  /// on the builder when absent. Fails with [`CacheError::NotFound`] if no
  /// loader was configured.
  pub fn get_with(&self, key: &K) -> Result<V, CacheError> {
    let loader = match &self.default_loader {
      Some(loader) => loader.clone(),
      None => return Err(CacheError::NotFound),
    };
    let fallible = |k: &K| -> Result<V, LoadError> { Ok(loader(k)) };
    self
      .backend
      .load(key, &fallible)
      .map_err(CacheError::Loader)
  }

  /// Returns the value for `key`, or `default` when absent. The default is
  /// not stored.
  pub fn get_or_else(&self, key: &K, default: V) -> V {
    self.observed_lookup(key).unwrap_or(default)
  }

  /// Returns the value for `key`, or computes a fallback when absent. The
  /// fallback is not stored.
  pub fn get_or_else_with<F>(&self, key: &K, default: F) -> V
  where
    F: FnOnce(&K) -> V,
  {
    match self.observed_lookup(key) {
      Some(value) => value,
      None => default(key),
    }
  }

  /// Returns the value for `key`, running `loader` and storing its result
  /// when absent. On the concurrent engine, concurrent callers for the same
  /// absent key share a single loader run.
  pub fn get_or_load<F>(&self, key: &K, loader: F) -> V
  where
    F: Fn(&K) -> V,
  {
    let fallible = |k: &K| -> Result<V, LoadError> { Ok(loader(k)) };
    loop {
      // An error can only come from waiting on a concurrent fallible load
      // for the same key that failed; retry so this call's own loader runs
      // and its result is stored before being returned.
      if let Ok(value) = self.backend.load(key, &fallible) {
        return value;
      }
    }
  }

  /// Like [`Cache::get_or_load`] for loaders that can fail. A loader error
  /// propagates to every caller waiting on that load and stores nothing.
  pub fn try_get_or_load<F, E>(&self, key: &K, loader: F) -> Result<V, CacheError>
  where
    F: Fn(&K) -> Result<V, E>,
    E: std::error::Error + Send + Sync + 'static,
  {
    let fallible =
      |k: &K| -> Result<V, LoadError> { loader(k).map_err(|err| Arc::new(err) as LoadError) };
    self
      .backend
      .load(key, &fallible)
      .map_err(CacheError::Loader)
  }

  /// Returns the present values for `keys`. Absent keys are simply omitted.
  pub fn get_present<I>(&self, keys: I) -> HashMap<K, V>
  where
    I: IntoIterator<Item = K>,
  {
    let mut found = HashMap::new();
    for key in keys {
      if found.contains_key(&key) {
        continue;
      }
      if let Some(value) = self.observed_lookup(&key) {
        found.insert(key, value);
      }
    }
    found
  }

  /// Returns the values for `keys`, calling `batch` once with the slice of
  /// absent keys. Loaded values are stored before the merged map is
  /// returned; when nothing is absent, `batch` is never called.
  pub fn get_all<I, F>(&self, keys: I, batch: F) -> HashMap<K, V>
  where
    I: IntoIterator<Item = K>,
    F: FnOnce(&[K]) -> HashMap<K, V>,
  {
    let mut found = HashMap::new();
    let mut missing: Vec<K> = Vec::new();
    for key in keys {
      if found.contains_key(&key) || missing.contains(&key) {
        continue;
      }
      match self.observed_lookup(&key) {
        Some(value) => {
          found.insert(key, value);
        }
        None => missing.push(key),
      }
    }
    if !missing.is_empty() {
      let loaded = batch(&missing);
      for (key, value) in &loaded {
        self.backend.store(key.clone(), value.clone(), None);
      }
      found.extend(loaded);
    }
    found
  }

  /// Inserts or replaces the value for `key` under the cache-level expiry
  /// policy.
  pub fn put(&self, key: K, value: V) {
    self.backend.store(key, value, None);
  }

  /// Inserts or replaces the value for `key` with a per-entry deadline of
  /// `ttl` from now, overriding the cache-level policy for this entry.
  pub fn put_with_expiry(&self, key: K, value: V, ttl: Duration) {
    self.backend.store(key, value, Some(ttl));
  }

  pub fn put_all<I>(&self, entries: I)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    for (key, value) in entries {
      self.backend.store(key, value, None);
    }
  }

  pub fn put_all_with_expiry<I>(&self, entries: I, ttl: Duration)
  where
    I: IntoIterator<Item = (K, V)>,
  {
    for (key, value) in entries {
      self.backend.store(key, value, Some(ttl));
    }
  }

  /// Re-deadlines the live entry for `key` to `ttl` from now without
  /// touching its value. Returns `false` (and changes nothing) when the key
  /// is absent or already expired.
  pub fn expire(&self, key: &K, ttl: Duration) -> bool {
    self.backend.set_expiry(key, ttl)
  }

  pub fn expire_all<I>(&self, keys: I, ttl: Duration)
  where
    I: IntoIterator<Item = K>,
  {
    for key in keys {
      self.backend.set_expiry(&key, ttl);
    }
  }

  /// Removes the entry for `key`. Returns whether a mapping existed. A
  /// remove-listener observes cause `Explicit`.
  pub fn invalidate(&self, key: &K) -> bool {
    self.backend.remove(key)
  }

  pub fn invalidate_keys<I>(&self, keys: I)
  where
    I: IntoIterator<Item = K>,
  {
    for key in keys {
      self.backend.remove(&key);
    }
  }

  /// Removes every entry. Each removal observes cause `Explicit`.
  pub fn invalidate_all(&self) {
    self.backend.clear();
  }

  /// Runs any pending maintenance synchronously: expired entries are purged
  /// and the size bound is enforced before this returns.
  pub fn clean_up(&self) {
    self.backend.clean_up();
  }

  /// The number of entries currently stored, counting entries whose expiry
  /// has lapsed but which have not been swept yet.
  pub fn len(&self) -> usize {
    self.backend.len()
  }

  pub fn is_empty(&self) -> bool {
    self.backend.len() == 0
  }

  /// A point-in-time snapshot of this cache's counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.backend.metrics()
  }
}

impl<K, V> Cache<K, Arc<V>>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Send + Sync + 'static,
{
  /// Builds a weak-value cache: entries live exactly as long as some caller
  /// still holds the returned `Arc<V>`, then get reclaimed. No expiry, no
  /// size bound, no listeners; a key with a live value keeps it, so `put`
  /// on a live key is a no-op.
  pub fn new_fast() -> Self {
    Self::new_fast_with_capacity(0)
  }

  pub fn new_fast_with_capacity(initial_capacity: usize) -> Self {
    Self {
      backend: Arc::new(FastBackend::new(initial_capacity)),
      read_listener: None,
      default_loader: None,
    }
  }
}
