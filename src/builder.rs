//! Cache configuration. The builder is reusable: `build()` copies the
//! configuration out, so later mutation of the builder never reaches an
//! already-built cache.

use crate::backend::concurrent::ConcurrentBackend;
use crate::backend::strict::StrictBackend;
use crate::backend::{BackendConfig, DefaultLoader};
use crate::cache::Cache;
use crate::error::BuildError;
use crate::listener::{
  CreateListener, ListenerSet, ReadListener, RemoveListener, UpdateListener,
};

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_JANITOR_TICK: Duration = Duration::from_millis(500);

/// Which storage engine backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Engine {
  /// Sharded storage, near-optimal LRU, single-flight loads, background
  /// expiry sweeps. The default.
  #[default]
  Concurrent,
  /// Single-lock storage with exact LRU and fully synchronous eviction.
  /// Lower throughput, deterministic maintenance.
  Strict,
}

/// Builds [`Cache`] instances.
///
/// ```
/// use cachefront::Cache;
/// use std::time::Duration;
///
/// let cache: cachefront::Cache<String, String> = Cache::builder()
///   .max_size(10_000)
///   .expire_after_write(Duration::from_secs(300))
///   .build()
///   .unwrap();
/// ```
pub struct CacheBuilder<K, V> {
  engine: Engine,
  initial_capacity: Option<usize>,
  max_size: Option<u64>,
  concurrency_level: Option<usize>,
  expire_after_write: Option<Duration>,
  expire_after_access: Option<Duration>,
  refresh_after_write: Option<Duration>,
  janitor_tick: Option<Duration>,
  loader: Option<DefaultLoader<K, V>>,
  create_listener: Option<Arc<dyn CreateListener<K, V>>>,
  read_listener: Option<Arc<dyn ReadListener<K, V>>>,
  update_listener: Option<Arc<dyn UpdateListener<K, V>>>,
  remove_listener: Option<Arc<dyn RemoveListener<K, V>>>,
}

impl<K, V> Default for CacheBuilder<K, V> {
  fn default() -> Self {
    Self::new()
  }
}

impl<K, V> fmt::Debug for CacheBuilder<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBuilder")
      .field("engine", &self.engine)
      .field("initial_capacity", &self.initial_capacity)
      .field("max_size", &self.max_size)
      .field("concurrency_level", &self.concurrency_level)
      .field("expire_after_write", &self.expire_after_write)
      .field("expire_after_access", &self.expire_after_access)
      .field("refresh_after_write", &self.refresh_after_write)
      .field("loader", &self.loader.is_some())
      .finish_non_exhaustive()
  }
}

impl<K, V> CacheBuilder<K, V> {
  pub fn new() -> Self {
    Self {
      engine: Engine::default(),
      initial_capacity: None,
      max_size: None,
      concurrency_level: None,
      expire_after_write: None,
      expire_after_access: None,
      refresh_after_write: None,
      janitor_tick: None,
      loader: None,
      create_listener: None,
      read_listener: None,
      update_listener: None,
      remove_listener: None,
    }
  }

  /// Selects the storage engine. Defaults to [`Engine::Concurrent`].
  pub fn engine(mut self, engine: Engine) -> Self {
    self.engine = engine;
    self
  }

  /// Pre-sizes internal tables for roughly this many entries.
  pub fn initial_capacity(mut self, capacity: usize) -> Self {
    self.initial_capacity = Some(capacity);
    self
  }

  /// Bounds the cache to at most `max` entries; least-recently-used entries
  /// are evicted past the bound. Must be non-zero.
  pub fn max_size(mut self, max: u64) -> Self {
    self.max_size = Some(max);
    self
  }

  /// Hint for how many threads will update the cache concurrently. Rounded
  /// up to a power of two and used as the shard count of the concurrent
  /// engine; the strict engine ignores it. Defaults to the number of CPUs.
  pub fn concurrency_level(mut self, level: usize) -> Self {
    self.concurrency_level = Some(level);
    self
  }

  /// Expires entries a fixed duration after they were written.
  pub fn expire_after_write(mut self, ttl: Duration) -> Self {
    self.expire_after_write = Some(ttl);
    self
  }

  /// Expires entries that have not been read or written for `tti`.
  pub fn expire_after_access(mut self, tti: Duration) -> Self {
    self.expire_after_access = Some(tti);
    self
  }

  /// Reloads entries through the configured loader once they are older than
  /// `interval`, instead of expiring them. Readers keep seeing the old value
  /// until the reload lands. Requires [`CacheBuilder::loader`].
  pub fn refresh_after_write(mut self, interval: Duration) -> Self {
    self.refresh_after_write = Some(interval);
    self
  }

  /// How often the concurrent engine's maintenance thread runs. Exposed for
  /// tests that need tight eviction latency.
  #[doc(hidden)]
  pub fn janitor_tick_interval(mut self, tick: Duration) -> Self {
    self.janitor_tick = Some(tick);
    self
  }

  /// Configures the loader used by [`Cache::get_with`] and by
  /// `refresh_after_write`.
  pub fn loader<F>(mut self, loader: F) -> Self
  where
    F: Fn(&K) -> V + Send + Sync + 'static,
  {
    self.loader = Some(Arc::new(loader));
    self
  }

  pub fn create_listener(mut self, listener: Arc<dyn CreateListener<K, V>>) -> Self {
    self.create_listener = Some(listener);
    self
  }

  pub fn read_listener(mut self, listener: Arc<dyn ReadListener<K, V>>) -> Self {
    self.read_listener = Some(listener);
    self
  }

  pub fn update_listener(mut self, listener: Arc<dyn UpdateListener<K, V>>) -> Self {
    self.update_listener = Some(listener);
    self
  }

  pub fn remove_listener(mut self, listener: Arc<dyn RemoveListener<K, V>>) -> Self {
    self.remove_listener = Some(listener);
    self
  }
}

impl<K, V> CacheBuilder<K, V>
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  /// Validates the configuration and builds a cache. The builder can be
  /// reused afterwards; instances built earlier are not affected by later
  /// setter calls.
  pub fn build(&self) -> Result<Cache<K, V>, BuildError> {
    if self.max_size == Some(0) {
      return Err(BuildError::ZeroCapacity);
    }
    for window in [
      self.expire_after_write,
      self.expire_after_access,
      self.refresh_after_write,
      self.janitor_tick,
    ]
    .into_iter()
    .flatten()
    {
      if window.is_zero() {
        return Err(BuildError::ZeroDuration);
      }
    }
    if self.refresh_after_write.is_some() && self.loader.is_none() {
      return Err(BuildError::LoaderRequired);
    }
    if let (Some(refresh), Some(ttl)) = (self.refresh_after_write, self.expire_after_write) {
      // A refresh window at or past the write deadline can never fire.
      if refresh >= ttl {
        return Err(BuildError::ConflictingExpiry);
      }
    }

    let config = BackendConfig {
      initial_capacity: self.initial_capacity.unwrap_or(0),
      max_size: self.max_size,
      shards: self
        .concurrency_level
        .unwrap_or_else(num_cpus::get)
        .max(1)
        .next_power_of_two(),
      expire_after_write: self.expire_after_write,
      expire_after_access: self.expire_after_access,
      refresh_after_write: self.refresh_after_write,
      loader: self.loader.clone(),
      listeners: ListenerSet {
        create: self.create_listener.clone(),
        update: self.update_listener.clone(),
        remove: self.remove_listener.clone(),
      },
      janitor_tick: self.janitor_tick.unwrap_or(DEFAULT_JANITOR_TICK),
    };
    let backend: Arc<dyn crate::backend::CacheBackend<K, V>> = match self.engine {
      Engine::Concurrent => Arc::new(ConcurrentBackend::new(config)),
      Engine::Strict => Arc::new(StrictBackend::new(config)),
    };
    Ok(Cache::from_parts(
      backend,
      self.read_listener.clone(),
      self.loader.clone(),
    ))
  }
}
