pub(crate) mod concurrent;
pub(crate) mod fast;
pub(crate) mod strict;

use crate::error::LoadError;
use crate::listener::{ListenerSet, RemovalCause};
use crate::metrics::MetricsSnapshot;

use std::sync::Arc;
use std::time::Duration;

/// The loader configured on the builder, shared with backends that refresh
/// entries in the background.
pub(crate) type DefaultLoader<K, V> = Arc<dyn Fn(&K) -> V + Send + Sync>;

/// The minimal primitive surface a storage engine adapter must provide. The
/// public `Cache` facade layers every convenience operation of the contract
/// over these, so adapters stay small.
pub(crate) trait CacheBackend<K, V>: Send + Sync {
  /// Recency-updating read. Returns `None` for absent or expired entries.
  fn lookup(&self, key: &K) -> Option<V>;

  /// Returns the cached value or runs `loader`, storing its result before
  /// returning it. Loader failures propagate unchanged and store nothing.
  /// Single-flight only on engines that support it.
  fn load(
    &self,
    key: &K,
    loader: &dyn Fn(&K) -> Result<V, LoadError>,
  ) -> Result<V, LoadError>;

  /// Unconditional insert/replace. A `ttl` pins a per-entry deadline that
  /// overrides policy-level expiry until the entry is replaced.
  fn store(&self, key: K, value: V, ttl: Option<Duration>);

  /// Re-deadlines an existing live entry without touching its value.
  /// Returns `false` (no-op) when the key is absent.
  fn set_expiry(&self, key: &K, ttl: Duration) -> bool;

  /// Explicit removal. Returns whether a mapping existed.
  fn remove(&self, key: &K) -> bool;

  /// Explicit removal of every entry.
  fn clear(&self);

  /// Synchronous maintenance sweep: purge expired entries and enforce the
  /// maximum size. May be cheap or a no-op for engines with lazy expiry.
  fn clean_up(&self);

  fn len(&self) -> usize;

  fn metrics(&self) -> MetricsSnapshot;
}

/// The immutable configuration snapshot a backend is constructed from.
/// Copied out of the builder at `build()` time, so later builder mutation
/// never reaches a built instance.
pub(crate) struct BackendConfig<K, V> {
  pub(crate) initial_capacity: usize,
  pub(crate) max_size: Option<u64>,
  /// Shard count for the concurrent engine; always a power of two.
  pub(crate) shards: usize,
  pub(crate) expire_after_access: Option<Duration>,
  pub(crate) expire_after_write: Option<Duration>,
  pub(crate) refresh_after_write: Option<Duration>,
  pub(crate) loader: Option<DefaultLoader<K, V>>,
  pub(crate) listeners: ListenerSet<K, V>,
  pub(crate) janitor_tick: Duration,
}

/// Listener work deferred until after the owning lock is released. "Before"
/// hooks run inline under the lock; these carry the matching "after" hooks.
pub(crate) enum AfterEvent<K, V> {
  Created(K, V),
  Updated { key: K, old: V, new: V },
  Removed(K, V, RemovalCause),
}

pub(crate) fn fire_after<K, V>(listeners: &ListenerSet<K, V>, events: Vec<AfterEvent<K, V>>) {
  for event in events {
    match event {
      AfterEvent::Created(key, value) => {
        if let Some(listener) = &listeners.create {
          listener.after_create(&key, &value);
        }
      }
      AfterEvent::Updated { key, old, new } => {
        if let Some(listener) = &listeners.update {
          listener.after_update(&key, &old, &new);
        }
      }
      AfterEvent::Removed(key, value, cause) => {
        if let Some(listener) = &listeners.remove {
          listener.after_remove(&key, &value, cause);
        }
      }
    }
  }
}
