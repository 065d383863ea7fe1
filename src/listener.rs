use std::fmt;
use std::sync::Arc;

/// The unified taxonomy describing why an entry left the cache.
///
/// Every backend engine keeps its own native cause enumeration; each adapter
/// translates natively before invoking the caller's [`RemoveListener`], so
/// callers only ever observe these five values regardless of the engine
/// selected at build time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
  /// The entry was explicitly removed by the caller.
  Explicit,
  /// The entry's value was replaced by a newer write.
  Replaced,
  /// The entry's value was reclaimed because nothing referenced it anymore
  /// (weak-value fast caches only).
  Collected,
  /// The entry's expiration deadline passed.
  Expired,
  /// The entry was evicted to keep the cache within its maximum size.
  Size,
}

impl RemovalCause {
  /// Returns `true` when the removal was an automatic eviction, i.e. the
  /// cause is neither [`Explicit`](Self::Explicit) nor
  /// [`Replaced`](Self::Replaced).
  pub fn is_eviction(&self) -> bool {
    !matches!(self, RemovalCause::Explicit | RemovalCause::Replaced)
  }
}

impl fmt::Display for RemovalCause {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RemovalCause::Explicit => write!(f, "explicitly removed"),
      RemovalCause::Replaced => write!(f, "replaced by a newer value"),
      RemovalCause::Collected => write!(f, "value no longer referenced"),
      RemovalCause::Expired => write!(f, "expired"),
      RemovalCause::Size => write!(f, "evicted due to size"),
    }
  }
}

// Listener hooks run synchronously on the thread performing the mutation
// (or on the owning engine's maintenance thread for automatic evictions).
// "Before" hooks run under the backend's lock, ahead of the mutation
// becoming visible; a listener must not call back into the cache, and a
// slow listener stalls the invoking thread. All hooks default to no-ops so
// implementors override only what they observe.

/// Observes entries being created (first insert or load for a key).
pub trait CreateListener<K, V>: Send + Sync {
  fn before_create(&self, _key: &K) {}
  fn after_create(&self, _key: &K, _value: &V) {}
}

/// Observes read attempts through the cache contract.
pub trait ReadListener<K, V>: Send + Sync {
  fn before_read(&self, _key: &K) {}
  fn on_hit(&self, _key: &K, _value: &V) {}
  fn on_miss(&self, _key: &K) {}
}

/// Observes an existing entry's value being replaced.
pub trait UpdateListener<K, V>: Send + Sync {
  fn before_update(&self, _key: &K, _old_value: &V) {}
  fn after_update(&self, _key: &K, _old_value: &V, _new_value: &V) {}
}

/// Observes entries leaving the cache, with the unified [`RemovalCause`].
pub trait RemoveListener<K, V>: Send + Sync {
  fn before_remove(&self, _key: &K, _value: &V, _cause: RemovalCause) {}
  fn after_remove(&self, _key: &K, _value: &V, _cause: RemovalCause) {}
}

/// The mutation-side listeners shared with a backend. The read listener is
/// driven by the facade, which owns every read path.
pub(crate) struct ListenerSet<K, V> {
  pub(crate) create: Option<Arc<dyn CreateListener<K, V>>>,
  pub(crate) update: Option<Arc<dyn UpdateListener<K, V>>>,
  pub(crate) remove: Option<Arc<dyn RemoveListener<K, V>>>,
}

impl<K, V> Default for ListenerSet<K, V> {
  fn default() -> Self {
    Self {
      create: None,
      update: None,
      remove: None,
    }
  }
}

impl<K, V> Clone for ListenerSet<K, V> {
  fn clone(&self) -> Self {
    Self {
      create: self.create.clone(),
      update: self.update.clone(),
      remove: self.remove.clone(),
    }
  }
}
