use crate::entry::CacheEntry;
use crate::loader::LoadFuture;

use core::fmt;
use std::collections::{HashMap, VecDeque};
use std::hash::{BuildHasher, Hash, Hasher};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::{Mutex, RwLock};

/// Hashes a key with the store's `BuildHasher`.
#[inline]
pub(crate) fn hash_key<K: Hash>(hasher: &ahash::RandomState, key: &K) -> u64 {
  let mut state = hasher.build_hasher();
  key.hash(&mut state);
  state.finish()
}

/// One independently locked partition of the concurrent engine's storage.
pub(crate) struct Shard<K, V> {
  pub(crate) map: RwLock<HashMap<K, Arc<CacheEntry<V>>, ahash::RandomState>>,
  /// Recency queue; the front is the most recently used key.
  recency: Mutex<VecDeque<K>>,
  /// In-flight loads for keys owned by this shard.
  pub(crate) pending: Mutex<HashMap<K, Arc<LoadFuture<V>>, ahash::RandomState>>,
}

impl<K, V> Shard<K, V>
where
  K: Eq + Hash + Clone,
{
  fn new(initial_capacity: usize) -> Self {
    Self {
      map: RwLock::new(HashMap::with_capacity_and_hasher(
        initial_capacity,
        ahash::RandomState::new(),
      )),
      recency: Mutex::new(VecDeque::new()),
      pending: Mutex::new(HashMap::with_hasher(ahash::RandomState::new())),
    }
  }

  /// Marks a key as the most recently used in this shard, inserting it into
  /// the queue if it is not yet tracked.
  pub(crate) fn note_use(&self, key: &K) {
    let mut order = self.recency.lock();
    if let Some(pos) = order.iter().position(|k| k == key) {
      if let Some(k) = order.remove(pos) {
        order.push_front(k);
        return;
      }
    }
    order.push_front(key.clone());
  }

  /// Stops tracking a key's recency.
  pub(crate) fn forget(&self, key: &K) {
    self.recency.lock().retain(|k| k != key);
  }

  /// Pops the least recently used key. The caller is responsible for
  /// verifying the key still maps to a live entry.
  pub(crate) fn pop_lru(&self) -> Option<K> {
    self.recency.lock().pop_back()
  }

  pub(crate) fn clear_recency(&self) {
    self.recency.lock().clear();
  }
}

/// A cache store partitioned into multiple, independently locked shards, so
/// operations on different keys rarely contend for the same lock.
pub(crate) struct ShardedStore<K, V> {
  pub(crate) shards: Box<[CachePadded<Shard<K, V>>]>,
  pub(crate) hasher: ahash::RandomState,
}

impl<K, V> fmt::Debug for ShardedStore<K, V> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ShardedStore")
      .field("num_shards", &self.shards.len())
      .finish()
  }
}

impl<K, V> ShardedStore<K, V>
where
  K: Eq + Hash + Clone,
{
  /// Creates a store with `num_shards` partitions (must be a power of two)
  /// splitting `initial_capacity` between them.
  pub(crate) fn new(num_shards: usize, initial_capacity: usize) -> Self {
    debug_assert!(num_shards.is_power_of_two());
    let per_shard = initial_capacity / num_shards;
    let shards = (0..num_shards)
      .map(|_| CachePadded::new(Shard::new(per_shard)))
      .collect::<Vec<_>>();

    Self {
      shards: shards.into_boxed_slice(),
      hasher: ahash::RandomState::new(),
    }
  }

  #[inline]
  pub(crate) fn shard_index(&self, key: &K) -> usize {
    // Shard counts are powers of two, so the mask is exact.
    hash_key(&self.hasher, key) as usize & (self.shards.len() - 1)
  }

  #[inline]
  pub(crate) fn shard_for(&self, key: &K) -> &Shard<K, V> {
    &self.shards[self.shard_index(key)]
  }

  /// Total number of mapped entries, expired or not.
  pub(crate) fn len(&self) -> usize {
    self.shards.iter().map(|s| s.map.read().len()).sum()
  }
}
