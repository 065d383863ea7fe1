//! Background maintenance for the concurrent engine. One janitor thread per
//! cache instance sweeps expired entries and claims any capacity slack the
//! write path left behind. The sweep visits every shard each tick, so
//! expiry-driven listener delivery is bounded by the tick interval.

use crate::backend::concurrent::{EvictionReason, Shared};
use crate::backend::{fire_after, AfterEvent};

use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

pub(crate) struct Janitor {
  stop_flag: Arc<AtomicBool>,
  _handle: JoinHandle<()>,
}

impl Janitor {
  pub(crate) fn spawn<K, V>(shared: Arc<Shared<K, V>>, tick: Duration) -> Self
  where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
  {
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop = stop_flag.clone();
    let handle = thread::spawn(move || {
      while !stop.load(Ordering::Relaxed) {
        let started = Instant::now();
        run_maintenance(&shared);
        if let Some(remaining) = tick.checked_sub(started.elapsed()) {
          thread::sleep(remaining);
        }
      }
    });
    Self {
      stop_flag,
      _handle: handle,
    }
  }

  /// Signals the thread to exit; it stops after the in-progress tick.
  pub(crate) fn stop(&self) {
    self.stop_flag.store(true, Ordering::Relaxed);
  }
}

pub(crate) fn run_maintenance<K, V>(shared: &Shared<K, V>)
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  sweep_expired(shared);
  enforce_capacity(shared);
}

/// Removes every expired entry, shard by shard. Before-hooks run under the
/// shard lock, after-hooks once it is released.
pub(crate) fn sweep_expired<K, V>(shared: &Shared<K, V>)
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  for shard in shared.store.shards.iter() {
    let mut events = Vec::new();
    {
      let mut guard = shard.map.write();
      let victims: Vec<K> = guard
        .iter()
        .filter(|(_, entry)| entry.is_expired(shared.expire_after_access))
        .map(|(key, _)| key.clone())
        .collect();
      for key in victims {
        if let Some(entry) = guard.remove(&key) {
          let value = entry.value().clone();
          let cause = EvictionReason::Expired.unify();
          if let Some(listener) = &shared.listeners.remove {
            listener.before_remove(&key, &value, cause);
          }
          shared.metrics.evicted_by_expiry.fetch_add(1, Ordering::Relaxed);
          events.push(AfterEvent::Removed(key, value, cause));
        }
      }
    }
    for event in events.iter() {
      if let AfterEvent::Removed(key, _, _) = event {
        shard.forget(key);
      }
    }
    fire_after(&shared.listeners, events);
  }
}

/// Evicts least-recently-used entries until the cache is within its bound.
/// Walks the shards round-robin so no single shard absorbs the whole debt.
pub(crate) fn enforce_capacity<K, V>(shared: &Shared<K, V>)
where
  K: Eq + Hash + Clone + Send + Sync + 'static,
  V: Clone + Send + Sync + 'static,
{
  let max = match shared.max_size {
    Some(max) => max as usize,
    None => return,
  };
  let mut total = shared.store.len();
  while total > max {
    let mut progressed = false;
    for shard in shared.store.shards.iter() {
      if total <= max {
        break;
      }
      // Recency queues may hold keys whose mapping is already gone; pop
      // until a live victim turns up.
      while let Some(victim) = shard.pop_lru() {
        let mut events = Vec::new();
        let removed = {
          let mut guard = shard.map.write();
          match guard.remove(&victim) {
            Some(entry) => {
              let value = entry.value().clone();
              let cause = EvictionReason::Capacity.unify();
              if let Some(listener) = &shared.listeners.remove {
                listener.before_remove(&victim, &value, cause);
              }
              events.push(AfterEvent::Removed(victim.clone(), value, cause));
              true
            }
            None => false,
          }
        };
        if removed {
          shared.metrics.evicted_by_size.fetch_add(1, Ordering::Relaxed);
          total -= 1;
          progressed = true;
          fire_after(&shared.listeners, events);
          break;
        }
      }
    }
    if !progressed {
      break;
    }
  }
}
