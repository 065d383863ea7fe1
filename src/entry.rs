use crate::time;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

/// A container for a value in the cache, holding expiry and recency metadata.
#[derive(Debug)]
pub(crate) struct CacheEntry<V> {
  value: V,
  /// Absolute expiration deadline in epoch nanoseconds. 0 means no deadline.
  expires_at: AtomicU64,
  /// Set when the deadline came from a per-entry override (`put_with_expiry`
  /// or `expire`). A pinned deadline suppresses the policy-level TTL and TTI
  /// until the entry is replaced.
  pinned: AtomicBool,
  /// Last access in epoch nanoseconds, for time-to-idle. 0 means untracked.
  last_accessed: AtomicU64,
  /// Creation timestamp in epoch nanoseconds, for refresh-after-write.
  written_at: AtomicU64,
}

impl<V> CacheEntry<V> {
  /// Creates an entry whose deadline derives from the policy-level TTL.
  pub(crate) fn new(value: V, ttl: Option<Duration>, tti: Option<Duration>) -> Self {
    let now = time::now_nanos();
    Self {
      value,
      expires_at: AtomicU64::new(ttl.map_or(0, |d| now.saturating_add(d.as_nanos() as u64))),
      pinned: AtomicBool::new(false),
      last_accessed: AtomicU64::new(tti.map_or(0, |_| now)),
      written_at: AtomicU64::new(now),
    }
  }

  /// Creates an entry with a per-entry deadline overriding the policy TTL/TTI.
  pub(crate) fn new_pinned(value: V, ttl: Duration) -> Self {
    let now = time::now_nanos();
    Self {
      value,
      expires_at: AtomicU64::new(time::deadline_after(ttl)),
      pinned: AtomicBool::new(true),
      last_accessed: AtomicU64::new(0),
      written_at: AtomicU64::new(now),
    }
  }

  #[inline]
  pub(crate) fn value(&self) -> &V {
    &self.value
  }

  #[inline]
  pub(crate) fn into_value(self) -> V {
    self.value
  }

  /// Replaces the deadline with a per-entry override.
  pub(crate) fn set_deadline(&self, ttl: Duration) {
    self.expires_at.store(time::deadline_after(ttl), Ordering::Relaxed);
    self.pinned.store(true, Ordering::Relaxed);
  }

  /// Updates the last accessed timestamp. Cheap atomic store.
  #[inline]
  pub(crate) fn touch(&self) {
    self.last_accessed.store(time::now_nanos(), Ordering::Relaxed);
  }

  /// Checks whether the entry is expired under its own deadline, or under the
  /// policy-level time-to-idle when no per-entry override pins it.
  pub(crate) fn is_expired(&self, tti: Option<Duration>) -> bool {
    let now = time::now_nanos();

    let expires_at = self.expires_at.load(Ordering::Relaxed);
    if expires_at > 0 && now >= expires_at {
      return true;
    }

    if self.pinned.load(Ordering::Relaxed) {
      // An explicit deadline takes precedence over policy expiry.
      return false;
    }

    if let Some(tti) = tti {
      let last_accessed = self.last_accessed.load(Ordering::Relaxed);
      if now >= last_accessed.saturating_add(tti.as_nanos() as u64) {
        return true;
      }
    }

    false
  }

  /// Whether the entry is older than the refresh-after-write horizon.
  #[inline]
  pub(crate) fn needs_refresh(&self, refresh: Duration) -> bool {
    let written = self.written_at.load(Ordering::Relaxed);
    time::now_nanos() >= written.saturating_add(refresh.as_nanos() as u64)
  }
}
