use once_cell::sync::Lazy;
use std::time::{Duration, Instant};

// All timestamps in the crate are u64 nanoseconds measured from this
// process-wide monotonic epoch, initialized lazily on first use.
static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// The current time as nanoseconds since the cache epoch.
#[inline]
pub(crate) fn now_nanos() -> u64 {
  Instant::now().saturating_duration_since(*EPOCH).as_nanos() as u64
}

/// Converts a relative duration into an absolute deadline in epoch nanoseconds.
#[inline]
pub(crate) fn deadline_after(ttl: Duration) -> u64 {
  now_nanos().saturating_add(ttl.as_nanos() as u64)
}
