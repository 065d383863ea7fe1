use std::fmt;
use std::sync::Arc;

/// Shared representation of a caller-supplied loader failure.
pub type LoadError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Failure handed to single-flight waiters when the leading loader panicked
/// instead of producing an outcome.
#[derive(Debug)]
pub(crate) struct LoadAborted;

impl fmt::Display for LoadAborted {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "loader panicked before completing")
  }
}

impl std::error::Error for LoadAborted {}

/// Errors that can occur when building a cache.
#[derive(Debug, Clone)]
pub enum BuildError {
  /// The cache was configured with a maximum size of zero. Leave `max_size`
  /// unset for an unbounded cache.
  ZeroCapacity,
  /// An expiry or refresh duration of zero was configured.
  ZeroDuration,
  /// `refresh_after_write` was configured without a loader; there is nothing
  /// to refresh entries with.
  LoaderRequired,
  /// `refresh_after_write` is not shorter than `expire_after_write`, so every
  /// refresh candidate would already have expired.
  ConflictingExpiry,
}

impl fmt::Display for BuildError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      BuildError::ZeroCapacity => write!(f, "bounded cache maximum size cannot be zero"),
      BuildError::ZeroDuration => write!(f, "expiry and refresh durations cannot be zero"),
      BuildError::LoaderRequired => write!(f, "refresh_after_write requires a loader"),
      BuildError::ConflictingExpiry => write!(
        f,
        "refresh_after_write must be shorter than expire_after_write"
      ),
    }
  }
}

impl std::error::Error for BuildError {}

/// Errors surfaced by cache operations.
#[derive(Debug, Clone)]
pub enum CacheError {
  /// `get` was called for a key with no mapping and no loader is configured.
  NotFound,
  /// A caller-supplied loader failed. The original error is propagated
  /// unchanged; under the concurrent engine every caller waiting on the same
  /// in-flight load observes the same failure.
  Loader(LoadError),
}

impl fmt::Display for CacheError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheError::NotFound => write!(f, "no cached value for key"),
      CacheError::Loader(err) => write!(f, "loader failed: {}", err),
    }
  }
}

impl std::error::Error for CacheError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      CacheError::NotFound => None,
      CacheError::Loader(err) => Some(err.as_ref()),
    }
  }
}
