use crate::error::LoadError;

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::thread::{self, Thread};

/// The state of a value being computed for the cache.
pub(crate) enum LoadState<V> {
  Computing,
  Complete(V),
  Failed(LoadError),
}

struct Inner<V> {
  state: LoadState<V>,
  waiters: VecDeque<Thread>,
}

/// A completion latch for an in-flight load. One leader thread runs the
/// loader; any number of concurrent callers for the same key park on the
/// latch and observe the leader's outcome, value or failure alike.
pub(crate) struct LoadFuture<V> {
  inner: Mutex<Inner<V>>,
}

impl<V> LoadFuture<V> {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(Inner {
        state: LoadState::Computing,
        waiters: VecDeque::new(),
      }),
    }
  }

  /// Completes the load with a value, waking all waiters.
  pub(crate) fn complete(&self, value: V) {
    let mut inner = self.inner.lock();
    inner.state = LoadState::Complete(value);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Fails the load, releasing all waiters with the same error.
  pub(crate) fn fail(&self, err: LoadError) {
    let mut inner = self.inner.lock();
    inner.state = LoadState::Failed(err);
    for waiter in inner.waiters.drain(..) {
      waiter.unpark();
    }
  }

  /// Blocks the calling thread until the leader finishes.
  pub(crate) fn wait(&self) -> Result<V, LoadError>
  where
    V: Clone,
  {
    let mut inner = self.inner.lock();
    loop {
      match &inner.state {
        LoadState::Complete(value) => return Ok(value.clone()),
        LoadState::Failed(err) => return Err(err.clone()),
        LoadState::Computing => {
          inner.waiters.push_back(thread::current());
          drop(inner); // Unlock before parking.
          thread::park();
          inner = self.inner.lock();
        }
      }
    }
  }
}
