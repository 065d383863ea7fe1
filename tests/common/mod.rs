#![allow(dead_code)]

use cachefront::{
  Cache, CacheBuilder, CreateListener, Engine, ReadListener, RemovalCause, RemoveListener,
  UpdateListener,
};

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A short maintenance tick so eviction-latency assertions stay fast.
pub const TEST_TICK: Duration = Duration::from_millis(20);

pub fn test_builder(engine: Engine) -> CacheBuilder<String, i32> {
  CacheBuilder::new()
    .engine(engine)
    .janitor_tick_interval(TEST_TICK)
}

pub fn new_test_cache(engine: Engine) -> Cache<String, i32> {
  test_builder(engine).build().unwrap()
}

/// Runs the same assertions against a cache built on each engine.
pub fn for_each_engine(test: impl Fn(Cache<String, i32>)) {
  for engine in [Engine::Concurrent, Engine::Strict] {
    test(new_test_cache(engine));
  }
}

/// Forwards every removal to an mpsc channel for assertion.
pub struct RecordingRemoveListener<K, V> {
  tx: Mutex<Sender<(K, V, RemovalCause)>>,
}

impl<K, V> RecordingRemoveListener<K, V> {
  pub fn channel() -> (Arc<Self>, Receiver<(K, V, RemovalCause)>) {
    let (tx, rx) = mpsc::channel();
    (
      Arc::new(Self {
        tx: Mutex::new(tx),
      }),
      rx,
    )
  }
}

impl<K, V> RemoveListener<K, V> for RecordingRemoveListener<K, V>
where
  K: Clone + Send + Sync,
  V: Clone + Send + Sync,
{
  fn after_remove(&self, key: &K, value: &V, cause: RemovalCause) {
    let _ = self
      .tx
      .lock()
      .unwrap()
      .send((key.clone(), value.clone(), cause));
  }
}

#[derive(Default)]
pub struct CountingCreateListener {
  pub before: AtomicUsize,
  pub after: AtomicUsize,
}

impl<K, V> CreateListener<K, V> for CountingCreateListener {
  fn before_create(&self, _key: &K) {
    self.before.fetch_add(1, Ordering::SeqCst);
  }
  fn after_create(&self, _key: &K, _value: &V) {
    self.after.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Default)]
pub struct CountingUpdateListener {
  pub before: AtomicUsize,
  pub after: AtomicUsize,
}

impl<K, V> UpdateListener<K, V> for CountingUpdateListener {
  fn before_update(&self, _key: &K, _old_value: &V) {
    self.before.fetch_add(1, Ordering::SeqCst);
  }
  fn after_update(&self, _key: &K, _old_value: &V, _new_value: &V) {
    self.after.fetch_add(1, Ordering::SeqCst);
  }
}

#[derive(Default)]
pub struct CountingReadListener {
  pub reads: AtomicUsize,
  pub hits: AtomicUsize,
  pub misses: AtomicUsize,
}

impl<K, V> ReadListener<K, V> for CountingReadListener {
  fn before_read(&self, _key: &K) {
    self.reads.fetch_add(1, Ordering::SeqCst);
  }
  fn on_hit(&self, _key: &K, _value: &V) {
    self.hits.fetch_add(1, Ordering::SeqCst);
  }
  fn on_miss(&self, _key: &K) {
    self.misses.fetch_add(1, Ordering::SeqCst);
  }
}
