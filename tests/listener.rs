mod common;

use common::{
  test_builder, CountingCreateListener, CountingReadListener, CountingUpdateListener,
  RecordingRemoveListener,
};

use cachefront::{Engine, RemovalCause};

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_remove_listener_observes_explicit_cause() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let (listener, rx) = RecordingRemoveListener::channel();
    let cache = test_builder(engine)
      .remove_listener(listener)
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    cache.invalidate(&"k".to_string());

    let (key, value, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(key, "k");
    assert_eq!(value, 1);
    assert_eq!(cause, RemovalCause::Explicit);
  }
}

#[test]
fn test_remove_listener_observes_replaced_cause() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let (listener, rx) = RecordingRemoveListener::channel();
    let cache = test_builder(engine)
      .remove_listener(listener)
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    cache.put("k".to_string(), 2);

    let (key, value, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(key, "k");
    assert_eq!(value, 1, "the listener sees the displaced value");
    assert_eq!(cause, RemovalCause::Replaced);
  }
}

#[test]
fn test_remove_listener_observes_size_cause() {
  let (listener, rx) = RecordingRemoveListener::channel();
  let cache = test_builder(Engine::Strict)
    .max_size(1)
    .remove_listener(listener)
    .build()
    .unwrap();

  cache.put("old".to_string(), 1);
  cache.put("new".to_string(), 2);

  let (key, value, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
  assert_eq!(key, "old");
  assert_eq!(value, 1);
  assert_eq!(cause, RemovalCause::Size);
  assert!(cause.is_eviction());
}

#[test]
fn test_remove_listener_observes_expired_cause_synchronously() {
  let (listener, rx) = RecordingRemoveListener::channel();
  let cache = test_builder(Engine::Strict)
    .expire_after_write(Duration::from_millis(50))
    .remove_listener(listener)
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  std::thread::sleep(Duration::from_millis(100));
  // The strict engine purges on access.
  assert!(cache.get_opt(&"k".to_string()).is_none());

  let (key, _, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
  assert_eq!(key, "k");
  assert_eq!(cause, RemovalCause::Expired);
}

#[test]
fn test_remove_listener_observes_expired_cause_from_janitor() {
  let (listener, rx) = RecordingRemoveListener::channel();
  let cache = test_builder(Engine::Concurrent)
    .expire_after_write(Duration::from_millis(50))
    .remove_listener(listener)
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  // No access: the janitor alone must deliver the event.
  let (key, _, cause) = rx.recv_timeout(Duration::from_secs(2)).unwrap();
  assert_eq!(key, "k");
  assert_eq!(cause, RemovalCause::Expired);
  assert!(cache.is_empty());
}

#[test]
fn test_invalidate_all_reports_every_entry() {
  let (listener, rx) = RecordingRemoveListener::channel();
  let cache = test_builder(Engine::Concurrent)
    .remove_listener(listener)
    .build()
    .unwrap();

  for i in 0..5 {
    cache.put(format!("key{i}"), i);
  }
  cache.invalidate_all();

  for _ in 0..5 {
    let (_, _, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(cause, RemovalCause::Explicit);
  }
}

#[test]
fn test_create_and_update_listeners() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let create = Arc::new(CountingCreateListener::default());
    let update = Arc::new(CountingUpdateListener::default());
    let cache = test_builder(engine)
      .create_listener(create.clone())
      .update_listener(update.clone())
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    assert_eq!(create.before.load(Ordering::SeqCst), 1);
    assert_eq!(create.after.load(Ordering::SeqCst), 1);
    assert_eq!(update.after.load(Ordering::SeqCst), 0);

    cache.put("k".to_string(), 2);
    assert_eq!(create.after.load(Ordering::SeqCst), 1, "replace is not a create");
    assert_eq!(update.before.load(Ordering::SeqCst), 1);
    assert_eq!(update.after.load(Ordering::SeqCst), 1);
  }
}

#[test]
fn test_read_listener_sees_hits_and_misses() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let reads = Arc::new(CountingReadListener::default());
    let cache = test_builder(engine)
      .read_listener(reads.clone())
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    let _ = cache.get(&"k".to_string());
    let _ = cache.get_opt(&"missing".to_string());
    let _ = cache.get_or_else(&"also-missing".to_string(), 0);

    assert_eq!(reads.reads.load(Ordering::SeqCst), 3);
    assert_eq!(reads.hits.load(Ordering::SeqCst), 1);
    assert_eq!(reads.misses.load(Ordering::SeqCst), 2);
  }
}
