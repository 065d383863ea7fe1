mod common;

use common::test_builder;

use cachefront::{CacheBuilder, Engine};

use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_expire_after_write_lapses() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine)
      .expire_after_write(Duration::from_millis(50))
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    assert_eq!(cache.get_opt(&"k".to_string()), Some(1));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get_opt(&"k".to_string()), None);
    assert!(cache.metrics().evicted_by_expiry >= 1);
  }
}

#[test]
fn test_expire_after_access_is_reset_by_reads() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine)
      .expire_after_access(Duration::from_millis(200))
      .build()
      .unwrap();

    cache.put("k".to_string(), 1);
    std::thread::sleep(Duration::from_millis(100));
    // Read inside the idle window keeps the entry alive.
    assert_eq!(cache.get_opt(&"k".to_string()), Some(1));

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(
      cache.get_opt(&"k".to_string()),
      Some(1),
      "entry read 150ms ago must still be within its 200ms idle window"
    );

    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(cache.get_opt(&"k".to_string()), None);
  }
}

#[test]
fn test_janitor_sweeps_without_access() {
  let cache = test_builder(Engine::Concurrent)
    .expire_after_write(Duration::from_millis(50))
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  std::thread::sleep(Duration::from_millis(250));

  // No reads happened; the janitor alone must have reclaimed the entry.
  assert_eq!(cache.len(), 0);
  assert_eq!(cache.metrics().evicted_by_expiry, 1);
}

#[test]
fn test_per_entry_deadline_overrides_policy() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine)
      .expire_after_write(Duration::from_millis(50))
      .build()
      .unwrap();

    cache.put("policy".to_string(), 1);
    cache.put_with_expiry("pinned".to_string(), 2, Duration::from_millis(500));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get_opt(&"policy".to_string()), None);
    assert_eq!(
      cache.get_opt(&"pinned".to_string()),
      Some(2),
      "a per-entry deadline outlives the policy TTL"
    );

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(cache.get_opt(&"pinned".to_string()), None);
  }
}

#[test]
fn test_put_all_with_expiry_applies_the_batch_deadline() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine)
      .expire_after_write(Duration::from_millis(50))
      .build()
      .unwrap();

    cache.put_all_with_expiry(
      vec![("a".to_string(), 1), ("b".to_string(), 2)],
      Duration::from_millis(500),
    );

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(
      cache.get_opt(&"a".to_string()),
      Some(1),
      "every batch entry gets the override, not the policy TTL"
    );
    assert_eq!(cache.get_opt(&"b".to_string()), Some(2));

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(cache.get_opt(&"a".to_string()), None);
    assert_eq!(cache.get_opt(&"b".to_string()), None);
  }
}

#[test]
fn test_expire_re_deadlines_a_live_entry() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine).build().unwrap();

    cache.put("k".to_string(), 1);
    assert!(cache.expire(&"k".to_string(), Duration::from_millis(50)));

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(cache.get_opt(&"k".to_string()), None);
  }
}

#[test]
fn test_expire_on_absent_key_is_a_noop() {
  for engine in [Engine::Concurrent, Engine::Strict] {
    let cache = test_builder(engine).build().unwrap();

    assert!(!cache.expire(&"missing".to_string(), Duration::from_secs(1)));
    assert!(cache.is_empty());
  }
}

#[test]
fn test_expire_all() {
  let cache = test_builder(Engine::Strict).build().unwrap();
  cache.put("a".to_string(), 1);
  cache.put("b".to_string(), 2);

  cache.expire_all(
    vec!["a".to_string(), "b".to_string()],
    Duration::from_millis(50),
  );
  std::thread::sleep(Duration::from_millis(100));
  cache.clean_up();
  assert!(cache.is_empty());
}

#[test]
fn test_replacing_an_expired_entry_reports_expired_not_replaced() {
  use common::RecordingRemoveListener;
  use cachefront::RemovalCause;

  let (listener, rx) = RecordingRemoveListener::channel();
  let cache = CacheBuilder::new()
    .engine(Engine::Strict)
    .expire_after_write(Duration::from_millis(50))
    .remove_listener(listener)
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  std::thread::sleep(Duration::from_millis(100));
  cache.put("k".to_string(), 2);

  let (_, value, cause) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
  assert_eq!(value, 1);
  assert_eq!(cause, RemovalCause::Expired);
  assert_eq!(cache.metrics().updates, 0, "replacing a corpse is not an update");
}

#[test]
fn test_refresh_after_write_strict_reloads_inline() {
  let generation = Arc::new(AtomicI32::new(0));
  let counter = generation.clone();
  let cache: cachefront::Cache<String, i32> = CacheBuilder::new()
    .engine(Engine::Strict)
    .refresh_after_write(Duration::from_millis(50))
    .loader(move |_: &String| counter.fetch_add(1, Ordering::SeqCst) + 100)
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  assert_eq!(cache.get_opt(&"k".to_string()), Some(1));

  std::thread::sleep(Duration::from_millis(100));
  // The strict engine refreshes on the reading thread, so the fresh value
  // is visible immediately.
  assert_eq!(cache.get_opt(&"k".to_string()), Some(100));
}

#[test]
fn test_refresh_after_write_concurrent_reloads_in_background() {
  let generation = Arc::new(AtomicI32::new(0));
  let counter = generation.clone();
  let cache: cachefront::Cache<String, i32> = CacheBuilder::new()
    .engine(Engine::Concurrent)
    .refresh_after_write(Duration::from_millis(50))
    .loader(move |_: &String| counter.fetch_add(1, Ordering::SeqCst) + 100)
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  std::thread::sleep(Duration::from_millis(100));

  // The stale read returns the old value and kicks off the reload.
  assert_eq!(cache.get_opt(&"k".to_string()), Some(1));

  let deadline = std::time::Instant::now() + Duration::from_secs(2);
  loop {
    // Later polls may trigger further refreshes, so accept any reloaded
    // generation.
    if cache.get_opt(&"k".to_string()).is_some_and(|v| v >= 100) {
      break;
    }
    assert!(
      std::time::Instant::now() < deadline,
      "background refresh never landed"
    );
    std::thread::sleep(Duration::from_millis(10));
  }
}

#[test]
fn test_refresh_panic_does_not_wedge_the_key() {
  let generation = Arc::new(AtomicI32::new(0));
  let counter = generation.clone();
  let cache: cachefront::Cache<String, i32> = CacheBuilder::new()
    .engine(Engine::Concurrent)
    .refresh_after_write(Duration::from_millis(50))
    .loader(move |_: &String| {
      if counter.fetch_add(1, Ordering::SeqCst) == 0 {
        panic!("first reload fails");
      }
      42
    })
    .build()
    .unwrap();

  cache.put("k".to_string(), 1);
  std::thread::sleep(Duration::from_millis(100));

  // This stale read kicks off the refresh that panics in the background.
  assert_eq!(cache.get_opt(&"k".to_string()), Some(1));

  // The dead flight must be cleared so a later stale read can try again.
  let deadline = std::time::Instant::now() + Duration::from_secs(2);
  loop {
    if cache.get_opt(&"k".to_string()) == Some(42) {
      break;
    }
    assert!(
      std::time::Instant::now() < deadline,
      "a panicked reload must not block further refreshes"
    );
    std::thread::sleep(Duration::from_millis(10));
  }
}
