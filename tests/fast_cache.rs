use cachefront::Cache;

use std::sync::Arc;

#[test]
fn test_fast_cache_round_trip() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let value = Arc::new(10);

  cache.put("k".to_string(), value.clone());
  let found = cache.get(&"k".to_string()).unwrap();
  assert!(Arc::ptr_eq(&found, &value));
  assert_eq!(cache.len(), 1);
}

#[test]
fn test_entry_is_reclaimed_once_unreferenced() {
  let cache: Cache<String, Arc<String>> = Cache::new_fast();
  let value = Arc::new("payload".to_string());

  cache.put("k".to_string(), value.clone());
  assert!(cache.get_opt(&"k".to_string()).is_some());

  drop(value);
  // The mapping held only a weak reference, so the value is gone.
  assert!(cache.get_opt(&"k".to_string()).is_none());
  assert_eq!(cache.metrics().evicted_by_collection, 1);
}

#[test]
fn test_put_on_live_key_keeps_the_existing_value() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let first = Arc::new(1);
  let second = Arc::new(2);

  cache.put("k".to_string(), first.clone());
  cache.put("k".to_string(), second.clone());

  let found = cache.get(&"k".to_string()).unwrap();
  assert!(
    Arc::ptr_eq(&found, &first),
    "a live value must not be displaced"
  );
}

#[test]
fn test_put_on_dead_key_fills_the_slot() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let first = Arc::new(1);

  cache.put("k".to_string(), first.clone());
  drop(first);

  let second = Arc::new(2);
  cache.put("k".to_string(), second.clone());
  assert_eq!(*cache.get(&"k".to_string()).unwrap(), 2);
}

#[test]
fn test_clean_up_reclaims_dead_mappings() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let keeper = Arc::new(0);

  cache.put("live".to_string(), keeper.clone());
  for i in 0..5 {
    cache.put(format!("dead{i}"), Arc::new(i));
  }

  cache.clean_up();
  assert_eq!(cache.len(), 1);
  assert_eq!(cache.metrics().evicted_by_collection, 5);
}

#[test]
fn test_invalidate_counts_separately_from_collection() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let value = Arc::new(1);

  cache.put("k".to_string(), value.clone());
  assert!(cache.invalidate(&"k".to_string()));

  let metrics = cache.metrics();
  assert_eq!(metrics.invalidations, 1);
  assert_eq!(metrics.evicted_by_collection, 0);
}

#[test]
fn test_get_or_load_on_fast_cache() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();

  let loaded = cache.get_or_load(&"k".to_string(), |_| Arc::new(5));
  assert_eq!(*loaded, 5);
  // `loaded` still holds the Arc, so this is a hit.
  let again = cache.get(&"k".to_string()).unwrap();
  assert!(Arc::ptr_eq(&loaded, &again));
}

#[test]
fn test_expire_is_unsupported() {
  let cache: Cache<String, Arc<i32>> = Cache::new_fast();
  let value = Arc::new(1);
  cache.put("k".to_string(), value.clone());

  assert!(!cache.expire(&"k".to_string(), std::time::Duration::from_secs(1)));
  assert!(cache.get_opt(&"k".to_string()).is_some());
}
