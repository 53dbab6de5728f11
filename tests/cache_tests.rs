use std::sync::Arc;
use std::thread;

use gradekeeper::cache::BoundedConcurrentCache;

fn cache(capacity: usize) -> BoundedConcurrentCache<String, i64> {
    BoundedConcurrentCache::new("test", capacity).expect("valid capacity")
}

#[test]
fn least_recently_used_entry_is_evicted() {
    let cache = cache(3);
    cache.put("a".into(), 1);
    cache.put("b".into(), 2);
    cache.put("c".into(), 3);
    assert_eq!(cache.get(&"a".into()), Some(1));

    let evicted = cache.put("d".into(), 4).map(|entry| entry.key);

    assert_eq!(evicted.as_deref(), Some("b"));
    let mut keys = cache.keys_by_recency();
    keys.sort();
    assert_eq!(keys, vec!["a", "c", "d"]);
    assert_eq!(cache.metrics().evictions, 1);
}

#[test]
fn size_never_exceeds_capacity() {
    let cache = cache(5);
    for i in 0..50 {
        cache.put(format!("k{i}"), i);
        if i % 3 == 0 {
            cache.get(&format!("k{}", i / 2));
        }
        assert!(cache.len() <= 5);
    }
    let metrics = cache.metrics();
    assert_eq!(metrics.size, 5);
    assert_eq!(metrics.evictions, 45);
}

#[test]
fn eviction_follows_access_order_not_insertion_order() {
    let cache = cache(3);
    for key in ["a", "b", "c"] {
        cache.put(key.into(), 0);
    }
    cache.get(&"a".into());
    cache.get(&"b".into());
    cache.get(&"a".into());
    assert_eq!(cache.keys_by_recency(), vec!["a", "b", "c"]);

    let evicted: Vec<_> = ["x", "y"]
        .into_iter()
        .filter_map(|key| cache.put(key.into(), 9).map(|entry| entry.key))
        .collect();
    assert_eq!(evicted, vec!["c", "b"]);
}

#[test]
fn overwriting_a_key_never_evicts() {
    let cache = cache(2);
    cache.put("a".into(), 1);
    cache.put("b".into(), 2);
    assert!(cache.put("a".into(), 10).is_none());
    assert_eq!(cache.len(), 2);
    assert_eq!(cache.peek(&"a".into()), Some(10));
    assert_eq!(cache.metrics().evictions, 0);
    // The overwrite made `a` most recent, so `b` goes next.
    let evicted = cache.put("c".into(), 3).map(|entry| entry.key);
    assert_eq!(evicted.as_deref(), Some("b"));
}

#[test]
fn miss_on_unknown_key_counts_exactly_one_miss() {
    let cache = cache(4);
    cache.put("present".into(), 1);
    assert_eq!(cache.get(&"never-inserted".into()), None);
    let metrics = cache.metrics();
    assert_eq!(metrics.misses, 1);
    assert_eq!(metrics.hits, 0);
}

#[test]
fn hits_track_access_count_and_recency() {
    let cache = cache(4);
    cache.put("a".into(), 1);
    let before = cache.snapshot()[0].last_accessed;
    cache.get(&"a".into());
    cache.get(&"a".into());
    let entry = cache.snapshot().remove(0);
    assert_eq!(entry.access_count, 2);
    assert!(entry.last_accessed >= before);
    assert_eq!(cache.metrics().hits, 2);
    assert!((cache.metrics().hit_rate() - 100.0).abs() < f64::EPSILON);
}

#[test]
fn invalidate_twice_is_same_as_once() {
    let cache = cache(4);
    cache.put("a".into(), 1);
    cache.put("b".into(), 2);
    let before = cache.metrics();

    assert!(cache.invalidate(&"a".into()));
    let after_first = cache.metrics();
    assert!(!cache.invalidate(&"a".into()));
    let after_second = cache.metrics();

    assert_eq!(after_first, after_second);
    assert_eq!(after_first.size, 1);
    assert_eq!(after_first.hits, before.hits);
    assert_eq!(after_first.misses, before.misses);
    assert_eq!(after_first.evictions, before.evictions);
}

#[test]
fn clear_drops_entries_and_resets_counters() {
    let cache = cache(2);
    cache.put("a".into(), 1);
    cache.get(&"a".into());
    cache.get(&"z".into());
    cache.put("b".into(), 2);
    cache.put("c".into(), 3);

    cache.clear();

    let metrics = cache.metrics();
    assert!(cache.is_empty());
    assert_eq!((metrics.hits, metrics.misses, metrics.evictions), (0, 0, 0));
    assert_eq!(metrics.total_hit_latency_ns, 0);
}

#[test]
fn snapshot_is_a_copy_not_a_live_view() {
    let cache = cache(3);
    cache.put("a".into(), 1);
    let snapshot = cache.snapshot();
    cache.put("a".into(), 2);
    cache.invalidate(&"a".into());
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].value, 1);
}

#[test]
fn hits_plus_misses_equal_lookups_under_contention() {
    let cache = Arc::new(cache(16));
    for i in 0..8 {
        cache.put(format!("k{i}"), i);
    }

    let threads = 8;
    let lookups_per_thread = 2_000;
    let handles: Vec<_> = (0..threads)
        .map(|t| {
            let cache = Arc::clone(&cache);
            thread::spawn(move || {
                for i in 0..lookups_per_thread {
                    let key = format!("k{}", (i * 7 + t) % 24);
                    cache.get(&key);
                    if i % 10 == 0 {
                        cache.put(key, i as i64);
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let metrics = cache.metrics();
    assert_eq!(metrics.lookups(), (threads * lookups_per_thread) as u64);
    assert!(metrics.size <= 16);
    assert_eq!(cache.keys_by_recency().len(), metrics.size);
}
