//! Dedup cache: TTL suppression, expiry, sweeper, concurrent access.

use std::sync::Arc;
use std::time::Duration;

use alpha_stream::pipeline::dedup::DedupCache;

#[test]
fn add_then_has_within_ttl() {
    let cache = DedupCache::new();
    assert!(!cache.has("k1"));
    cache.add("k1".into(), Duration::from_secs(60));
    assert!(cache.has("k1"));
    assert!(!cache.has("k2"));
}

#[test]
fn entries_expire_after_their_ttl() {
    let cache = DedupCache::new();
    cache.add("short".into(), Duration::from_millis(20));
    assert!(cache.has("short"));
    std::thread::sleep(Duration::from_millis(40));
    assert!(!cache.has("short"));
}

#[test]
fn expired_probe_removes_the_entry() {
    let cache = DedupCache::new();
    cache.add("k".into(), Duration::from_millis(10));
    assert_eq!(cache.len(), 1);
    std::thread::sleep(Duration::from_millis(25));
    // Lazy expiry: the probe itself evicts.
    assert!(!cache.has("k"));
    assert_eq!(cache.len(), 0);
}

#[test]
fn ttl_is_per_entry() {
    let cache = DedupCache::new();
    cache.add("short".into(), Duration::from_millis(20));
    cache.add("long".into(), Duration::from_secs(60));
    std::thread::sleep(Duration::from_millis(40));
    assert!(!cache.has("short"));
    assert!(cache.has("long"));
}

#[test]
fn re_adding_extends_the_deadline() {
    let cache = DedupCache::new();
    cache.add("k".into(), Duration::from_millis(30));
    std::thread::sleep(Duration::from_millis(20));
    cache.add("k".into(), Duration::from_millis(60));
    std::thread::sleep(Duration::from_millis(30));
    // The original deadline has passed; the refreshed one has not.
    assert!(cache.has("k"));
}

#[tokio::test]
async fn sweeper_evicts_expired_entries_eagerly() {
    let cache = DedupCache::with_sweeper(Duration::from_millis(25));
    cache.add("a".into(), Duration::from_millis(10));
    cache.add("b".into(), Duration::from_millis(10));
    cache.add("keep".into(), Duration::from_secs(60));
    assert_eq!(cache.len(), 3);

    tokio::time::sleep(Duration::from_millis(100)).await;
    // No probes happened; the sweeper alone bounded the map.
    assert_eq!(cache.len(), 1);
    assert!(cache.has("keep"));

    cache.stop();
}

#[tokio::test]
async fn concurrent_stages_can_probe_and_add() {
    let cache = Arc::new(DedupCache::new());
    let mut tasks = Vec::new();
    for worker in 0..8 {
        let cache = cache.clone();
        tasks.push(tokio::spawn(async move {
            for i in 0..200 {
                let key = format!("w{worker}-{i}");
                assert!(!cache.has(&key));
                cache.add(key.clone(), Duration::from_secs(60));
                assert!(cache.has(&key));
            }
        }));
    }
    for task in tasks {
        task.await.expect("worker panicked");
    }
    assert_eq!(cache.len(), 8 * 200);
}
