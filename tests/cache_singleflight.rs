// tests/cache_singleflight.rs
//! The primary concurrency invariant: N concurrent misses for one key
//! run the compute exactly once, and TTL expiry is absolute.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Barrier;
use trend_context_engine::cache::ContextCache;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_misses_compute_exactly_once() {
    const CALLERS: usize = 8;

    let cache: Arc<ContextCache<String>> =
        Arc::new(ContextCache::new(Duration::from_secs(60), 16));
    let computed = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CALLERS));

    let mut handles = Vec::new();
    for _ in 0..CALLERS {
        let cache = cache.clone();
        let computed = computed.clone();
        let barrier = barrier.clone();
        handles.push(tokio::spawn(async move {
            barrier.wait().await;
            let out: Result<String, ()> = cache
                .get_or_compute("topic:ai", None, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    // Long enough that every caller arrives while the
                    // first flight is still in progress.
                    tokio::time::sleep(Duration::from_millis(100)).await;
                    Ok("result".to_string())
                })
                .await;
            out.expect("compute")
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.expect("join"), "result");
    }
    assert_eq!(computed.load(Ordering::SeqCst), 1, "compute ran more than once");

    let stats = cache.stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, CALLERS as u64 - 1);
}

#[tokio::test]
async fn distinct_keys_do_not_serialize_each_other() {
    let cache: Arc<ContextCache<u32>> = Arc::new(ContextCache::new(Duration::from_secs(60), 16));
    let computed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..4u32 {
        let cache = cache.clone();
        let computed = computed.clone();
        handles.push(tokio::spawn(async move {
            let out: Result<u32, ()> = cache
                .get_or_compute(&format!("k{i}"), None, || async {
                    computed.fetch_add(1, Ordering::SeqCst);
                    Ok(i)
                })
                .await;
            out.expect("compute")
        }));
    }
    for (i, handle) in handles.into_iter().enumerate() {
        assert_eq!(handle.await.expect("join"), i as u32);
    }
    assert_eq!(computed.load(Ordering::SeqCst), 4);
}

#[tokio::test]
async fn entry_expires_after_ttl_and_recomputes() {
    const TTL: Duration = Duration::from_millis(50);

    let cache: ContextCache<u32> = ContextCache::new(TTL, 16);
    let v: Result<u32, ()> = cache.get_or_compute("k", None, || async { Ok(1) }).await;
    assert_eq!(v.unwrap(), 1);

    // Within the TTL the stored value is served unchanged.
    let v: Result<u32, ()> = cache.get_or_compute("k", None, || async { Ok(2) }).await;
    assert_eq!(v.unwrap(), 1);

    // Well past the TTL (5x, headroom for slow CI timers) it recomputes.
    tokio::time::sleep(TTL * 5).await;
    let v: Result<u32, ()> = cache.get_or_compute("k", None, || async { Ok(3) }).await;
    assert_eq!(v.unwrap(), 3);
}

#[tokio::test]
async fn failed_compute_leaves_cache_usable_for_the_next_caller() {
    let cache: ContextCache<u32> = ContextCache::new(Duration::from_secs(60), 16);

    let failed: Result<u32, String> = cache
        .get_or_compute("k", None, || async { Err("backend down".to_string()) })
        .await;
    assert_eq!(failed.unwrap_err(), "backend down");
    assert!(cache.get("k").is_none(), "failed compute must not be cached");

    let ok: Result<u32, String> = cache.get_or_compute("k", None, || async { Ok(7) }).await;
    assert_eq!(ok.unwrap(), 7);
}

#[tokio::test]
async fn refresh_bypasses_a_live_entry() {
    let cache: ContextCache<u32> = ContextCache::new(Duration::from_secs(60), 16);
    let _: Result<u32, ()> = cache.get_or_compute("k", None, || async { Ok(1) }).await;

    let v: Result<u32, ()> = cache.refresh("k", None, || async { Ok(2) }).await;
    assert_eq!(v.unwrap(), 2);
    assert_eq!(cache.get("k"), Some(2));
}
