// tests/trend_classify.rs
//! Trend classification across runs: cold start, growth, decay, and
//! per-key serialization of snapshot appends.

use std::sync::Arc;

use trend_context_engine::config::TrendConfig;
use trend_context_engine::trend::{TrendStore, TrendLabel};

const T0: u64 = 1_700_000_000;

#[test]
fn lifecycle_emerging_then_gaining_then_losing() {
    let store = TrendStore::new(TrendConfig::default());

    // First observation of the key: cold start.
    assert_eq!(
        store.observe("ai", "reddit", T0, 0.30, 8),
        TrendLabel::Emerging
    );
    // Doubling over the baseline reads as gaining.
    assert_eq!(
        store.observe("ai", "reddit", T0 + 1800, 0.60, 12),
        TrendLabel::Gaining
    );
    // Collapse against the (now higher) windowed mean reads as losing.
    assert_eq!(
        store.observe("ai", "reddit", T0 + 3600, 0.10, 3),
        TrendLabel::Losing
    );
}

#[test]
fn classification_thresholds_are_configurable() {
    let store = TrendStore::new(TrendConfig {
        gain_threshold: 0.10,
        loss_threshold: 0.05,
        ..TrendConfig::default()
    });
    store.record_snapshot("ai", "news", T0, 0.50, 5);
    // +20% clears the lowered gain threshold.
    assert_eq!(
        store.classify("ai", "news", T0 + 60, 0.60),
        TrendLabel::Gaining
    );
    // -6% crosses the lowered loss threshold.
    assert_eq!(
        store.classify("ai", "news", T0 + 60, 0.47),
        TrendLabel::Losing
    );
}

#[test]
fn stale_history_expires_back_to_emerging() {
    let store = TrendStore::new(TrendConfig::default());
    store.record_snapshot("ai", "reddit", T0, 0.50, 5);

    // Two days later nothing in the lookback window remains.
    let later = T0 + 48 * 3600;
    assert_eq!(
        store.classify("ai", "reddit", later, 0.50),
        TrendLabel::Emerging
    );
}

#[test]
fn concurrent_observers_of_one_key_serialize_appends() {
    let store = Arc::new(TrendStore::new(TrendConfig::default()));
    let mut handles = Vec::new();
    for i in 0..16u64 {
        let store = store.clone();
        handles.push(std::thread::spawn(move || {
            store.observe("ai", "reddit", T0 + i, 0.5, 1);
        }));
    }
    for h in handles {
        h.join().expect("thread");
    }
    assert_eq!(store.history_len("ai", "reddit"), 16);
}

#[test]
fn zero_baseline_spike_is_gaining_not_divide_by_zero() {
    let store = TrendStore::new(TrendConfig::default());
    store.record_snapshot("ai", "reddit", T0, 0.0, 0);
    assert_eq!(
        store.classify("ai", "reddit", T0 + 60, 0.5),
        TrendLabel::Gaining
    );
}
