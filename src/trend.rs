// src/trend.rs
//! Temporal trend classification: compare a topic/source's current
//! aggregate engagement against its windowed snapshot history.
//!
//! The store serializes writers per `(topic, source)` key, not globally,
//! so unrelated topics never contend. Snapshots older than the lookback
//! window are pruned lazily on write.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use serde::{Deserialize, Serialize};

use crate::config::TrendConfig;

/// Momentum label for a topic within one source over the lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendLabel {
    /// First sighting: no prior snapshot exists for this topic/source.
    Emerging,
    /// Engagement grew past the gain threshold over the windowed mean.
    Gaining,
    /// Engagement fell below the loss threshold under the windowed mean.
    Losing,
    Stable,
}

/// Append-only history record for one observation of a topic on a source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TopicSnapshot {
    pub topic: String,
    pub source: String,
    /// Unix seconds.
    pub ts_unix: u64,
    pub aggregate_engagement: f64,
    pub item_count: usize,
}

type Key = (String, String);
type Series = Arc<Mutex<Vec<TopicSnapshot>>>;

pub struct TrendStore {
    cfg: TrendConfig,
    series: RwLock<HashMap<Key, Series>>,
}

impl TrendStore {
    pub fn new(cfg: TrendConfig) -> Self {
        Self {
            cfg,
            series: RwLock::new(HashMap::new()),
        }
    }

    fn series_for(&self, topic: &str, source: &str) -> Series {
        let key = (topic.to_string(), source.to_string());
        if let Some(s) = self.series.read().expect("trend store lock").get(&key) {
            return s.clone();
        }
        let mut map = self.series.write().expect("trend store lock");
        map.entry(key).or_default().clone()
    }

    /// Classify `current` against the windowed mean of stored snapshots,
    /// without recording anything. A key with no usable history is
    /// always `Emerging`, never `Stable` or `Losing`.
    pub fn classify(
        &self,
        topic: &str,
        source: &str,
        now_unix: u64,
        current: f64,
    ) -> TrendLabel {
        let series = self.series_for(topic, source);
        let guard = series.lock().expect("trend series mutex poisoned");
        self.classify_against(&guard, now_unix, current)
    }

    /// Record a snapshot, pruning entries older than the lookback window.
    pub fn record_snapshot(
        &self,
        topic: &str,
        source: &str,
        ts_unix: u64,
        aggregate_engagement: f64,
        item_count: usize,
    ) {
        let series = self.series_for(topic, source);
        let mut guard = series.lock().expect("trend series mutex poisoned");
        Self::prune(&mut guard, ts_unix, self.cfg.lookback_secs());
        guard.push(TopicSnapshot {
            topic: topic.to_string(),
            source: source.to_string(),
            ts_unix,
            aggregate_engagement,
            item_count,
        });
    }

    /// Classify-then-record under one per-key lock: the label compares
    /// the current value against history *excluding* the observation
    /// being recorded, and concurrent observers of the same key append
    /// in mutual exclusion.
    pub fn observe(
        &self,
        topic: &str,
        source: &str,
        now_unix: u64,
        aggregate_engagement: f64,
        item_count: usize,
    ) -> TrendLabel {
        let series = self.series_for(topic, source);
        let mut guard = series.lock().expect("trend series mutex poisoned");
        let label = self.classify_against(&guard, now_unix, aggregate_engagement);
        Self::prune(&mut guard, now_unix, self.cfg.lookback_secs());
        guard.push(TopicSnapshot {
            topic: topic.to_string(),
            source: source.to_string(),
            ts_unix: now_unix,
            aggregate_engagement,
            item_count,
        });
        label
    }

    fn classify_against(
        &self,
        snapshots: &[TopicSnapshot],
        now_unix: u64,
        current: f64,
    ) -> TrendLabel {
        let cutoff = now_unix.saturating_sub(self.cfg.lookback_secs());
        let windowed: Vec<f64> = snapshots
            .iter()
            .filter(|s| s.ts_unix >= cutoff)
            .map(|s| s.aggregate_engagement)
            .collect();

        if windowed.is_empty() {
            return TrendLabel::Emerging;
        }

        let mean = windowed.iter().sum::<f64>() / windowed.len() as f64;
        let delta = (current - mean) / mean.max(self.cfg.epsilon);

        if delta > self.cfg.gain_threshold {
            TrendLabel::Gaining
        } else if delta < -self.cfg.loss_threshold {
            TrendLabel::Losing
        } else {
            TrendLabel::Stable
        }
    }

    fn prune(snapshots: &mut Vec<TopicSnapshot>, now_unix: u64, lookback_secs: u64) {
        let cutoff = now_unix.saturating_sub(lookback_secs);
        snapshots.retain(|s| s.ts_unix >= cutoff);
    }

    /// Number of retained snapshots for a key (diagnostics/tests).
    pub fn history_len(&self, topic: &str, source: &str) -> usize {
        let key = (topic.to_string(), source.to_string());
        self.series
            .read()
            .expect("trend store lock")
            .get(&key)
            .map(|s| s.lock().expect("trend series mutex poisoned").len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> TrendStore {
        TrendStore::new(TrendConfig::default())
    }

    const T0: u64 = 1_700_000_000;

    #[test]
    fn cold_start_is_always_emerging() {
        let s = store();
        assert_eq!(s.classify("ai", "reddit", T0, 0.9), TrendLabel::Emerging);
        assert_eq!(s.classify("ai", "reddit", T0, 0.0), TrendLabel::Emerging);
    }

    #[test]
    fn growth_over_baseline_is_gaining() {
        let s = store();
        s.record_snapshot("ai", "reddit", T0, 0.4, 10);
        s.record_snapshot("ai", "reddit", T0 + 600, 0.4, 12);
        // +100% over the windowed mean of 0.4.
        assert_eq!(
            s.observe("ai", "reddit", T0 + 1200, 0.8, 15),
            TrendLabel::Gaining
        );
    }

    #[test]
    fn drop_below_baseline_is_losing() {
        let s = store();
        s.record_snapshot("ai", "reddit", T0, 0.8, 10);
        assert_eq!(
            s.observe("ai", "reddit", T0 + 600, 0.2, 4),
            TrendLabel::Losing
        );
    }

    #[test]
    fn small_moves_are_stable() {
        let s = store();
        s.record_snapshot("ai", "reddit", T0, 0.5, 10);
        assert_eq!(
            s.observe("ai", "reddit", T0 + 600, 0.55, 10),
            TrendLabel::Stable
        );
    }

    #[test]
    fn observe_excludes_its_own_snapshot_from_the_baseline() {
        let s = store();
        // First observation has nothing to compare against.
        assert_eq!(s.observe("ai", "news", T0, 0.9, 5), TrendLabel::Emerging);
        // Second compares against the first only.
        assert_eq!(s.observe("ai", "news", T0 + 60, 0.9, 5), TrendLabel::Stable);
    }

    #[test]
    fn history_is_pruned_to_the_lookback_window() {
        let s = store();
        let day = 24 * 3600;
        s.record_snapshot("ai", "reddit", T0, 0.5, 10);
        s.record_snapshot("ai", "reddit", T0 + 2 * day, 0.5, 10);
        assert_eq!(s.history_len("ai", "reddit"), 1);
        // The stale snapshot no longer contributes: two days later the
        // topic reads as a fresh comparison against the recent one only.
        assert_eq!(
            s.classify("ai", "reddit", T0 + 2 * day, 0.5),
            TrendLabel::Stable
        );
    }

    #[test]
    fn keys_are_independent() {
        let s = store();
        s.record_snapshot("ai", "reddit", T0, 0.5, 10);
        assert_eq!(s.classify("ai", "youtube", T0, 0.5), TrendLabel::Emerging);
        assert_eq!(s.classify("rust", "reddit", T0, 0.5), TrendLabel::Emerging);
    }
}
