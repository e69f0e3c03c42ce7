// src/aggregate.rs
//! Concurrent multi-source aggregation: fan a topic query out to every
//! configured adapter, tolerate independent failures, collect whatever
//! arrived. Deduplication across sources is the correlator's concern,
//! not this module's.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, describe_counter, gauge};
use once_cell::sync::OnceCell;
use tokio::task::JoinSet;

use crate::config::AggregatorConfig;
use crate::error::{EngineError, SourceError};
use crate::source::{normalize_text, RawItem, SourceAdapter};

/// One-time metrics registration (so series show up on the host's recorder).
fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "context_items_fetched_total",
            "Items collected across all sources."
        );
        describe_counter!(
            "context_source_errors_total",
            "Source fetch failures (timeouts included)."
        );
    });
}

/// Result of one fan-out: whatever arrived, plus who failed and why.
#[derive(Debug)]
pub struct AggregateOutcome {
    pub items: Vec<RawItem>,
    pub errors: BTreeMap<String, SourceError>,
}

pub struct Aggregator {
    adapters: Vec<Arc<dyn SourceAdapter>>,
    fetch_timeout: Duration,
}

impl Aggregator {
    pub fn new(adapters: Vec<Arc<dyn SourceAdapter>>, cfg: &AggregatorConfig) -> Self {
        Self {
            adapters,
            fetch_timeout: cfg.fetch_timeout(),
        }
    }

    pub fn adapter_names(&self) -> BTreeSet<String> {
        self.adapters
            .iter()
            .map(|a| a.name().to_string())
            .collect()
    }

    /// Fan `topic` out to the requested sources (all configured adapters
    /// when `sources` is `None`), one task per source, each bounded by
    /// the per-source timeout.
    ///
    /// A single source failing is recorded and excluded; the call only
    /// errors when every requested source failed (or none is configured),
    /// so callers can tell "no trends found" from "could not fetch".
    pub async fn aggregate(
        &self,
        topic: &str,
        sources: Option<&BTreeSet<String>>,
        limit: usize,
    ) -> Result<AggregateOutcome, EngineError> {
        ensure_metrics_described();

        let selected: Vec<Arc<dyn SourceAdapter>> = self
            .adapters
            .iter()
            .filter(|a| sources.map_or(true, |wanted| wanted.contains(a.name())))
            .cloned()
            .collect();

        let mut errors: BTreeMap<String, SourceError> = BTreeMap::new();

        if selected.is_empty() {
            if let Some(wanted) = sources {
                for name in wanted {
                    errors.insert(
                        name.clone(),
                        SourceError::Unavailable("no adapter configured".into()),
                    );
                }
            }
            return Err(EngineError::AllSourcesFailed {
                topic: topic.to_string(),
                errors,
            });
        }

        let mut set = JoinSet::new();
        for adapter in selected {
            let topic = topic.to_string();
            let timeout = self.fetch_timeout;
            set.spawn(async move {
                let name = adapter.name();
                let result = match tokio::time::timeout(timeout, adapter.fetch(&topic, limit)).await
                {
                    Ok(res) => res,
                    Err(_) => Err(SourceError::Timeout(timeout)),
                };
                (name, result)
            });
        }

        // Collect per source, then flatten in source-name order so the
        // aggregate is deterministic regardless of completion order.
        let mut by_source: BTreeMap<String, Vec<RawItem>> = BTreeMap::new();
        while let Some(joined) = set.join_next().await {
            let Ok((name, result)) = joined else {
                continue;
            };
            match result {
                Ok(mut fetched) => {
                    for item in &mut fetched {
                        item.title = normalize_text(&item.title);
                        item.body_snippet = normalize_text(&item.body_snippet);
                    }
                    counter!("context_items_fetched_total").increment(fetched.len() as u64);
                    by_source.entry(name.to_string()).or_default().extend(fetched);
                }
                Err(err) => {
                    tracing::warn!(error = %err, source = name, "source fetch failed");
                    counter!("context_source_errors_total").increment(1);
                    errors.insert(name.to_string(), err);
                }
            }
        }

        if by_source.is_empty() && !errors.is_empty() {
            return Err(EngineError::AllSourcesFailed {
                topic: topic.to_string(),
                errors,
            });
        }

        gauge!("context_last_aggregate_ts").set(chrono::Utc::now().timestamp() as f64);

        let items = by_source.into_values().flatten().collect();
        Ok(AggregateOutcome { items, errors })
    }
}
