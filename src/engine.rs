// src/engine.rs
//! The context intelligence engine: query analysis, cached
//! aggregate -> rank -> classify -> correlate pipeline, and summary
//! generation. This is the surface the protocol/CLI layer talks to.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::aggregate::Aggregator;
use crate::cache::{CacheStats, ContextCache};
use crate::config::EngineConfig;
use crate::correlate::{CorrelationCluster, Correlator};
use crate::error::EngineError;
use crate::provider::{build_summary_chain, FallbackChain};
use crate::query::{QueryAnalysis, QueryAnalyzer};
use crate::ranking::{RankingEngine, ScoredItem};
use crate::source::SourceAdapter;
use crate::source_weights::SourceCredibility;
use crate::summary;
use crate::trend::{TrendLabel, TrendStore};

/// The unit stored in the cache and returned to callers. Read-only to
/// consumers; a new pipeline run produces a new result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextResult {
    pub topic: String,
    /// Descending composite score.
    pub ranked_items: Vec<ScoredItem>,
    /// Momentum per source that returned items this run.
    pub trend_labels: BTreeMap<String, TrendLabel>,
    pub clusters: Vec<CorrelationCluster>,
    /// Indices into `ranked_items`.
    pub unique_angles: Vec<usize>,
    /// Sources that failed this run (message only; the run proceeded
    /// without them).
    pub source_errors: BTreeMap<String, String>,
    pub generated_at: DateTime<Utc>,
}

pub struct ContextEngine {
    cfg: EngineConfig,
    aggregator: Aggregator,
    ranking: RankingEngine,
    trends: TrendStore,
    correlator: Correlator,
    cache: ContextCache<ContextResult>,
    analyzer: QueryAnalyzer,
    summary_chain: FallbackChain,
}

impl ContextEngine {
    /// Build an engine over the given adapters. State (cache, trend
    /// history) is owned by this object; construct once at startup and
    /// share by reference.
    pub fn new(
        cfg: EngineConfig,
        adapters: Vec<Arc<dyn SourceAdapter>>,
        credibility: SourceCredibility,
    ) -> Self {
        let aggregator = Aggregator::new(adapters, &cfg.aggregator);
        let ranking = RankingEngine::new(cfg.scoring.clone(), credibility);
        let trends = TrendStore::new(cfg.trend.clone());
        let correlator = Correlator::new(cfg.correlation.clone());
        let cache = ContextCache::new(cfg.cache.ttl(), cfg.cache.max_entries);
        let summary_chain = build_summary_chain(&cfg.summary);
        Self {
            cfg,
            aggregator,
            ranking,
            trends,
            correlator,
            cache,
            analyzer: QueryAnalyzer::rule_based(),
            summary_chain,
        }
    }

    /// Replace the default rule-based analyzer (e.g. with an AI-fronted one).
    pub fn with_analyzer(mut self, analyzer: QueryAnalyzer) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Replace the summarization chain (tests pin deterministic providers).
    pub fn with_summary_chain(mut self, chain: FallbackChain) -> Self {
        self.summary_chain = chain;
        self
    }

    /// Ranked, classified, correlated context for a topic. Serves from
    /// cache within the TTL; `force_refresh` recomputes unconditionally.
    /// Fails only when every requested source failed.
    pub async fn get_context(
        &self,
        topic: &str,
        sources: Option<BTreeSet<String>>,
        force_refresh: bool,
    ) -> Result<ContextResult, EngineError> {
        self.get_context_with_limit(topic, sources, force_refresh, None)
            .await
    }

    /// Same as [`get_context`](Self::get_context) with a per-source item
    /// budget override (used by query-driven fetches).
    pub async fn get_context_with_limit(
        &self,
        topic: &str,
        sources: Option<BTreeSet<String>>,
        force_refresh: bool,
        limit: Option<usize>,
    ) -> Result<ContextResult, EngineError> {
        let topic = topic.trim().to_lowercase();
        let selected = sources.unwrap_or_else(|| self.aggregator.adapter_names());
        let key = cache_key(&topic, &selected);
        let limit = limit.unwrap_or(self.cfg.aggregator.default_limit);

        let compute = || self.compute_context(topic.clone(), selected.clone(), limit);
        if force_refresh {
            self.cache.refresh(&key, None, compute).await
        } else {
            self.cache.get_or_compute(&key, None, compute).await
        }
    }

    /// Classify a free-text request. Never fails; an unavailable AI
    /// analyzer degrades to rules.
    pub async fn analyze_query(&self, query: &str) -> QueryAnalysis {
        self.analyzer.analyze(query).await
    }

    /// Analyze a query and, when its intent wants context, resolve it:
    /// the first extracted topic keyed against the intent's sources.
    /// Returns `None` when the intent needs no context.
    pub async fn context_for_query(
        &self,
        query: &str,
    ) -> Result<Option<(QueryAnalysis, ContextResult)>, EngineError> {
        let analysis = self.analyze_query(query).await;
        if !analysis.should_fetch || analysis.topics.is_empty() {
            return Ok(None);
        }

        let topic = analysis.topics[0].clone();
        let wanted: BTreeSet<String> = analysis
            .context_sources
            .intersection(&self.aggregator.adapter_names())
            .cloned()
            .collect();
        let sources = if wanted.is_empty() { None } else { Some(wanted) };

        let result = self
            .get_context_with_limit(&topic, sources, false, Some(analysis.fetch_limit))
            .await?;
        Ok(Some((analysis, result)))
    }

    /// Human-readable digest of a result, polished by the summary chain
    /// (hosted provider when available, deterministic condenser
    /// otherwise). Returns the text and the provider that produced it.
    pub async fn summarize_context(&self, result: &ContextResult) -> (String, String) {
        summary::summarize(&self.summary_chain, result).await
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn invalidate_topic(&self, topic: &str, sources: Option<BTreeSet<String>>) {
        let topic = topic.trim().to_lowercase();
        let selected = sources.unwrap_or_else(|| self.aggregator.adapter_names());
        self.cache.invalidate(&cache_key(&topic, &selected));
    }

    /// The full pipeline for one topic: fan-out, rank, record + classify
    /// trends per source, correlate.
    async fn compute_context(
        &self,
        topic: String,
        sources: BTreeSet<String>,
        limit: usize,
    ) -> Result<ContextResult, EngineError> {
        let outcome = self
            .aggregator
            .aggregate(&topic, Some(&sources), limit)
            .await?;

        let now = Utc::now();
        let ranked = self.ranking.rank(outcome.items, &topic, now);

        // Mean normalized engagement per source feeds the trend store.
        let mut per_source: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for item in &ranked {
            let entry = per_source.entry(item.item.source.as_str()).or_insert((0.0, 0));
            entry.0 += item.scores.engagement;
            entry.1 += 1;
        }
        let now_unix = now.timestamp().max(0) as u64;
        let mut trend_labels = BTreeMap::new();
        for (source, (sum, count)) in per_source {
            let mean = sum / count as f64;
            let label = self.trends.observe(&topic, source, now_unix, mean, count);
            trend_labels.insert(source.to_string(), label);
        }

        let correlation = self.correlator.correlate(&ranked);

        tracing::info!(
            topic = %topic,
            items = ranked.len(),
            clusters = correlation.clusters.len(),
            unique_angles = correlation.unique_angles.len(),
            failed_sources = outcome.errors.len(),
            "context pipeline run complete"
        );

        Ok(ContextResult {
            topic,
            ranked_items: ranked,
            trend_labels,
            clusters: correlation.clusters,
            unique_angles: correlation.unique_angles,
            source_errors: outcome
                .errors
                .into_iter()
                .map(|(source, err)| (source, err.to_string()))
                .collect(),
            generated_at: now,
        })
    }
}

/// Cache key for a topic + source set: `trending:<topic>:<sources>`.
fn cache_key(topic: &str, sources: &BTreeSet<String>) -> String {
    let joined = sources.iter().cloned().collect::<Vec<_>>().join("_");
    format!("trending:{topic}:{joined}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_is_stable_for_source_sets() {
        let a: BTreeSet<String> = ["youtube".to_string(), "reddit".to_string()].into();
        let b: BTreeSet<String> = ["reddit".to_string(), "youtube".to_string()].into();
        assert_eq!(cache_key("ai", &a), cache_key("ai", &b));
        assert_eq!(cache_key("ai", &a), "trending:ai:reddit_youtube");
    }
}
