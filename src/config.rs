// src/config.rs
//! Engine configuration: score weights, trend thresholds, cache TTL,
//! aggregation limits. Loaded from TOML with compiled-in defaults; a
//! missing or unreadable file falls back to defaults so the engine can
//! always start.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

pub const DEFAULT_CONFIG_PATH: &str = "config/engine.toml";

pub const ENV_CONFIG_PATH: &str = "CONTEXT_ENGINE_CONFIG_PATH";
pub const ENV_CACHE_TTL_SECS: &str = "CONTEXT_CACHE_TTL_SECS";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub scoring: ScoringConfig,
    pub trend: TrendConfig,
    pub correlation: CorrelationConfig,
    pub cache: CacheConfig,
    pub aggregator: AggregatorConfig,
    pub summary: SummaryConfig,
}

/// Weights for the composite score. The combination is normalized by the
/// weight sum, so the defaults behave as the documented
/// 0.40/0.30/0.20/0.10 split.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub relevance_weight: f64,
    pub engagement_weight: f64,
    pub recency_weight: f64,
    pub credibility_weight: f64,
    /// Bonus added to relevance when the full topic phrase appears verbatim.
    pub exact_match_boost: f64,
    /// Items older than this floor at `recency_floor` instead of decaying further.
    pub recency_horizon_hours: u64,
    pub recency_floor: f64,
    /// Per-source saturation point for log-scaled engagement normalization.
    /// Keys are normalized source names; anything absent uses the default scale.
    pub engagement_scales: HashMap<String, f64>,
    pub default_engagement_scale: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        let mut engagement_scales = HashMap::new();
        // Rough saturation points per platform: a reddit thread with 50k
        // combined votes+comments and a youtube video with 10M views both
        // normalize near 1.0.
        engagement_scales.insert("reddit".to_string(), 50_000.0);
        engagement_scales.insert("youtube".to_string(), 10_000_000.0);
        engagement_scales.insert("news".to_string(), 100.0);
        Self {
            relevance_weight: 0.40,
            engagement_weight: 0.30,
            recency_weight: 0.20,
            credibility_weight: 0.10,
            exact_match_boost: 0.20,
            recency_horizon_hours: 7 * 24,
            recency_floor: 0.05,
            engagement_scales,
            default_engagement_scale: 10_000.0,
        }
    }
}

impl ScoringConfig {
    pub fn weight_sum(&self) -> f64 {
        self.relevance_weight
            + self.engagement_weight
            + self.recency_weight
            + self.credibility_weight
    }

    pub fn recency_horizon(&self) -> Duration {
        Duration::from_secs(self.recency_horizon_hours * 3600)
    }

    pub fn engagement_scale_for(&self, source: &str) -> f64 {
        let key = source.trim().to_ascii_lowercase();
        self.engagement_scales
            .get(&key)
            .copied()
            .unwrap_or(self.default_engagement_scale)
            .max(1.0)
    }

    /// Ensure a usable weight set even when the TOML is odd: negative
    /// weights are zeroed, an all-zero set reverts to defaults.
    fn sanitize(&mut self) {
        for w in [
            &mut self.relevance_weight,
            &mut self.engagement_weight,
            &mut self.recency_weight,
            &mut self.credibility_weight,
        ] {
            if !w.is_finite() || *w < 0.0 {
                *w = 0.0;
            }
        }
        if self.weight_sum() <= 0.0 {
            let d = Self::default();
            self.relevance_weight = d.relevance_weight;
            self.engagement_weight = d.engagement_weight;
            self.recency_weight = d.recency_weight;
            self.credibility_weight = d.credibility_weight;
        }
        self.recency_floor = self.recency_floor.clamp(0.0, 1.0);
        self.exact_match_boost = self.exact_match_boost.clamp(0.0, 1.0);
    }
}

/// Thresholds for the trend delta rule. Defaults: +50% over the windowed
/// mean reads as gaining, -30% as losing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrendConfig {
    pub gain_threshold: f64,
    pub loss_threshold: f64,
    pub lookback_hours: u64,
    pub epsilon: f64,
}

impl Default for TrendConfig {
    fn default() -> Self {
        Self {
            gain_threshold: 0.50,
            loss_threshold: 0.30,
            lookback_hours: 24,
            epsilon: 1e-6,
        }
    }
}

impl TrendConfig {
    pub fn lookback_secs(&self) -> u64 {
        self.lookback_hours * 3600
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrelationConfig {
    /// Top-N extracted terms forming an item's keyword signature.
    pub signature_terms: usize,
    /// Items from distinct sources sharing at least this many salient
    /// keywords land in the same cluster.
    pub min_shared_keywords: usize,
    /// Composite-score floor below which an uncorrelated item is noise
    /// rather than a unique angle.
    pub unique_angle_floor: f64,
    /// Similarity above which two keywords are folded into one
    /// (normalized Levenshtein, catches plural/inflection variants).
    pub keyword_merge_similarity: f64,
}

impl Default for CorrelationConfig {
    fn default() -> Self {
        Self {
            signature_terms: 8,
            min_shared_keywords: 2,
            unique_angle_floor: 0.55,
            keyword_merge_similarity: 0.80,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 3600,
            max_entries: 1000,
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregatorConfig {
    pub fetch_timeout_secs: u64,
    pub default_limit: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            fetch_timeout_secs: 10,
            default_limit: 10,
        }
    }
}

impl AggregatorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Model passed to the hosted provider, if one is configured.
    pub model: String,
    pub attempt_timeout_secs: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            model: "openrouter/auto".to_string(),
            attempt_timeout_secs: 30,
        }
    }
}

impl SummaryConfig {
    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }
}

impl EngineConfig {
    /// Load from the path in `CONTEXT_ENGINE_CONFIG_PATH` (default
    /// `config/engine.toml`). A missing file yields defaults; a present
    /// but invalid file is an error so typos don't silently vanish.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut cfg = match fs::read_to_string(&path) {
            Ok(content) => Self::from_toml_str(&content)?,
            Err(_) => Self::default(),
        };
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: EngineConfig = toml::from_str(toml_str)?;
        cfg.scoring.sanitize();
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(ttl) = parse_secs_env(std::env::var(ENV_CACHE_TTL_SECS).ok()) {
            self.cache.ttl_secs = ttl;
        }
    }
}

// parse optional integer-seconds env; zero and garbage are ignored
fn parse_secs_env(raw: Option<String>) -> Option<u64> {
    raw.and_then(|s| s.trim().parse::<u64>().ok())
        .filter(|v| *v > 0)
}
