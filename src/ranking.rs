// src/ranking.rs
//! Multi-factor ranking: relevance, engagement, recency, credibility,
//! combined into a composite score in `[0, 1]` and sorted descending.
//! Pure compute over already-fetched data; no I/O, suitable for unit
//! tests and offline evaluation.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ScoringConfig;
use crate::source::RawItem;
use crate::source_weights::SourceCredibility;

/// Per-factor sub-scores, each normalized to `[0, 1]` before combination.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreBreakdown {
    pub relevance: f64,
    pub engagement: f64,
    pub recency: f64,
    pub credibility: f64,
}

/// A raw item plus its scores. Created per aggregation run and never
/// mutated afterwards; a new run produces new objects.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredItem {
    pub item: RawItem,
    pub scores: ScoreBreakdown,
    pub composite_score: f64,
}

pub struct RankingEngine {
    cfg: ScoringConfig,
    credibility: SourceCredibility,
}

impl RankingEngine {
    pub fn new(cfg: ScoringConfig, credibility: SourceCredibility) -> Self {
        Self { cfg, credibility }
    }

    /// Score and sort items by descending composite score. The sort is
    /// stable, so equal scores retain source-fetch order and the output
    /// is deterministic for identical inputs.
    pub fn rank(&self, items: Vec<RawItem>, topic: &str, now: DateTime<Utc>) -> Vec<ScoredItem> {
        let topic_phrase = topic.trim().to_lowercase();
        let topic_terms: Vec<String> = topic_phrase
            .split_whitespace()
            .map(|t| t.to_string())
            .collect();

        let mut scored: Vec<ScoredItem> = items
            .into_iter()
            .map(|item| self.score_item(item, &topic_terms, &topic_phrase, now))
            .collect();

        scored.sort_by(|a, b| {
            b.composite_score
                .partial_cmp(&a.composite_score)
                .unwrap_or(Ordering::Equal)
        });
        scored
    }

    fn score_item(
        &self,
        item: RawItem,
        topic_terms: &[String],
        topic_phrase: &str,
        now: DateTime<Utc>,
    ) -> ScoredItem {
        let scores = ScoreBreakdown {
            relevance: self.relevance_score(&item, topic_terms, topic_phrase),
            engagement: self.engagement_score(&item),
            recency: self.recency_score(&item, now),
            credibility: self.credibility.weight_for(&item.source),
        };
        let composite = self.composite(&scores);
        ScoredItem {
            item,
            scores,
            composite_score: composite,
        }
    }

    /// Lexical overlap between item text and topic terms: fraction of
    /// topic terms present, with a bonus when the full phrase appears
    /// verbatim. Zero overlap scores 0; a substantial match lands near 1.
    fn relevance_score(&self, item: &RawItem, topic_terms: &[String], topic_phrase: &str) -> f64 {
        if topic_terms.is_empty() {
            return 0.0;
        }
        let text = item.text().to_lowercase();
        let tokens: std::collections::HashSet<&str> = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let matches = topic_terms
            .iter()
            .filter(|term| tokens.contains(term.as_str()))
            .count();
        let mut score = matches as f64 / topic_terms.len() as f64;

        if !topic_phrase.is_empty() && text.contains(topic_phrase) {
            score += self.cfg.exact_match_boost;
        }
        score.clamp(0.0, 1.0)
    }

    /// Log-scaled engagement so no single source's absolute metric
    /// magnitude dominates a mixed-source ranking: a saturated reddit
    /// thread and a saturated video both normalize near 1.0 even though
    /// their raw counts differ by orders of magnitude.
    fn engagement_score(&self, item: &RawItem) -> f64 {
        let raw = item.total_engagement();
        let scale = self.cfg.engagement_scale_for(&item.source);
        ((1.0 + raw).ln() / (1.0 + scale).ln()).clamp(0.0, 1.0)
    }

    /// Linear decay from 1.0 at publication to the configured floor at
    /// the horizon (default 7 days). Future-dated items score 1.0.
    fn recency_score(&self, item: &RawItem, now: DateTime<Utc>) -> f64 {
        let age_secs = (now - item.published_at).num_seconds().max(0) as f64;
        let horizon = self.cfg.recency_horizon().as_secs() as f64;
        if horizon <= 0.0 {
            return self.cfg.recency_floor;
        }
        (1.0 - age_secs / horizon).max(self.cfg.recency_floor)
    }

    fn composite(&self, s: &ScoreBreakdown) -> f64 {
        let sum = self.cfg.weight_sum();
        let weighted = self.cfg.relevance_weight * s.relevance
            + self.cfg.engagement_weight * s.engagement
            + self.cfg.recency_weight * s.recency
            + self.cfg.credibility_weight * s.credibility;
        (weighted / sum).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use std::collections::BTreeMap;

    fn engine() -> RankingEngine {
        RankingEngine::new(ScoringConfig::default(), SourceCredibility::default_seed())
    }

    fn item(source: &str, title: &str, engagement: f64, age_hours: i64) -> RawItem {
        let mut raw = BTreeMap::new();
        if engagement > 0.0 {
            raw.insert("score".to_string(), engagement);
        }
        RawItem {
            source: source.to_string(),
            id: format!("{source}:{title}"),
            title: title.to_string(),
            body_snippet: String::new(),
            raw_engagement: raw,
            published_at: Utc::now() - ChronoDuration::hours(age_hours),
            url: None,
        }
    }

    #[test]
    fn output_is_sorted_descending_and_is_a_permutation() {
        let eng = engine();
        let items = vec![
            item("reddit", "quantum breakthrough in the lab", 10.0, 1),
            item("news", "quantum computing milestone reached", 50.0, 1),
            item("youtube", "cooking pasta at home", 500.0, 1),
        ];
        let n = items.len();
        let ranked = eng.rank(items, "quantum computing", Utc::now());
        assert_eq!(ranked.len(), n);
        for pair in ranked.windows(2) {
            assert!(pair[0].composite_score >= pair[1].composite_score);
        }
        // The off-topic item ends last.
        assert_eq!(ranked[n - 1].item.source, "youtube");
    }

    #[test]
    fn composite_is_bounded_and_equals_weighted_sum() {
        let eng = engine();
        let ranked = eng.rank(
            vec![item("news", "quantum computing milestone", 80.0, 2)],
            "quantum computing",
            Utc::now(),
        );
        let s = &ranked[0];
        assert!(s.composite_score >= 0.0 && s.composite_score <= 1.0);
        let expected = 0.40 * s.scores.relevance
            + 0.30 * s.scores.engagement
            + 0.20 * s.scores.recency
            + 0.10 * s.scores.credibility;
        assert!((s.composite_score - expected).abs() < 1e-9);
    }

    #[test]
    fn zero_overlap_scores_zero_relevance() {
        let eng = engine();
        let ranked = eng.rank(
            vec![item("reddit", "gardening tips for spring", 5.0, 1)],
            "quantum computing",
            Utc::now(),
        );
        assert_eq!(ranked[0].scores.relevance, 0.0);
    }

    #[test]
    fn exact_phrase_match_scores_near_one() {
        let eng = engine();
        let ranked = eng.rank(
            vec![item("news", "quantum computing is here", 5.0, 1)],
            "quantum computing",
            Utc::now(),
        );
        assert!((ranked[0].scores.relevance - 1.0).abs() < 1e-9);
    }

    #[test]
    fn old_items_floor_instead_of_going_negative() {
        let eng = engine();
        let ranked = eng.rank(
            vec![item("news", "quantum computing", 5.0, 30 * 24)],
            "quantum computing",
            Utc::now(),
        );
        assert!((ranked[0].scores.recency - 0.05).abs() < 1e-9);
    }

    #[test]
    fn engagement_normalization_keeps_sources_comparable() {
        let eng = engine();
        // Half-saturated on each platform's own scale.
        let reddit = item("reddit", "t", 25_000.0, 1);
        let youtube = item("youtube", "t", 5_000_000.0, 1);
        let ranked = eng.rank(vec![reddit, youtube], "t", Utc::now());
        let diff = (ranked[0].scores.engagement - ranked[1].scores.engagement).abs();
        assert!(diff < 0.1, "log scales should land close, diff={diff}");
    }

    #[test]
    fn ties_retain_fetch_order() {
        let eng = engine();
        // Identical in every scored dimension; only ids differ.
        let a = item("news", "quantum computing update", 100.0, 1);
        let mut b = a.clone();
        b.id = "news:second".to_string();
        let ranked = eng.rank(vec![a.clone(), b.clone()], "quantum computing", Utc::now());
        assert_eq!(ranked[0].item.id, a.id);
        assert_eq!(ranked[1].item.id, "news:second");
    }
}
