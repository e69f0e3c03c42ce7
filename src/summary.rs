// src/summary.rs
//! Render a [`ContextResult`] into the structured digest handed to
//! downstream script/audio/video generators, and optionally polish it
//! through the summary fallback chain.

use std::collections::BTreeSet;
use std::fmt::Write as _;

use crate::engine::ContextResult;
use crate::provider::{CompletionRequest, FallbackChain};
use crate::trend::TrendLabel;

const SUMMARY_SYSTEM_PROMPT: &str = "You are a content analyst. Condense the trending-topics \
digest into 300-500 words of insights for content creators. Focus on the themes themselves, \
not the platforms. Output only the summary text.";

/// Deterministic, structured digest of one pipeline run.
pub fn render_digest(result: &ContextResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "TRENDING CONTEXT: {}", result.topic);
    let _ = writeln!(out, "generated_at: {}", result.generated_at.to_rfc3339());

    // Key themes: union of cluster keywords.
    let themes: BTreeSet<&str> = result
        .clusters
        .iter()
        .flat_map(|c| c.theme_keywords.iter().map(|k| k.as_str()))
        .collect();
    if !themes.is_empty() {
        let listed: Vec<&str> = themes.into_iter().take(10).collect();
        let _ = writeln!(out, "\nKEY THEMES: {}", listed.join(", "));
    }

    if !result.trend_labels.is_empty() {
        let _ = writeln!(out, "\nMOMENTUM BY SOURCE:");
        for (source, label) in &result.trend_labels {
            let _ = writeln!(out, "- {source}: {}", label_text(*label));
        }
    }

    let _ = writeln!(out, "\nTOP ITEMS:");
    for scored in result.ranked_items.iter().take(5) {
        let _ = writeln!(
            out,
            "- [{}] {} (score {:.2})",
            scored.item.source, scored.item.title, scored.composite_score
        );
    }

    if !result.clusters.is_empty() {
        let _ = writeln!(out, "\nCROSS-SOURCE THREADS:");
        for cluster in result.clusters.iter().take(3) {
            let sources: Vec<&str> = cluster
                .sources_covered
                .iter()
                .map(|s| s.as_str())
                .collect();
            let keywords: Vec<&str> = cluster
                .theme_keywords
                .iter()
                .take(5)
                .map(|k| k.as_str())
                .collect();
            let _ = writeln!(
                out,
                "- {} sources ({}) converge on: {}",
                cluster.sources_covered.len(),
                sources.join(", "),
                keywords.join(", ")
            );
        }
    }

    if !result.unique_angles.is_empty() {
        let _ = writeln!(out, "\nUNIQUE ANGLES:");
        for &idx in result.unique_angles.iter().take(5) {
            if let Some(scored) = result.ranked_items.get(idx) {
                let _ = writeln!(out, "- [{}] {}", scored.item.source, scored.item.title);
            }
        }
    }

    if !result.source_errors.is_empty() {
        let _ = writeln!(out, "\nDEGRADED SOURCES:");
        for (source, err) in &result.source_errors {
            let _ = writeln!(out, "- {source}: {err}");
        }
    }

    out.trim_end().to_string()
}

fn label_text(label: TrendLabel) -> &'static str {
    match label {
        TrendLabel::Emerging => "emerging (first sighting)",
        TrendLabel::Gaining => "gaining traction",
        TrendLabel::Losing => "losing traction",
        TrendLabel::Stable => "stable",
    }
}

/// Digest polished by the fallback chain. Chains built by
/// [`build_summary_chain`](crate::provider::build_summary_chain) end in
/// a provider that cannot fail; if a custom chain still fails entirely,
/// the raw digest is returned as-is.
pub async fn summarize(chain: &FallbackChain, result: &ContextResult) -> (String, String) {
    let digest = render_digest(result);
    let req = CompletionRequest::new(SUMMARY_SYSTEM_PROMPT, digest.clone());
    match chain.execute(&req).await {
        Ok(outcome) => (outcome.completion.text, outcome.provider_used),
        Err(err) => {
            tracing::warn!(error = %err, "summary chain exhausted, serving raw digest");
            (digest, "digest".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlate::CorrelationCluster;
    use crate::ranking::{ScoreBreakdown, ScoredItem};
    use crate::source::RawItem;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn result_fixture() -> ContextResult {
        let item = |source: &str, title: &str, score: f64| ScoredItem {
            item: RawItem {
                source: source.to_string(),
                id: format!("{source}:{title}"),
                title: title.to_string(),
                body_snippet: String::new(),
                raw_engagement: BTreeMap::new(),
                published_at: Utc::now(),
                url: None,
            },
            scores: ScoreBreakdown {
                relevance: score,
                engagement: score,
                recency: score,
                credibility: score,
            },
            composite_score: score,
        };

        let mut trend_labels = BTreeMap::new();
        trend_labels.insert("reddit".to_string(), TrendLabel::Gaining);
        trend_labels.insert("news".to_string(), TrendLabel::Emerging);

        ContextResult {
            topic: "fusion energy".to_string(),
            ranked_items: vec![
                item("reddit", "fusion reactor sets record", 0.9),
                item("news", "fusion milestone confirmed", 0.8),
                item("youtube", "obscure reactor tour", 0.7),
            ],
            trend_labels,
            clusters: vec![CorrelationCluster {
                theme_keywords: ["fusion".to_string(), "reactor".to_string()].into(),
                members: vec![0, 1],
                sources_covered: ["reddit".to_string(), "news".to_string()].into(),
            }],
            unique_angles: vec![2],
            source_errors: BTreeMap::new(),
            generated_at: Utc::now(),
        }
    }

    #[test]
    fn digest_carries_every_section() {
        let digest = render_digest(&result_fixture());
        assert!(digest.contains("TRENDING CONTEXT: fusion energy"));
        assert!(digest.contains("KEY THEMES: fusion, reactor"));
        assert!(digest.contains("gaining traction"));
        assert!(digest.contains("UNIQUE ANGLES"));
        assert!(digest.contains("obscure reactor tour"));
    }

    #[test]
    fn digest_omits_empty_sections() {
        let mut result = result_fixture();
        result.clusters.clear();
        result.unique_angles.clear();
        let digest = render_digest(&result);
        assert!(!digest.contains("KEY THEMES"));
        assert!(!digest.contains("UNIQUE ANGLES"));
    }

    #[tokio::test]
    async fn summarize_reports_the_serving_provider() {
        let chain = crate::provider::build_summary_chain(&crate::config::SummaryConfig::default());
        let (text, provider) = summarize(&chain, &result_fixture()).await;
        assert!(!text.is_empty());
        // Without credentials the chain serves from the terminal provider.
        if std::env::var("OPENROUTER_API_KEY").is_err() {
            assert_eq!(provider, "rule-based");
        }
    }
}
