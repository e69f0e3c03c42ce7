// src/correlate.rs
//! Cross-source correlation: keyword signatures per item, clusters of
//! thematically overlapping items spanning at least two sources, and
//! "unique angle" items that no other source echoes.
//!
//! Recomputed every run; input items are read, never mutated. Clustering
//! is order-independent: the same input set yields the same partition
//! regardless of input ordering.

use std::collections::{BTreeSet, HashMap, HashSet};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use strsim::normalized_levenshtein;

use crate::config::CorrelationConfig;
use crate::ranking::ScoredItem;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "this", "that", "these", "those", "with", "from", "into", "over", "about", "after",
        "before", "their", "there", "where", "when", "what", "which", "while", "would", "could",
        "should", "have", "has", "had", "been", "being", "will", "just", "more", "most", "some",
        "such", "than", "then", "them", "they", "were", "your", "you", "because", "very", "also",
        "it's", "its", "how", "why", "who", "whom", "does", "doing", "here", "against", "between",
        "through", "during", "under", "again", "once", "only", "other", "same", "each",
    ]
    .into_iter()
    .collect()
});

/// A group of items from at least two sources sharing thematic keywords.
/// Members are indices into the ranked list the correlator was given.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CorrelationCluster {
    pub theme_keywords: BTreeSet<String>,
    pub members: Vec<usize>,
    pub sources_covered: BTreeSet<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CorrelationOutcome {
    pub clusters: Vec<CorrelationCluster>,
    /// Indices of high-scoring items with zero keyword overlap against
    /// every item from a different source.
    pub unique_angles: Vec<usize>,
}

pub struct Correlator {
    cfg: CorrelationConfig,
}

impl Correlator {
    pub fn new(cfg: CorrelationConfig) -> Self {
        Self { cfg }
    }

    /// Top-N salient keywords for one item. Near-duplicate terms
    /// ("model"/"models") are folded into the first-seen spelling so
    /// inflection noise doesn't split a theme.
    pub fn signature(&self, item: &ScoredItem) -> BTreeSet<String> {
        let text = item.item.text().to_lowercase();
        let mut counts: Vec<(String, usize)> = Vec::new();

        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.len() >= 4 && !STOP_WORDS.contains(w))
        {
            let merged = counts.iter().position(|(kept, _)| {
                kept.as_str() == word
                    || normalized_levenshtein(kept, word) >= self.cfg.keyword_merge_similarity
            });
            match merged {
                Some(i) => counts[i].1 += 1,
                None => counts.push((word.to_string(), 1)),
            }
        }

        // Count descending, then alphabetical: deterministic top-N.
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        counts
            .into_iter()
            .take(self.cfg.signature_terms)
            .map(|(w, _)| w)
            .collect()
    }

    pub fn correlate(&self, items: &[ScoredItem]) -> CorrelationOutcome {
        let signatures: Vec<BTreeSet<String>> =
            items.iter().map(|it| self.signature(it)).collect();

        // Union-find over item indices; pairs from distinct sources with
        // enough shared keywords merge into one component.
        let mut parent: Vec<usize> = (0..items.len()).collect();
        let mut cross_source_overlap = vec![false; items.len()];

        for i in 0..items.len() {
            for j in (i + 1)..items.len() {
                if items[i].item.source == items[j].item.source {
                    continue;
                }
                let shared = signatures[i].intersection(&signatures[j]).count();
                if shared > 0 {
                    cross_source_overlap[i] = true;
                    cross_source_overlap[j] = true;
                }
                if shared >= self.cfg.min_shared_keywords {
                    union(&mut parent, i, j);
                }
            }
        }

        let mut components: HashMap<usize, Vec<usize>> = HashMap::new();
        for i in 0..items.len() {
            components.entry(find(&mut parent, i)).or_default().push(i);
        }

        let mut clusters: Vec<CorrelationCluster> = components
            .into_values()
            .filter(|members| members.len() >= 2)
            .map(|mut members| {
                members.sort_unstable();
                let sources_covered: BTreeSet<String> = members
                    .iter()
                    .map(|&i| items[i].item.source.clone())
                    .collect();
                let theme_keywords = shared_theme(&members, &signatures);
                CorrelationCluster {
                    theme_keywords,
                    members,
                    sources_covered,
                }
            })
            .filter(|c| c.sources_covered.len() >= 2)
            .collect();
        clusters.sort_by_key(|c| c.members[0]);

        let unique_angles: Vec<usize> = (0..items.len())
            .filter(|&i| {
                !cross_source_overlap[i] && items[i].composite_score >= self.cfg.unique_angle_floor
            })
            .collect();

        CorrelationOutcome {
            clusters,
            unique_angles,
        }
    }
}

/// Keywords appearing in the signatures of at least two cluster members.
fn shared_theme(members: &[usize], signatures: &[BTreeSet<String>]) -> BTreeSet<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for &i in members {
        for kw in &signatures[i] {
            *counts.entry(kw.as_str()).or_insert(0) += 1;
        }
    }
    counts
        .into_iter()
        .filter(|(_, n)| *n >= 2)
        .map(|(kw, _)| kw.to_string())
        .collect()
}

fn find(parent: &mut Vec<usize>, i: usize) -> usize {
    let mut root = i;
    while parent[root] != root {
        root = parent[root];
    }
    // Path compression.
    let mut cur = i;
    while parent[cur] != root {
        let next = parent[cur];
        parent[cur] = root;
        cur = next;
    }
    root
}

fn union(parent: &mut Vec<usize>, a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        // Attach the larger root to the smaller for determinism.
        let (lo, hi) = if ra < rb { (ra, rb) } else { (rb, ra) };
        parent[hi] = lo;
    }
}
