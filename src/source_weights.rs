// src/source_weights.rs
//! Per-source credibility weights in `[0.0, 1.0]`, used as the
//! credibility sub-score when ranking mixed-source items.
//!
//! - Loads from JSON config (weights + aliases).
//! - Case-insensitive lookup with normalization of punctuation and dashes.
//! - Aliases map alternative spellings ("hacker news", "yt") to canonical names.
//! - Fallback order: aliases -> exact match -> substring match -> default.
//! - Ships a built-in `default_seed()` so the engine works without a file.

use std::{collections::HashMap, fs, path::Path};

use serde::Deserialize;

/// Configuration for source credibility, loaded from JSON or defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceCredibility {
    /// Weight used when no match is found.
    #[serde(default = "default_default_weight")]
    pub default_weight: f64,
    /// Explicit weights for canonical source names.
    #[serde(default)]
    pub weights: HashMap<String, f64>,
    /// Aliases mapping non-canonical names to canonical names.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

fn default_default_weight() -> f64 {
    0.60
}

impl SourceCredibility {
    /// Load from a JSON file, falling back to `default_seed()` on any error.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(path) {
            Ok(s) => serde_json::from_str(&s).unwrap_or_else(|_| Self::default_seed()),
            Err(_) => Self::default_seed(),
        }
    }

    /// Credibility weight for a source name.
    pub fn weight_for(&self, source: &str) -> f64 {
        let s = normalize(source);

        if let Some(canon) = self.aliases.get(&s) {
            let c = normalize(canon);
            if let Some(&w) = self.weights.get(&c) {
                return clamp01(w);
            }
        }

        if let Some(&w) = self.weights.get(&s) {
            return clamp01(w);
        }

        // Substring fallback, e.g. "reddit/r/technology" -> "reddit".
        for (k, &w) in &self.weights {
            if s.contains(k) {
                return clamp01(w);
            }
        }

        clamp01(self.default_weight)
    }

    /// Built-in seed covering the source mix this engine aggregates:
    /// discussion forums, video platforms, and established news outlets.
    pub fn default_seed() -> Self {
        let mut weights = HashMap::new();
        let mut aliases = HashMap::new();

        for (k, v) in [
            ("reddit", 0.60),
            ("hackernews", 0.75),
            ("youtube", 0.70),
            ("tiktok", 0.45),
            ("twitter", 0.55),
            ("news", 0.85),
            ("reuters", 0.90),
            ("ap", 0.90),
            ("bbc", 0.88),
            ("nytimes", 0.88),
            ("guardian", 0.85),
            ("bloomberg", 0.85),
            ("techcrunch", 0.78),
            ("wired", 0.80),
        ] {
            weights.insert(k.to_string(), v);
        }

        for (a, c) in [
            ("hn", "hackernews"),
            ("hacker news", "hackernews"),
            ("yt", "youtube"),
            ("x", "twitter"),
            ("google news", "news"),
            ("google_news", "news"),
            ("gnews", "news"),
            ("associated press", "ap"),
            ("nyt", "nytimes"),
            ("new york times", "nytimes"),
            ("the guardian", "guardian"),
        ] {
            aliases.insert(a.to_string(), c.to_string());
        }

        Self {
            default_weight: 0.60,
            weights,
            aliases,
        }
    }
}

/// Normalize input: lowercase, separators to spaces, collapse whitespace.
fn normalize(s: &str) -> String {
    let mut out = s.trim().to_ascii_lowercase();

    for ch in ['\u{2014}', '\u{2013}', '-', '/', '\\', '.', ','] {
        out = out.replace(ch, " ");
    }

    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clamp01(x: f64) -> f64 {
    x.clamp(0.0, 1.0)
}
