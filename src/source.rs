// src/source.rs
//! Source adapter capability interface and the raw item shape adapters
//! return. Concrete clients (forum, video platform, news feed) live
//! outside this crate; the engine only sees this trait.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SourceError;

/// One trending item as returned by a source adapter. Immutable once
/// returned; scoring happens on a separate type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawItem {
    /// Source name, e.g. "reddit", "youtube", "news".
    pub source: String,
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub body_snippet: String,
    /// Source-specific raw metrics: upvotes, views, comments, shares.
    #[serde(default)]
    pub raw_engagement: BTreeMap<String, f64>,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl RawItem {
    /// Combined searchable text (title + snippet).
    pub fn text(&self) -> String {
        if self.body_snippet.is_empty() {
            self.title.clone()
        } else {
            format!("{} {}", self.title, self.body_snippet)
        }
    }

    /// Sum of the raw engagement metrics, floored at zero.
    pub fn total_engagement(&self) -> f64 {
        self.raw_engagement.values().map(|v| v.max(0.0)).sum()
    }
}

/// Uniform fetch capability, one instance per source.
#[async_trait::async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch(&self, topic: &str, limit: usize) -> Result<Vec<RawItem>, SourceError>;
    fn name(&self) -> &'static str;
}

/// Normalize feed text: decode HTML entities, strip tags, fold smart
/// quotes to ASCII, collapse whitespace. Items arrive from web sources
/// and routinely carry markup in titles.
pub fn normalize_text(s: &str) -> String {
    let mut out = html_escape::decode_html_entities(s).to_string();

    static RE_TAGS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, " ").to_string();

    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    static RE_WS: once_cell::sync::OnceCell<regex::Regex> = once_cell::sync::OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // Length cap keeps pathological snippets out of the scoring path.
    if out.chars().count() > 1500 {
        out = out.chars().take(1500).collect();
    }

    out
}
