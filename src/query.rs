// src/query.rs
//! Query analysis: classify a free-text request into an intent, topic
//! set, context-source needs, and implicit requirements.
//!
//! An AI-assisted front can be attached via the fallback chain; any
//! failure there silently degrades to the deterministic rule-based
//! analyzer, so the caller always receives a usable result.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::provider::{CompletionRequest, FallbackChain};

/// Sources the rule-based analyzer asks for when an intent wants "all".
/// The engine intersects these with its configured adapters.
pub const DEFAULT_SOURCES: [&str; 3] = ["reddit", "youtube", "news"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    TrendingTopics,
    ScriptGeneration,
    VideoCreation,
    VoiceCloning,
    AudioGeneration,
    GeneralQuery,
}

impl Intent {
    fn from_str(s: &str) -> Option<Self> {
        match s {
            "trending_topics" => Some(Self::TrendingTopics),
            "script_generation" => Some(Self::ScriptGeneration),
            "video_creation" => Some(Self::VideoCreation),
            "voice_cloning" => Some(Self::VoiceCloning),
            "audio_generation" => Some(Self::AudioGeneration),
            "general_query" | "generic" => Some(Self::GeneralQuery),
            _ => None,
        }
    }
}

/// Explicit constraints found in the query. Absence is omission, not a
/// sentinel value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Requirements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voice_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
}

impl Requirements {
    /// Fill gaps from `other` without overriding detected values.
    fn merge_missing_from(&mut self, other: Requirements) {
        if self.duration_secs.is_none() {
            self.duration_secs = other.duration_secs;
        }
        if self.style.is_none() {
            self.style = other.style;
        }
        if self.voice_name.is_none() {
            self.voice_name = other.voice_name;
        }
        if self.video_path.is_none() {
            self.video_path = other.video_path;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    pub intent: Intent,
    pub topics: Vec<String>,
    pub context_sources: BTreeSet<String>,
    pub requirements: Requirements,
    pub confidence: f64,
    /// Whether the engine should fetch context for this query at all.
    pub should_fetch: bool,
    /// Per-source item budget suggested for the intent.
    pub fetch_limit: usize,
}

pub struct QueryAnalyzer {
    chain: Option<FallbackChain>,
}

impl QueryAnalyzer {
    /// Deterministic analyzer only.
    pub fn rule_based() -> Self {
        Self { chain: None }
    }

    /// Rule-based analyzer fronted by an AI chain; the chain's failures
    /// degrade silently.
    pub fn with_ai(chain: FallbackChain) -> Self {
        Self { chain: Some(chain) }
    }

    /// Never fails: an unusable AI response falls back to the rules.
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        if let Some(chain) = &self.chain {
            match self.analyze_with_ai(chain, query).await {
                Some(analysis) => return analysis,
                None => {
                    tracing::warn!("AI query analysis degraded to rule-based");
                }
            }
        }
        analyze_with_rules(query)
    }

    async fn analyze_with_ai(&self, chain: &FallbackChain, query: &str) -> Option<QueryAnalysis> {
        let req = CompletionRequest::new(
            ANALYSIS_SYSTEM_PROMPT,
            format!("Analyze this query and return ONLY the JSON object: \"{query}\""),
        );
        let outcome = chain.execute(&req).await.ok()?;
        parse_ai_analysis(&outcome.completion.text, query)
    }
}

const ANALYSIS_SYSTEM_PROMPT: &str = r#"You classify content-creation queries.
Return ONLY valid JSON: {"intent": "...", "topics": [...], "context_sources": [...],
"requirements": {"duration_secs": null, "style": null, "voice_name": null, "video_path": null},
"confidence": 0.0}
Intents: trending_topics, script_generation, video_creation, voice_cloning, audio_generation, general_query.
Sources: reddit, youtube, news, all, none."#;

/// Loosely-typed AI reply; every field optional so a sloppy response
/// still normalizes instead of erroring.
#[derive(Debug, Default, Deserialize)]
struct RawAnalysis {
    #[serde(default)]
    intent: Option<String>,
    #[serde(default)]
    topics: Option<Vec<String>>,
    #[serde(default)]
    context_sources: Option<Vec<String>>,
    #[serde(default)]
    requirements: Option<Requirements>,
    #[serde(default)]
    confidence: Option<f64>,
}

fn parse_ai_analysis(reply: &str, query: &str) -> Option<QueryAnalysis> {
    let json = strip_code_fences(reply);
    let raw: RawAnalysis = serde_json::from_str(json).ok()?;

    let intent = raw
        .intent
        .as_deref()
        .and_then(Intent::from_str)
        .unwrap_or(Intent::GeneralQuery);

    let mut topics: Vec<String> = raw
        .topics
        .unwrap_or_default()
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| t.len() > 2)
        .collect();
    if topics.is_empty() {
        topics = extract_topics(query);
    }

    let mut analysis = analysis_for_intent(intent, topics, query);

    // Sources from the reply, validated against the known set; content
    // intents always need context even if the reply says otherwise.
    if let Some(sources) = raw.context_sources {
        let expanded = expand_sources(&sources);
        if !expanded.is_empty() && analysis.should_fetch {
            analysis.context_sources = expanded;
        }
    }

    if let Some(reqs) = raw.requirements {
        let mut merged = reqs;
        merged.merge_missing_from(detect_requirements(query));
        analysis.requirements = merged;
    }

    if let Some(c) = raw.confidence {
        if (0.0..=1.0).contains(&c) {
            analysis.confidence = c;
        }
    }

    Some(analysis)
}

fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    if let Some(inner) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    {
        return inner.trim_start().trim_end_matches("```").trim();
    }
    trimmed
}

fn expand_sources(sources: &[String]) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for s in sources {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "all" => {
                out.extend(DEFAULT_SOURCES.iter().map(|s| s.to_string()));
            }
            "none" => return BTreeSet::new(),
            known if DEFAULT_SOURCES.contains(&known) => {
                out.insert(known.to_string());
            }
            _ => {}
        }
    }
    out
}

/// Deterministic rule-based analysis. Always yields at least one topic
/// for a non-empty query (the query itself as a last resort).
pub fn analyze_with_rules(query: &str) -> QueryAnalysis {
    let q = query.to_lowercase();

    let intent = if contains_any(
        &q,
        &["trending", "what's happening", "what's going on", "current events", "latest"],
    ) {
        Intent::TrendingTopics
    } else if contains_any(&q, &["script", "monologue", "write", "draft"]) {
        Intent::ScriptGeneration
    } else if contains_any(&q, &["video", "talking head"]) {
        Intent::VideoCreation
    } else if contains_any(&q, &["clone", "mimic"]) {
        Intent::VoiceCloning
    } else if contains_any(&q, &["audio", "speech", "tts", "narrate"]) {
        Intent::AudioGeneration
    } else {
        Intent::GeneralQuery
    };

    analysis_for_intent(intent, extract_topics(query), query)
}

/// Per-intent source/limit table; content intents always fetch context,
/// audio/voice intents never do.
fn analysis_for_intent(intent: Intent, topics: Vec<String>, query: &str) -> QueryAnalysis {
    let all: BTreeSet<String> = DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect();
    let (context_sources, should_fetch, fetch_limit) = match intent {
        Intent::TrendingTopics => (all, true, 10),
        Intent::ScriptGeneration | Intent::VideoCreation => (all, true, 5),
        Intent::VoiceCloning | Intent::AudioGeneration => (BTreeSet::new(), false, 0),
        Intent::GeneralQuery => {
            if topics.is_empty() {
                (BTreeSet::new(), false, 0)
            } else {
                (all, true, 3)
            }
        }
    };

    QueryAnalysis {
        intent,
        topics,
        context_sources,
        requirements: detect_requirements(query),
        confidence: 0.7,
        should_fetch,
        fetch_limit,
    }
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

static STOP_WORDS: Lazy<BTreeSet<&'static str>> = Lazy::new(|| {
    [
        "what", "is", "are", "the", "a", "an", "about", "for", "to", "with", "how", "when",
        "where", "why", "me", "my", "of", "on", "in", "and", "please", "create", "make", "give",
        "generate", "write", "video", "script", "audio", "trending", "latest",
    ]
    .into_iter()
    .collect()
});

/// Extract candidate topics: quoted phrases first, then runs of
/// capitalized or long words, then the leading meaningful words.
pub fn extract_topics(query: &str) -> Vec<String> {
    let mut topics: Vec<String> = Vec::new();

    static RE_QUOTED: Lazy<Regex> = Lazy::new(|| Regex::new(r#""([^"]+)""#).unwrap());
    for caps in RE_QUOTED.captures_iter(query) {
        topics.push(caps[1].trim().to_string());
    }

    // Runs of capitalized words or long words form phrases.
    let mut current: Vec<&str> = Vec::new();
    for word in query.split_whitespace() {
        let clean: String = word.chars().filter(|c| c.is_alphanumeric()).collect();
        if clean.is_empty() || STOP_WORDS.contains(clean.to_lowercase().as_str()) {
            if !current.is_empty() {
                topics.push(current.join(" "));
                current.clear();
            }
            continue;
        }
        if clean.chars().next().is_some_and(|c| c.is_uppercase()) || clean.len() > 4 {
            current.push(word.trim_matches(|c: char| !c.is_alphanumeric()));
        } else if !current.is_empty() {
            topics.push(current.join(" "));
            current.clear();
        }
    }
    if !current.is_empty() {
        topics.push(current.join(" "));
    }

    topics = topics
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| t.len() > 2)
        .collect();
    topics.dedup();

    // Last resort: leading meaningful words, then the query itself.
    if topics.is_empty() {
        let words: Vec<&str> = query
            .split_whitespace()
            .filter(|w| w.len() > 2 && !STOP_WORDS.contains(w.to_lowercase().as_str()))
            .take(3)
            .collect();
        if !words.is_empty() {
            topics.push(words.join(" "));
        } else if !query.trim().is_empty() {
            topics.push(query.trim().to_string());
        }
    }

    topics.truncate(5);
    topics
}

/// Detect implicit constraints: duration, style adjective, voice name,
/// video file path.
pub fn detect_requirements(query: &str) -> Requirements {
    let q = query.to_lowercase();
    let mut reqs = Requirements::default();

    static RE_DURATION: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"(\d+)\s*(seconds?|secs?|minutes?|mins?)\b").unwrap());
    if let Some(caps) = RE_DURATION.captures(&q) {
        if let Ok(n) = caps[1].parse::<u32>() {
            let unit = &caps[2];
            reqs.duration_secs = Some(if unit.starts_with("min") { n * 60 } else { n });
        }
    }

    for (style, keywords) in [
        ("informative", &["informative", "educational", "factual"][..]),
        ("engaging", &["engaging", "exciting", "captivating"][..]),
        ("funny", &["funny", "humorous", "comedy"][..]),
        ("serious", &["serious", "formal", "professional"][..]),
        ("casual", &["casual", "relaxed", "conversational"][..]),
    ] {
        if contains_any(&q, keywords) {
            reqs.style = Some(style.to_string());
            break;
        }
    }

    static RE_VOICE: Lazy<Regex> = Lazy::new(|| {
        Regex::new(r#"voice[\s"]+(?:named|called|is)?[\s"]*([A-Za-z_][A-Za-z0-9_]*)"#).unwrap()
    });
    if let Some(caps) = RE_VOICE.captures(query) {
        reqs.voice_name = Some(caps[1].to_string());
    }

    static RE_PATH: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"([/\\][\w/\\.-]+\.(?:mp4|mov|avi))").unwrap());
    if let Some(caps) = RE_PATH.captures(query) {
        reqs.video_path = Some(caps[1].to_string());
    }

    reqs
}
