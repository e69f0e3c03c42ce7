//! Demo that runs the full pipeline over in-memory fixture sources and
//! prints the digest (no network, no API keys needed).

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use trend_context_engine::{
    ContextEngine, EngineConfig, RawItem, SourceAdapter, SourceCredibility, SourceError,
};

struct FixtureSource {
    name: &'static str,
    items: Vec<(&'static str, f64, i64)>, // (title, engagement, age_hours)
}

#[async_trait::async_trait]
impl SourceAdapter for FixtureSource {
    async fn fetch(&self, _topic: &str, limit: usize) -> Result<Vec<RawItem>, SourceError> {
        Ok(self
            .items
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, (title, engagement, age_hours))| {
                let mut raw = BTreeMap::new();
                raw.insert("score".to_string(), *engagement);
                RawItem {
                    source: self.name.to_string(),
                    id: format!("{}-{}", self.name, i),
                    title: (*title).to_string(),
                    body_snippet: String::new(),
                    raw_engagement: raw,
                    published_at: Utc::now() - Duration::hours(*age_hours),
                    url: None,
                }
            })
            .collect())
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt().with_target(false).init();

    let adapters: Vec<Arc<dyn SourceAdapter>> = vec![
        Arc::new(FixtureSource {
            name: "reddit",
            items: vec![
                ("Fusion energy startup claims net gain", 12_400.0, 3),
                ("What fusion breakthroughs mean for the grid", 3_100.0, 9),
            ],
        }),
        Arc::new(FixtureSource {
            name: "news",
            items: vec![
                ("Fusion energy milestone confirmed by lab", 60.0, 2),
                ("Energy prices fall as supply recovers", 40.0, 20),
            ],
        }),
        Arc::new(FixtureSource {
            name: "youtube",
            items: vec![("Inside an experimental fusion reactor", 2_400_000.0, 14)],
        }),
    ];

    let engine = ContextEngine::new(
        EngineConfig::load()?,
        adapters,
        SourceCredibility::load_from_file("source_weights.json"),
    );

    let analysis = engine.analyze_query("what's trending in fusion energy?").await;
    println!("intent: {:?}, topics: {:?}\n", analysis.intent, analysis.topics);

    let result = engine.get_context("fusion energy", None, false).await?;
    let (summary, provider) = engine.summarize_context(&result).await;
    println!("{summary}\n");
    println!("(summary via {provider}; cache: {:?})", engine.cache_stats());
    Ok(())
}
