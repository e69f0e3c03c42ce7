// tests/provider_fallback.rs
//! Ordered provider fallback: first success wins, total failure names
//! every provider, pinning disables fallback, attempts are bounded by
//! the per-attempt timeout.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use trend_context_engine::provider::{
    Completion, CompletionProvider, CompletionRequest, FallbackChain, RuleBasedSummarizer,
};
use trend_context_engine::ProviderError;

struct ScriptedProvider {
    name: &'static str,
    reply: Result<&'static str, ProviderError>,
    calls: Arc<AtomicUsize>,
}

impl ScriptedProvider {
    fn ok(name: &'static str, reply: &'static str) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                name,
                reply: Ok(reply),
                calls: calls.clone(),
            }),
            calls,
        )
    }

    fn failing(name: &'static str, err: ProviderError) -> (Arc<Self>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Arc::new(Self {
                name,
                reply: Err(err),
                calls: calls.clone(),
            }),
            calls,
        )
    }
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.reply.clone().map(|text| Completion {
            text: text.to_string(),
        })
    }
    fn name(&self) -> &'static str {
        self.name
    }
}

struct HangingProvider;

#[async_trait::async_trait]
impl CompletionProvider for HangingProvider {
    async fn complete(&self, _req: &CompletionRequest) -> Result<Completion, ProviderError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        unreachable!("attempt should be cancelled by the chain timeout")
    }
    fn name(&self) -> &'static str {
        "hanging"
    }
}

fn req() -> CompletionRequest {
    CompletionRequest::new("system", "summarize this")
}

#[tokio::test]
async fn falls_through_failures_to_the_first_success() {
    let (a, a_calls) = ScriptedProvider::failing("a", ProviderError::Unavailable("down".into()));
    let (b, b_calls) = ScriptedProvider::failing("b", ProviderError::RateLimited);
    let (c, c_calls) = ScriptedProvider::ok("c", "from c");
    let (d, d_calls) = ScriptedProvider::ok("d", "from d");

    let chain = FallbackChain::new(vec![a, b, c, d], Duration::from_secs(1));
    let out = chain.execute(&req()).await.expect("execute");

    assert_eq!(out.provider_used, "c");
    assert_eq!(out.completion.text, "from c");
    // No retry of a failed provider, and no attempt past the success.
    assert_eq!(a_calls.load(Ordering::SeqCst), 1);
    assert_eq!(b_calls.load(Ordering::SeqCst), 1);
    assert_eq!(c_calls.load(Ordering::SeqCst), 1);
    assert_eq!(d_calls.load(Ordering::SeqCst), 0);
    assert_eq!(out.attempts.len(), 3);
    assert_eq!(out.attempts[2].ordinal, 2);
}

#[tokio::test]
async fn total_failure_names_every_provider_and_reason() {
    let (a, _) = ScriptedProvider::failing("a", ProviderError::Unavailable("dns".into()));
    let (b, _) = ScriptedProvider::failing("b", ProviderError::InvalidResponse("junk".into()));

    let chain = FallbackChain::new(vec![a, b], Duration::from_secs(1));
    let err = chain.execute(&req()).await.unwrap_err();

    assert_eq!(err.reasons.len(), 2);
    assert_eq!(err.reasons[0].0, "a");
    assert_eq!(err.reasons[1].0, "b");
    let msg = err.to_string();
    assert!(msg.contains("dns"));
    assert!(msg.contains("junk"));
}

#[tokio::test]
async fn pinned_provider_failure_surfaces_without_fallback() {
    let (a, _) = ScriptedProvider::failing("a", ProviderError::RateLimited);
    let (b, b_calls) = ScriptedProvider::ok("b", "from b");

    let chain = FallbackChain::new(vec![a, b], Duration::from_secs(1));
    let err = chain.execute_pinned("a", &req()).await.unwrap_err();
    assert!(matches!(err, ProviderError::RateLimited));
    assert_eq!(b_calls.load(Ordering::SeqCst), 0, "pinning must not fall back");
}

#[tokio::test(start_paused = true)]
async fn hanging_provider_is_cancelled_and_chain_advances() {
    let (b, _) = ScriptedProvider::ok("b", "from b");
    let chain = FallbackChain::new(vec![Arc::new(HangingProvider), b], Duration::from_millis(50));

    let out = chain.execute(&req()).await.expect("execute");
    assert_eq!(out.provider_used, "b");
    assert!(matches!(
        out.attempts[0].error,
        Some(ProviderError::Timeout(_))
    ));
}

#[tokio::test]
async fn chain_ending_in_rule_based_provider_cannot_fail() {
    let (a, _) = ScriptedProvider::failing("a", ProviderError::Unavailable("down".into()));
    let chain = FallbackChain::new(
        vec![a, Arc::new(RuleBasedSummarizer::default())],
        Duration::from_secs(1),
    );
    let out = chain.execute(&req()).await.expect("must always succeed");
    assert_eq!(out.provider_used, "rule-based");
    assert_eq!(out.completion.text, "summarize this");
}
