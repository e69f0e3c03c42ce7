// src/provider.rs
//! Generic provider-fallback controller for externally hosted inference
//! calls, plus the concrete providers used by the summarization step: a
//! hosted chat-completions client and a deterministic rule-based
//! condenser that cannot fail.
//!
//! Providers are attempted strictly in the configured order; a failure
//! advances to the next provider without retrying the same one. The
//! first success reports which provider served the request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use metrics::counter;
use serde::{Deserialize, Serialize};

use crate::config::SummaryConfig;
use crate::error::{AllProvidersFailed, ProviderError};

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub system: String,
    pub prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl CompletionRequest {
    pub fn new(system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            prompt: prompt.into(),
            max_tokens: 700,
            temperature: 0.7,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Completion {
    pub text: String,
}

/// Uniform completion capability, one instance per hosted backend.
#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError>;
    fn name(&self) -> &'static str;
}

/// One attempt inside an `execute` call; kept for metrics/debugging,
/// never persisted.
#[derive(Debug, Clone)]
pub struct ProviderAttempt {
    pub provider: String,
    pub ordinal: usize,
    pub latency: Duration,
    pub error: Option<ProviderError>,
}

#[derive(Debug, Clone)]
pub struct FallbackOutcome {
    pub completion: Completion,
    pub provider_used: String,
    pub attempts: Vec<ProviderAttempt>,
}

pub struct FallbackChain {
    providers: Vec<Arc<dyn CompletionProvider>>,
    attempt_timeout: Duration,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn CompletionProvider>>, attempt_timeout: Duration) -> Self {
        Self {
            providers,
            attempt_timeout,
        }
    }

    pub fn provider_names(&self) -> Vec<&'static str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Try providers in order, returning the first success together with
    /// the provider that served it. If every provider fails, the error
    /// names each one with its reason.
    pub async fn execute(
        &self,
        req: &CompletionRequest,
    ) -> Result<FallbackOutcome, AllProvidersFailed> {
        let mut attempts: Vec<ProviderAttempt> = Vec::with_capacity(self.providers.len());

        for (ordinal, provider) in self.providers.iter().enumerate() {
            match self.attempt(provider.as_ref(), ordinal, req, &mut attempts).await {
                Some(completion) => {
                    return Ok(FallbackOutcome {
                        completion,
                        provider_used: provider.name().to_string(),
                        attempts,
                    });
                }
                None => continue,
            }
        }

        Err(AllProvidersFailed {
            reasons: attempts
                .into_iter()
                .filter_map(|a| a.error.map(|e| (a.provider, e)))
                .collect(),
        })
    }

    /// Pin a single provider: no fallback, its failure surfaces directly.
    pub async fn execute_pinned(
        &self,
        provider_name: &str,
        req: &CompletionRequest,
    ) -> Result<FallbackOutcome, ProviderError> {
        let Some((ordinal, provider)) = self
            .providers
            .iter()
            .enumerate()
            .find(|(_, p)| p.name() == provider_name)
        else {
            return Err(ProviderError::Unavailable(format!(
                "no provider named `{provider_name}` in the chain"
            )));
        };

        let mut attempts = Vec::with_capacity(1);
        match self.attempt(provider.as_ref(), ordinal, req, &mut attempts).await {
            Some(completion) => Ok(FallbackOutcome {
                completion,
                provider_used: provider.name().to_string(),
                attempts,
            }),
            None => {
                let err = attempts
                    .pop()
                    .and_then(|a| a.error)
                    .unwrap_or_else(|| ProviderError::Unavailable("attempt vanished".into()));
                Err(err)
            }
        }
    }

    async fn attempt(
        &self,
        provider: &dyn CompletionProvider,
        ordinal: usize,
        req: &CompletionRequest,
        attempts: &mut Vec<ProviderAttempt>,
    ) -> Option<Completion> {
        let started = Instant::now();
        let result = match tokio::time::timeout(self.attempt_timeout, provider.complete(req)).await
        {
            Ok(res) => res,
            Err(_) => Err(ProviderError::Timeout(self.attempt_timeout)),
        };
        let latency = started.elapsed();
        counter!("context_provider_attempts_total").increment(1);

        match result {
            Ok(completion) => {
                attempts.push(ProviderAttempt {
                    provider: provider.name().to_string(),
                    ordinal,
                    latency,
                    error: None,
                });
                Some(completion)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    provider = provider.name(),
                    ordinal,
                    "provider attempt failed, advancing"
                );
                counter!("context_provider_failures_total").increment(1);
                attempts.push(ProviderAttempt {
                    provider: provider.name().to_string(),
                    ordinal,
                    latency,
                    error: Some(err),
                });
                None
            }
        }
    }
}

// ------------------------------------------------------------
// Concrete providers
// ------------------------------------------------------------

/// Hosted chat-completions provider (OpenRouter-compatible endpoint).
/// Requires `OPENROUTER_API_KEY`.
pub struct OpenRouterProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    endpoint: String,
}

impl OpenRouterProvider {
    pub fn new(model: &str) -> Self {
        let api_key = std::env::var("OPENROUTER_API_KEY").unwrap_or_default();
        let http = reqwest::Client::builder()
            .user_agent("trend-context-engine/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        Self {
            http,
            api_key,
            model: model.to_string(),
            endpoint: "https://openrouter.ai/api/v1/chat/completions".to_string(),
        }
    }

    pub fn has_credentials(&self) -> bool {
        !self.api_key.is_empty()
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenRouterProvider {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::Unavailable(
                "OPENROUTER_API_KEY not set".into(),
            ));
        }

        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: String,
        }

        let body = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: &req.system,
                },
                Msg {
                    role: "user",
                    content: &req.prompt,
                },
            ],
            temperature: req.temperature,
            max_tokens: req.max_tokens,
        };

        let resp = self
            .http
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;

        let status = resp.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            return Err(ProviderError::Unavailable(format!("HTTP {status}")));
        }

        let parsed: Resp = resp
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
        let content = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim())
            .unwrap_or("");
        if content.is_empty() {
            return Err(ProviderError::InvalidResponse("empty completion".into()));
        }

        Ok(Completion {
            text: content.to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "openrouter"
    }
}

/// Deterministic condenser used as the terminal entry of a summary
/// chain: keeps the leading lines of the prompt's digest up to a budget.
/// Cannot fail, which guarantees `execute` always succeeds for chains
/// that end with it.
pub struct RuleBasedSummarizer {
    pub max_chars: usize,
}

impl Default for RuleBasedSummarizer {
    fn default() -> Self {
        Self { max_chars: 2000 }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for RuleBasedSummarizer {
    async fn complete(&self, req: &CompletionRequest) -> Result<Completion, ProviderError> {
        let mut out = String::with_capacity(self.max_chars.min(4096));
        for line in req.prompt.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            if out.len() + line.len() + 1 > self.max_chars {
                break;
            }
            out.push_str(line);
            out.push('\n');
        }
        Ok(Completion {
            text: out.trim_end().to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "rule-based"
    }
}

/// Summarization chain: the hosted provider first when credentials
/// exist, always terminated by the rule-based condenser.
pub fn build_summary_chain(cfg: &SummaryConfig) -> FallbackChain {
    let mut providers: Vec<Arc<dyn CompletionProvider>> = Vec::new();
    let hosted = OpenRouterProvider::new(&cfg.model);
    if hosted.has_credentials() {
        providers.push(Arc::new(hosted));
    }
    providers.push(Arc::new(RuleBasedSummarizer::default()));
    FallbackChain::new(providers, cfg.attempt_timeout())
}
