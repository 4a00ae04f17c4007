//! LLM adapter: provider abstraction + file cache + daily limit.
//! Both model roles (knowledge search, reasoning) go through the same wrapper.

use std::fs;
use std::future::Future;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::ai::{AiConfig, ModelProfile};

// ------------------------------------------------------------
// Public surface
// ------------------------------------------------------------

/// A single-turn chat completion: persona/system text plus the user instruction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub system: Option<String>,
    pub prompt: String,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

pub type CompletionFuture<'a> = Pin<Box<dyn Future<Output = Result<String>> + Send + 'a>>;

/// Trait object used by the pipeline, report generator and tests.
pub trait LlmClient: Send + Sync {
    /// Plain-text model answer. Transport and HTTP failures are errors.
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a>;
    /// Provider name for diagnostics.
    fn provider_name(&self) -> &'static str;
}

/// Convenient alias used by callers.
pub type DynLlmClient = Arc<dyn LlmClient>;

/// Both roles, built from one config.
#[derive(Clone)]
pub struct LlmClients {
    pub knowledge: DynLlmClient,
    pub reasoning: DynLlmClient,
}

/// Factory: build clients according to config and environment variables.
///
/// * If `AI_TEST_MODE=mock`, returns deterministic mock clients.
/// * Else if `config.enabled==false`, returns disabled clients.
/// * Else builds the real chat-completions providers wrapped with caching + daily limit.
pub fn build_clients_from_config(config: &AiConfig, cache_dir: PathBuf) -> Result<LlmClients> {
    if std::env::var("AI_TEST_MODE")
        .map(|v| v == "mock")
        .unwrap_or(false)
    {
        let knowledge = MockProvider {
            fixed: "Acme builds rockets (mock).".to_string(),
        };
        let reasoning = MockProvider {
            fixed: "[]".to_string(),
        };
        return Ok(LlmClients {
            knowledge: Arc::new(CachingClient::new(
                knowledge,
                cache_dir.clone(),
                config.daily_limit,
            )),
            reasoning: Arc::new(CachingClient::new(reasoning, cache_dir, config.daily_limit)),
        });
    }

    if !config.enabled {
        return Ok(LlmClients {
            knowledge: Arc::new(DisabledClient),
            reasoning: Arc::new(DisabledClient),
        });
    }

    // One shared counter so the daily limit covers both roles.
    let counter = Arc::new(Mutex::new(
        load_daily_counter(&cache_dir).unwrap_or_default(),
    ));
    let knowledge = ChatCompletionsProvider::from_profile(&config.knowledge)?;
    let reasoning = ChatCompletionsProvider::from_profile(&config.reasoning)?;
    Ok(LlmClients {
        knowledge: Arc::new(CachingClient::with_counter(
            knowledge,
            cache_dir.clone(),
            config.daily_limit,
            counter.clone(),
        )),
        reasoning: Arc::new(CachingClient::with_counter(
            reasoning,
            cache_dir,
            config.daily_limit,
            counter,
        )),
    })
}

// ------------------------------------------------------------
// Provider abstraction + concrete providers
// ------------------------------------------------------------

/// Low-level provider: does a *real* remote call. Separated so we can reuse the same
/// caching wrapper for production and tests.
pub trait Provider: Send + Sync + 'static {
    fn fetch<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a>;
    fn name(&self) -> &'static str;
    /// Model id, part of the cache key.
    fn model(&self) -> &str;
}

/// OpenAI-compatible Chat Completions provider (OpenAI, Perplexity).
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    name: &'static str,
}

impl ChatCompletionsProvider {
    pub fn from_profile(profile: &ModelProfile) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("competitor-research/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(120))
            .build()
            .context("building llm http client")?;
        let name = match profile.provider.as_str() {
            "perplexity" => "perplexity",
            _ => "openai",
        };
        Ok(Self {
            http,
            endpoint: format!("{}/chat/completions", profile.endpoint_root()),
            api_key: profile.api_key.clone(),
            model: profile.model.clone(),
            temperature: profile.temperature,
            max_tokens: profile.max_tokens,
            name,
        })
    }
}

impl Provider for ChatCompletionsProvider {
    fn fetch<'a>(&'a self, input: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async move {
            if self.api_key.is_empty() {
                return Err(anyhow!("{} api key is empty", self.name));
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
                #[serde(skip_serializing_if = "Option::is_none")]
                temperature: Option<f32>,
                #[serde(skip_serializing_if = "Option::is_none")]
                max_tokens: Option<u32>,
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
                content: Option<String>,
            }

            let mut messages = Vec::with_capacity(2);
            if let Some(sys) = input.system.as_deref() {
                messages.push(Msg {
                    role: "system",
                    content: sys,
                });
            }
            messages.push(Msg {
                role: "user",
                content: &input.prompt,
            });
            let req = Req {
                model: &self.model,
                messages,
                temperature: self.temperature,
                max_tokens: self.max_tokens,
            };

            let resp = self
                .http
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&req)
                .send()
                .await
                .with_context(|| format!("{} request", self.name))?
                .error_for_status()
                .with_context(|| format!("{} non-2xx", self.name))?;

            let body: Resp = resp
                .json()
                .await
                .with_context(|| format!("{} response body", self.name))?;
            let content = body
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();
            Ok(content.trim().to_string())
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Always errors; used when AI is disabled so research runs fail loudly per competitor.
pub struct DisabledClient;

impl LlmClient for DisabledClient {
    fn complete<'a>(&'a self, _req: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(async { Err(anyhow!("AI is disabled in config")) })
    }
    fn provider_name(&self) -> &'static str {
        "disabled"
    }
}

/// Simple mock provider for tests/local runs.
#[derive(Clone)]
pub struct MockProvider {
    pub fixed: String,
}

impl Provider for MockProvider {
    fn fetch<'a>(&'a self, _req: &'a CompletionRequest) -> CompletionFuture<'a> {
        let out = self.fixed.clone();
        Box::pin(async move { Ok(out) })
    }
    fn name(&self) -> &'static str {
        "mock"
    }
    fn model(&self) -> &str {
        "mock"
    }
}

// ------------------------------------------------------------
// Caching client wrapper (file cache + daily limit)
// ------------------------------------------------------------

/// Counter state is guarded by a `Mutex`; it may be shared between role clients.
pub struct CachingClient<P: Provider> {
    inner: P,
    cache_dir: PathBuf,
    daily_limit_max: u32,
    counter: Arc<Mutex<DailyCounter>>,
}

impl<P: Provider> CachingClient<P> {
    pub fn new(inner: P, cache_dir: PathBuf, daily_limit_max: u32) -> Self {
        let counter = Arc::new(Mutex::new(
            load_daily_counter(&cache_dir).unwrap_or_default(),
        ));
        Self::with_counter(inner, cache_dir, daily_limit_max, counter)
    }

    fn with_counter(
        inner: P,
        cache_dir: PathBuf,
        daily_limit_max: u32,
        counter: Arc<Mutex<DailyCounter>>,
    ) -> Self {
        let _ = fs::create_dir_all(&cache_dir); // best-effort
        Self {
            inner,
            cache_dir,
            daily_limit_max,
            counter,
        }
    }

    async fn complete_impl(&self, req: &CompletionRequest) -> Result<String> {
        // 1) Cache lookup; hits are served even once the daily limit is spent.
        let key = cache_key(self.inner.model(), req);
        if let Some(hit) = read_cache_file(&self.cache_dir, &key) {
            counter!("llm_cache_hits_total").increment(1);
            return Ok(hit.content);
        }

        // 2) Check daily limit (only real API calls increment).
        {
            let mut g = self
                .counter
                .lock()
                .map_err(|_| anyhow!("daily counter poisoned"))?;
            if g.is_expired() {
                g.reset_to_today();
                let _ = save_daily_counter(&self.cache_dir, &g);
            }
            if g.count >= self.daily_limit_max {
                return Err(anyhow!(
                    "daily AI limit of {} calls reached",
                    self.daily_limit_max
                ));
            }
        }

        // 3) Real call.
        counter!("llm_calls_total", "provider" => self.inner.name()).increment(1);
        let fresh = self.inner.fetch(req).await?;
        if !fresh.is_empty() {
            let _ = write_cache_file(
                &self.cache_dir,
                &key,
                &CachedCompletion {
                    content: fresh.clone(),
                },
            );
        }
        if let Ok(mut g) = self.counter.lock() {
            g.count = g.count.saturating_add(1);
            let _ = save_daily_counter(&self.cache_dir, &g);
        }
        Ok(fresh)
    }
}

impl<P: Provider> LlmClient for CachingClient<P> {
    fn complete<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a> {
        Box::pin(self.complete_impl(req))
    }
    fn provider_name(&self) -> &'static str {
        self.inner.name()
    }
}

// ------------------------------------------------------------
// File cache helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedCompletion {
    content: String,
}

pub fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache/ai")
}

/// Keyed per day: research answers are only reused within the same UTC day.
fn cache_key(model: &str, req: &CompletionRequest) -> String {
    let mut hasher = Sha256::new();
    hasher.update(today().as_bytes());
    hasher.update([0]);
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(req.system.as_deref().unwrap_or_default().as_bytes());
    hasher.update([0]);
    hasher.update(req.prompt.as_bytes());
    let digest = hasher.finalize();
    digest.iter().take(16).map(|b| format!("{b:02x}")).collect()
}

fn cache_path(dir: &Path, key: &str) -> PathBuf {
    dir.join(format!("{key}.json"))
}

fn read_cache_file(dir: &Path, key: &str) -> Option<CachedCompletion> {
    let path = cache_path(dir, key);
    let mut file = fs::File::open(path).ok()?;
    let mut buf = String::new();
    file.read_to_string(&mut buf).ok()?;
    serde_json::from_str(&buf).ok()
}

fn write_cache_file(dir: &Path, key: &str, value: &CachedCompletion) -> io::Result<()> {
    let path = cache_path(dir, key);
    let tmp = path.with_extension("json.tmp");
    let json = serde_json::to_string(value).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(json.as_bytes())?;
    fs::rename(tmp, path)?;
    Ok(())
}

// ------------------------------------------------------------
// Daily counter helpers
// ------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DailyCounter {
    date: String,
    count: u32,
}
impl Default for DailyCounter {
    fn default() -> Self {
        Self {
            date: today(),
            count: 0,
        }
    }
}
impl DailyCounter {
    fn is_expired(&self) -> bool {
        self.date != today()
    }
    fn reset_to_today(&mut self) {
        self.date = today();
        self.count = 0;
    }
}

fn today() -> String {
    chrono::Utc::now().format("%Y-%m-%d").to_string()
}

fn counter_path(dir: &Path) -> PathBuf {
    dir.join("daily_count.json")
}

fn load_daily_counter(dir: &Path) -> io::Result<DailyCounter> {
    let p = counter_path(dir);
    let s = fs::read_to_string(p)?;
    let dc: DailyCounter =
        serde_json::from_str(&s).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    Ok(dc)
}

fn save_daily_counter(dir: &Path, dc: &DailyCounter) -> io::Result<()> {
    let p = counter_path(dir);
    let tmp = p.with_extension("json.tmp");
    let s = serde_json::to_string(dc).map_err(io::Error::other)?;
    let mut f = fs::File::create(&tmp)?;
    f.write_all(s.as_bytes())?;
    fs::rename(tmp, p)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingProvider {
        calls: Arc<AtomicUsize>,
    }

    impl Provider for CountingProvider {
        fn fetch<'a>(&'a self, req: &'a CompletionRequest) -> CompletionFuture<'a> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let out = format!("echo: {}", req.prompt);
            Box::pin(async move { Ok(out) })
        }
        fn name(&self) -> &'static str {
            "counting"
        }
        fn model(&self) -> &str {
            "m"
        }
    }

    #[tokio::test]
    async fn second_identical_call_is_served_from_cache() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            10,
        );
        let req = CompletionRequest::new("hello").with_system("persona");
        assert_eq!(client.complete(&req).await.unwrap(), "echo: hello");
        assert_eq!(client.complete(&req).await.unwrap(), "echo: hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let other = CompletionRequest::new("hello");
        client.complete(&other).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2, "system text is part of the key");
    }

    #[tokio::test]
    async fn daily_limit_blocks_real_calls() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            1,
        );
        client.complete(&CompletionRequest::new("a")).await.unwrap();
        let err = client
            .complete(&CompletionRequest::new("b"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("daily AI limit"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cached_answers_survive_a_spent_limit() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let client = CachingClient::new(
            CountingProvider {
                calls: calls.clone(),
            },
            dir.path().to_path_buf(),
            1,
        );
        let req = CompletionRequest::new("a");
        client.complete(&req).await.unwrap();
        assert_eq!(client.complete(&req).await.unwrap(), "echo: a");
        assert!(client.complete(&CompletionRequest::new("b")).await.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_client_errors() {
        let err = DisabledClient
            .complete(&CompletionRequest::new("x"))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("disabled"));
    }
}
