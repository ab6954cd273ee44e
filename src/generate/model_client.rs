//! The single outbound LLM call.
//!
//! [`ModelClient`] is the seam; [`GeminiClient`] talks to `generateContent`,
//! [`ScriptedModel`] replays canned replies for tests and `AI_TEST_MODE=mock`.

use async_trait::async_trait;
use metrics::{counter, histogram};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::tools::{backfill_text, TOOLS};
use crate::config::ModelConfig;
use crate::error::{GenerateError, Result};

/// Everything the model needs for one call.
#[derive(Debug, Clone, Serialize)]
pub struct RequestPayload {
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    async fn generate_text(&self, payload: &RequestPayload) -> Result<String>;
    fn name(&self) -> &'static str;
}

/// Run one model call under a hard wall-clock budget. On expiry the
/// in-flight future is dropped, which aborts the HTTP request with it.
pub async fn call_model(
    client: &dyn ModelClient,
    payload: &RequestPayload,
    budget: Duration,
) -> Result<String> {
    let t0 = Instant::now();
    let out = match tokio::time::timeout(budget, client.generate_text(payload)).await {
        Ok(res) => res,
        Err(_) => Err(GenerateError::Timeout(budget.as_millis() as u64)),
    };
    histogram!("generate_model_call_ms").record(t0.elapsed().as_secs_f64() * 1_000.0);

    let out = out.and_then(|text| {
        if text.trim().is_empty() {
            Err(GenerateError::EmptyResponse)
        } else {
            Ok(text)
        }
    });
    if let Err(e) = &out {
        counter!("generate_model_errors_total", "kind" => e.kind()).increment(1);
    }
    out
}

/// Pick the client for the configured provider.
pub fn build_model_client(
    cfg: &ModelConfig,
    target_count: usize,
) -> anyhow::Result<Box<dyn ModelClient>> {
    match cfg.provider.as_str() {
        "mock" => Ok(Box::new(ScriptedModel::canned_batch(target_count))),
        _ => Ok(Box::new(GeminiClient::new(cfg)?)),
    }
}

// ---------------------------------------------------------------------------
// Gemini
// ---------------------------------------------------------------------------

pub struct GeminiClient {
    http: reqwest::Client,
    url: String,
    /// `None` when no key could be resolved; every call then fails with
    /// [`GenerateError::Config`].
    api_key: Option<String>,
    key_error: String,
}

impl GeminiClient {
    pub fn new(cfg: &ModelConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("toolpulse/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()?;
        let (api_key, key_error) = match cfg.resolve_api_key() {
            Ok(k) => (Some(k), String::new()),
            Err(e) => (None, e.to_string()),
        };
        Ok(Self {
            http,
            url: format!(
                "{}/models/{}:generateContent",
                cfg.endpoint.trim_end_matches('/'),
                cfg.model
            ),
            api_key,
            key_error,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct GeminiPart {
    text: Option<String>,
}

fn extract_text(resp: GeminiResponse) -> String {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| {
            c.parts
                .into_iter()
                .filter_map(|p| p.text)
                .collect::<Vec<_>>()
                .join("")
        })
        .unwrap_or_default()
}

#[async_trait]
impl ModelClient for GeminiClient {
    async fn generate_text(&self, payload: &RequestPayload) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(GenerateError::Config(self.key_error.clone()));
        };
        let body = json!({
            "contents": [{ "role": "user", "parts": [{ "text": payload.prompt }] }],
            "generationConfig": {
                "temperature": payload.temperature,
                "maxOutputTokens": payload.max_output_tokens,
                "responseMimeType": "application/json"
            }
        });

        let resp = self
            .http
            .post(&self.url)
            .header("x-goog-api-key", key)
            .json(&body)
            .send()
            .await
            .map_err(|e| GenerateError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let snippet: String = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(200)
                .collect();
            return Err(GenerateError::Transport(format!("HTTP {status}: {snippet}")));
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| GenerateError::Transport(format!("undecodable response body: {e}")))?;
        let text = extract_text(parsed);
        if text.trim().is_empty() {
            return Err(GenerateError::EmptyResponse);
        }
        Ok(text)
    }

    fn name(&self) -> &'static str {
        "gemini"
    }
}

// ---------------------------------------------------------------------------
// Scripted
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum ScriptedReply {
    Text(String),
    Transport(String),
    Config(String),
    Empty,
    /// Never resolves; only the caller's timeout ends the call.
    Hang,
}

/// Replays replies in order; the last one repeats once the script runs out.
pub struct ScriptedModel {
    replies: Mutex<VecDeque<ScriptedReply>>,
    last: Mutex<Option<ScriptedReply>>,
    prompts: Mutex<Vec<String>>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(replies: Vec<ScriptedReply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answers with `count` tool drafts, one per tool.
    pub fn canned_batch(count: usize) -> Self {
        let tweets: Vec<_> = TOOLS
            .iter()
            .cycle()
            .take(count)
            .enumerate()
            .map(|(i, t)| json!({ "text": backfill_text(t, i % 3, i as u64), "sourceAge": "Fresh" }))
            .collect();
        Self::new(vec![ScriptedReply::Text(json!({ "tweets": tweets }).to_string())])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().expect("prompts mutex poisoned").clone()
    }

    fn next_reply(&self) -> Option<ScriptedReply> {
        let mut queue = self.replies.lock().expect("replies mutex poisoned");
        let mut last = self.last.lock().expect("last mutex poisoned");
        if let Some(r) = queue.pop_front() {
            *last = Some(r.clone());
            return Some(r);
        }
        last.clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    async fn generate_text(&self, payload: &RequestPayload) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .expect("prompts mutex poisoned")
            .push(payload.prompt.clone());

        match self.next_reply() {
            Some(ScriptedReply::Text(t)) => Ok(t),
            Some(ScriptedReply::Transport(m)) => Err(GenerateError::Transport(m)),
            Some(ScriptedReply::Config(m)) => Err(GenerateError::Config(m)),
            Some(ScriptedReply::Empty) | None => Err(GenerateError::EmptyResponse),
            Some(ScriptedReply::Hang) => std::future::pending().await,
        }
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
