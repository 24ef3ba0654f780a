//! Language model implementations and abstractions.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::{ModelConfig, Provider};
use crate::error::{LoopError, Result};

pub const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

/// Text returned by a single completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelCompletion {
    pub content: Option<String>,
}

impl ModelCompletion {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
        }
    }

    fn from_text(content: String) -> Self {
        Self {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
        }
    }
}

/// A provider that answers one user message with one text payload.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<ModelCompletion>;
}

/// Build the provider selected in `cfg`.
pub fn build_model(cfg: &ModelConfig) -> Result<Arc<dyn LanguageModel>> {
    let model: Arc<dyn LanguageModel> = match cfg.provider {
        Provider::Gemini => Arc::new(GeminiClient::from_config(cfg)?),
        Provider::Openai => Arc::new(OpenAIClient::from_config(cfg)?),
        Provider::Stub => StubModel::new(cfg.stub_responses.clone()),
    };
    Ok(model)
}

fn coalesce_error(status: reqwest::StatusCode, body: &str, provider: &str) -> LoopError {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return LoopError::LanguageModel(format!("{provider} rate limit exceeded: {body}"));
    }
    LoopError::LanguageModel(format!("{provider} request failed with {}: {body}", status))
}

fn http_client(cfg: &ModelConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder();
    if let Some(secs) = cfg.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }
    builder
        .build()
        .map_err(|err| LoopError::LanguageModel(format!("http client error: {err}")))
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            LoopError::LanguageModel("missing Gemini API key in model config".into())
        })?;
        let endpoint = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_GEMINI_ENDPOINT.to_string());
        Ok(Self {
            http: http_client(cfg)?,
            model: cfg.model.clone(),
            api_key,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<ModelCompletion> {
        let message = GeminiMessage {
            role: "user".to_string(),
            parts: vec![GeminiPart {
                text: prompt.to_string(),
            }],
        };
        let payload = json!({ "contents": [message] });
        let resp = self
            .http
            .post(format!(
                "{}/models/{}:generateContent",
                self.endpoint, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                LoopError::LanguageModel(format!("Gemini request error: {}", err.without_url()))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "gemini"));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|err| {
            LoopError::LanguageModel(format!("Gemini response parse error: {err}"))
        })?;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|cand| cand.content)
            .and_then(|content| content.parts.into_iter().next())
            .map(|part| part.text)
            .unwrap_or_default();

        Ok(ModelCompletion::from_text(content))
    }
}

/// Client for OpenAI-compatible `chat/completions` endpoints.
#[derive(Clone)]
pub struct OpenAIClient {
    http: reqwest::Client,
    model: String,
    api_key: String,
    base_url: String,
}

impl OpenAIClient {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        let api_key = cfg.api_key.clone().ok_or_else(|| {
            LoopError::LanguageModel("missing OpenAI API key in model config".into())
        })?;
        let base_url = cfg
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_OPENAI_ENDPOINT.to_string());
        Ok(Self {
            http: http_client(cfg)?,
            model: cfg.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAIClient {
    async fn generate(&self, prompt: &str) -> Result<ModelCompletion> {
        let payload = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Bearer {}", self.api_key),
            )
            .json(&payload)
            .send()
            .await
            .map_err(|err| {
                LoopError::LanguageModel(format!("OpenAI request error: {}", err.without_url()))
            })?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(coalesce_error(status, &body, "openai"));
        }

        let body: OpenAiResponse = resp.json().await.map_err(|err| {
            LoopError::LanguageModel(format!("OpenAI response parse error: {err}"))
        })?;

        let content = body
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        Ok(ModelCompletion::from_text(content))
    }
}

/// A deterministic model used for tests and demos.
///
/// Replies are handed out in order; every prompt is kept so callers can
/// inspect what the driver sent.
pub struct StubModel {
    responses: Mutex<VecDeque<String>>,
    prompts: Mutex<Vec<String>>,
}

impl StubModel {
    pub fn new(responses: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .map(|prompts| prompts.clone())
            .unwrap_or_default()
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().map(|r| r.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LanguageModel for StubModel {
    async fn generate(&self, prompt: &str) -> Result<ModelCompletion> {
        self.prompts
            .lock()
            .map_err(|_| LoopError::LanguageModel("stub model poisoned".into()))?
            .push(prompt.to_string());

        let raw = self
            .responses
            .lock()
            .map_err(|_| LoopError::LanguageModel("stub model poisoned".into()))?
            .pop_front()
            .ok_or_else(|| {
                LoopError::LanguageModel("StubModel ran out of scripted responses".into())
            })?;

        Ok(ModelCompletion::text(raw))
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiMessage {
    role: String,
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiCandidateContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidateContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoiceMessage {
    content: Option<String>,
}
