//! Text generation providers.
//!
//! | Config Value | Provider | Endpoint | Credential |
//! |-------------|----------|----------|------------|
//! | `"disabled"` | [`DisabledGenerator`] | none | none |
//! | `"openai"` | [`OpenAIGenerator`] | `POST /v1/chat/completions` | `OPENAI_API_KEY` |
//! | `"ollama"` | [`OllamaGenerator`] | `POST /api/generate` | none |
//! | `"gemini"` | [`GeminiGenerator`] | `POST /v1beta/models/{model}:generateContent` | `GEMINI_API_KEY` |
//!
//! A provider call either returns non-empty text or a [`GenerationError`].
//! Nothing is retried; the HTTP client carries `generation.timeout_secs`.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::GenerationConfig;
use crate::error::GenerationError;

#[async_trait]
pub trait Generator: Send + Sync {
    fn model_name(&self) -> &str;
    async fn generate(&self, prompt: &str) -> Result<String, GenerationError>;
}

pub struct DisabledGenerator;

#[async_trait]
impl Generator for DisabledGenerator {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String, GenerationError> {
        Err(GenerationError::Disabled)
    }
}

fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?)
}

/// POST `body` and return the JSON response, failing on any non-2xx status.
async fn post_json(
    request: reqwest::RequestBuilder,
    body: &serde_json::Value,
    provider: &str,
) -> Result<serde_json::Value> {
    let response = request.json(body).send().await?;
    let status = response.status();
    if !status.is_success() {
        let body_text = response.text().await.unwrap_or_default();
        bail!("{} API error {}: {}", provider, status, body_text);
    }
    Ok(response.json().await?)
}

fn non_empty(text: String, provider: &str) -> Result<String, GenerationError> {
    if text.trim().is_empty() {
        Err(GenerationError::EmptyResponse {
            provider: provider.to_string(),
        })
    } else {
        Ok(text)
    }
}

// ============ OpenAI ============

pub struct OpenAIGenerator {
    model: String,
    api_key: String,
    url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OpenAIGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com".to_string()),
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
        });
        if let Some(t) = self.temperature {
            body["temperature"] = serde_json::json!(t);
        }

        let request = self
            .client
            .post(format!(
                "{}/v1/chat/completions",
                self.url.trim_end_matches('/')
            ))
            .bearer_auth(&self.api_key);
        let provider_err = |source| GenerationError::Provider {
            provider: "openai".to_string(),
            source,
        };

        let json = post_json(request, &body, "OpenAI")
            .await
            .map_err(provider_err)?;
        let text = parse_openai_response(&json).map_err(provider_err)?;
        non_empty(text, "openai")
    }
}

fn parse_openai_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(str::to_string)
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing choices[0].message.content"))
}

// ============ Ollama ============

pub struct OllamaGenerator {
    model: String,
    url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl OllamaGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow!("generation.model required for Ollama provider"))?;
        Ok(Self {
            model,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".to_string()),
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for OllamaGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
        });
        if let Some(t) = self.temperature {
            body["options"] = serde_json::json!({ "temperature": t });
        }

        let request = self
            .client
            .post(format!("{}/api/generate", self.url.trim_end_matches('/')));
        let provider_err = |source| GenerationError::Provider {
            provider: "ollama".to_string(),
            source,
        };

        let json = post_json(request, &body, "Ollama")
            .await
            .map_err(provider_err)?;
        let text = json
            .get("response")
            .and_then(|r| r.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing response field"))
            .map_err(provider_err)?;
        non_empty(text, "ollama")
    }
}

// ============ Gemini ============

pub struct GeminiGenerator {
    model: String,
    api_key: String,
    url: String,
    temperature: Option<f32>,
    client: reqwest::Client,
}

impl GeminiGenerator {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY")
            .map_err(|_| anyhow!("GEMINI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config
                .model
                .clone()
                .unwrap_or_else(|| "gemini-2.0-flash".to_string()),
            api_key,
            url: config
                .url
                .clone()
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com".to_string()),
            temperature: config.temperature,
            client: http_client(config)?,
        })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, GenerationError> {
        let mut body = serde_json::json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
        });
        if let Some(t) = self.temperature {
            body["generationConfig"] = serde_json::json!({ "temperature": t });
        }

        let request = self
            .client
            .post(format!(
                "{}/v1beta/models/{}:generateContent",
                self.url.trim_end_matches('/'),
                self.model
            ))
            .header("x-goog-api-key", &self.api_key);
        let provider_err = |source| GenerationError::Provider {
            provider: "gemini".to_string(),
            source,
        };

        let json = post_json(request, &body, "Gemini")
            .await
            .map_err(provider_err)?;
        let text = parse_gemini_response(&json).map_err(provider_err)?;
        non_empty(text, "gemini")
    }
}

/// Concatenate the text parts of the first candidate.
fn parse_gemini_response(json: &serde_json::Value) -> Result<String> {
    let parts = json
        .pointer("/candidates/0/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Invalid Gemini response: missing candidates[0].content.parts"))?;
    Ok(parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect::<Vec<_>>()
        .join(""))
}

/// Create the [`Generator`] named by `generation.provider`.
pub fn create_generator(config: &GenerationConfig) -> Result<Arc<dyn Generator>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledGenerator)),
        "openai" => Ok(Arc::new(OpenAIGenerator::new(config)?)),
        "ollama" => Ok(Arc::new(OllamaGenerator::new(config)?)),
        "gemini" => Ok(Arc::new(GeminiGenerator::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}
