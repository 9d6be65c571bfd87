//! Answer-generating language models.
//!
//! - **[`DisabledModel`]**: always errors; used when `llm.provider = "disabled"`.
//! - **[`GeminiModel`]**: `models/{model}:generateContent`, optionally with the
//!   `google_search` grounding tool.
//! - **[`OpenAIChatModel`]**: `POST /v1/chat/completions`.
//!
//! Like the embedding providers, each [`LanguageModel::generate`] call sends
//! one request and classifies failures into [`ApiError`].

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::embedding::{http_client, qualified_model, require_env};
use crate::error::ApiError;

#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_name(&self) -> &str;
    /// Generate a completion for a single-turn prompt.
    async fn generate(&self, prompt: &str) -> Result<String, ApiError>;
}

pub struct DisabledModel;

#[async_trait]
impl LanguageModel for DisabledModel {
    fn model_name(&self) -> &str {
        "disabled"
    }
    async fn generate(&self, _prompt: &str) -> Result<String, ApiError> {
        Err(ApiError::Disabled("llm"))
    }
}

// ============ Gemini ============

const GEMINI_URL: &str = "https://generativelanguage.googleapis.com";

/// Requires `GEMINI_API_KEY`.
pub struct GeminiModel {
    model: String,
    url: String,
    api_key: String,
    web_search: bool,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<serde_json::Value>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

impl GeminiModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = require_env("GEMINI_API_KEY")?;
        let url = config.url.clone().unwrap_or_else(|| GEMINI_URL.to_string());
        Ok(Self {
            model: qualified_model(&config.model),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            web_search: config.web_search,
            client: http_client(config.timeout_secs)?,
        })
    }

    fn request_body<'a>(&self, prompt: &'a str) -> GenerateRequest<'a> {
        let tools = if self.web_search {
            vec![serde_json::json!({ "google_search": {} })]
        } else {
            Vec::new()
        };
        GenerateRequest {
            contents: [Content {
                role: "user",
                parts: [Part { text: prompt }],
            }],
            tools,
        }
    }
}

/// Concatenate the text parts of the first candidate.
fn gemini_text(response: GenerateResponse) -> Result<String, ApiError> {
    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ApiError::Fatal(format!("Gemini blocked the prompt: {}", reason)));
    }
    let text: String = response
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|content| content.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(ApiError::Fatal("Gemini returned no text".into()));
    }
    Ok(text)
}

#[async_trait]
impl LanguageModel for GeminiModel {
    fn model_name(&self) -> &str {
        self.model.trim_start_matches("models/")
    }

    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let response = self
            .client
            .post(format!("{}/v1beta/{}:generateContent", self.url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await
            .map_err(|e| ApiError::from_transport("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status("Gemini", status, &body_text));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Fatal(format!("Invalid Gemini response: {}", e)))?;
        gemini_text(parsed)
    }
}

// ============ OpenAI ============

/// Requires `OPENAI_API_KEY`. Web search is not available here.
pub struct OpenAIChatModel {
    model: String,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAIChatModel {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = require_env("OPENAI_API_KEY")?;
        let url = config
            .url
            .clone()
            .unwrap_or_else(|| "https://api.openai.com".to_string());
        if config.web_search {
            tracing::debug!("llm.web_search is ignored by the OpenAI provider");
        }
        Ok(Self {
            model: config.model.clone(),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String, ApiError> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .filter(|c| !c.trim().is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Fatal("Invalid OpenAI response: no message content".into()))
}

#[async_trait]
impl LanguageModel for OpenAIChatModel {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String, ApiError> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::from_transport("OpenAI", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status("OpenAI", status, &body_text));
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| ApiError::from_transport("OpenAI", e))?;
        parse_chat_response(&json)
    }
}

pub fn create_model(config: &LlmConfig) -> Result<Box<dyn LanguageModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Box::new(DisabledModel)),
        "gemini" => Ok(Box::new(GeminiModel::new(config)?)),
        "openai" => Ok(Box::new(OpenAIChatModel::new(config)?)),
        other => bail!("Unknown llm provider: {}", other),
    }
}
