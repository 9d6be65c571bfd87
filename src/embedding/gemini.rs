//! Gemini embeddings (`models/{model}:batchEmbedContents`).

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{check_batch, http_client, require_env, EmbeddingProvider};
use crate::config::EmbeddingConfig;
use crate::error::ApiError;

const DEFAULT_URL: &str = "https://generativelanguage.googleapis.com";

/// Embedding provider using the Gemini API. Requires `GEMINI_API_KEY`.
pub struct GeminiProvider {
    model: String,
    dims: usize,
    url: String,
    api_key: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize)]
struct Content<'a> {
    parts: [Part<'a>; 1],
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    embeddings: Vec<Embedding>,
}

#[derive(Deserialize)]
struct Embedding {
    values: Vec<f32>,
}

impl GeminiProvider {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for Gemini provider"))?;
        let api_key = require_env("GEMINI_API_KEY")?;
        let url = config.url.clone().unwrap_or_else(|| DEFAULT_URL.to_string());

        Ok(Self {
            model: qualified_model(&model),
            dims: config.dims.unwrap_or(0),
            url: url.trim_end_matches('/').to_string(),
            api_key,
            client: http_client(config.timeout_secs)?,
        })
    }

    fn request_body<'a>(&'a self, texts: &'a [String]) -> BatchRequest<'a> {
        BatchRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &self.model,
                    content: Content {
                        parts: [Part { text }],
                    },
                    output_dimensionality: (self.dims > 0).then_some(self.dims),
                })
                .collect(),
        }
    }
}

/// Gemini expects `models/<name>`; accept the bare name in config.
pub(crate) fn qualified_model(model: &str) -> String {
    if model.starts_with("models/") {
        model.to_string()
    } else {
        format!("models/{}", model)
    }
}

#[async_trait]
impl EmbeddingProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        self.model.trim_start_matches("models/")
    }
    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ApiError> {
        let response = self
            .client
            .post(format!("{}/v1beta/{}:batchEmbedContents", self.url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(texts))
            .send()
            .await
            .map_err(|e| ApiError::from_transport("Gemini", e))?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::from_status("Gemini", status, &body_text));
        }

        let parsed: BatchResponse = response
            .json()
            .await
            .map_err(|e| ApiError::Fatal(format!("Invalid Gemini embedding response: {}", e)))?;
        let vectors = parsed.embeddings.into_iter().map(|e| e.values).collect();
        check_batch("Gemini", texts.len(), self.dims, vectors)
    }
}
