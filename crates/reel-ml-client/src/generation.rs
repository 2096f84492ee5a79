//! Headline generation via the Gemini `generateContent` API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{MlError, MlResult};
use crate::retry::with_retry;

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    /// Produce a short on-screen headline for a transcript.
    async fn generate_headline(&self, transcript: &str, max_chars: usize) -> MlResult<String>;
}

/// Configuration for [`GeminiClient`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub base_url: String,
    /// Models tried in order until one answers.
    pub models: Vec<String>,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: "https://generativelanguage.googleapis.com".to_string(),
            models: vec![
                "gemini-2.5-flash".to_string(),
                "gemini-2.5-flash-lite".to_string(),
            ],
            timeout: Duration::from_secs(60),
            max_retries: 1,
        }
    }
}

impl GeminiConfig {
    /// Create config from environment variables; `GEMINI_API_KEY` is required.
    pub fn from_env() -> MlResult<Self> {
        let defaults = Self::default();
        let api_key = std::env::var("GEMINI_API_KEY")
            .ok()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| MlError::config("GEMINI_API_KEY not set"))?;

        let mut models = defaults.models;
        if let Ok(primary) = std::env::var("GEMINI_MODEL") {
            models.retain(|m| m != &primary);
            models.insert(0, primary);
        }

        Ok(Self {
            api_key,
            base_url: std::env::var("GEMINI_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            models,
            timeout: std::env::var("GEMINI_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: defaults.max_retries,
        })
    }
}

#[derive(Debug, Serialize)]
struct GeminiRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Gemini API client.
pub struct GeminiClient {
    http: Client,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> MlResult<Self> {
        if config.models.is_empty() {
            return Err(MlError::config("at least one Gemini model is required"));
        }
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;
        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(GeminiConfig::from_env()?)
    }

    fn build_prompt(transcript: &str, max_chars: usize) -> String {
        format!(
            "Write one punchy on-screen headline for a short vertical video.\n\
             Rules:\n\
             - At most {max_chars} characters.\n\
             - Plain text only: no quotes, hashtags, emojis or trailing period.\n\
             - Return ONLY the headline and nothing else.\n\n\
             TRANSCRIPT:\n{transcript}\n"
        )
    }

    async fn call_model(&self, model: &str, prompt: &str) -> MlResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.config.base_url, model
        );
        let request = GeminiRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: prompt.to_string(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.7,
                max_output_tokens: 64,
            },
        };

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::from_status(status, body));
        }

        let body: GeminiResponse = response
            .json()
            .await
            .map_err(|e| MlError::invalid_response(format!("generateContent body: {e}")))?;

        body.candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| MlError::invalid_response("No content in Gemini response"))
    }
}

/// Strip code fences, quotes and extra lines; cap on a char boundary.
pub fn clean_headline(raw: &str, max_chars: usize) -> Option<String> {
    let text = raw
        .trim()
        .trim_start_matches("```")
        .trim_end_matches("```")
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())?;

    let text = text
        .trim_matches(|c| c == '"' || c == '\'' || c == '*' || c == '“' || c == '”')
        .trim_end_matches('.')
        .trim();

    if text.is_empty() {
        return None;
    }
    Some(text.chars().take(max_chars).collect::<String>().trim_end().to_string())
}

#[async_trait]
impl ContentGenerator for GeminiClient {
    async fn generate_headline(&self, transcript: &str, max_chars: usize) -> MlResult<String> {
        let prompt = Self::build_prompt(transcript, max_chars);
        let mut last_error = None;

        for model in &self.config.models {
            debug!(model = %model, "Requesting headline");
            let result = with_retry("headline generation", self.config.max_retries, || {
                self.call_model(model, &prompt)
            })
            .await;

            match result {
                Ok(raw) => match clean_headline(&raw, max_chars) {
                    Some(headline) => {
                        info!(model = %model, chars = headline.chars().count(), "Generated headline");
                        return Ok(headline);
                    }
                    None => {
                        warn!(model = %model, "Model returned an unusable headline");
                        last_error = Some(MlError::invalid_response("empty headline"));
                    }
                },
                Err(e) => {
                    warn!(model = %model, "Headline generation failed: {}", e);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| MlError::RequestFailed("All Gemini models failed".into())))
    }
}
