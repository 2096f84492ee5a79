//! Speech-to-text over a Whisper-compatible HTTP API.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reel_models::{TimedText, Transcript};
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{MlError, MlResult};
use crate::retry::with_retry;

/// Prompt that biases the model towards keeping fillers and false starts.
pub const DISFLUENCY_PROMPT: &str =
    "Umm, let me think like, hmm... Okay, here's what I'm, like, thinking. I- I mean, uh, so";

/// Options for a single transcription call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TranscribeOptions {
    /// Request word-level timestamps.
    pub word_level: bool,
    /// Keep "um", "uh" and false starts in the output.
    pub prompt_for_disfluencies: bool,
}

impl TranscribeOptions {
    pub fn words() -> Self {
        Self {
            word_level: true,
            prompt_for_disfluencies: false,
        }
    }

    pub fn with_disfluencies(mut self) -> Self {
        self.prompt_for_disfluencies = true;
        self
    }
}

#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, path: &Path, options: TranscribeOptions) -> MlResult<Transcript>;
}

/// Configuration for [`WhisperClient`].
#[derive(Debug, Clone)]
pub struct SpeechClientConfig {
    /// Base URL up to and including the API version, e.g. `https://api.openai.com/v1`
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout: Duration,
    pub max_retries: u32,
}

impl Default for SpeechClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout: Duration::from_secs(600),
            max_retries: 2,
        }
    }
}

impl SpeechClientConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("STT_BASE_URL")
                .map(|u| u.trim_end_matches('/').to_string())
                .unwrap_or(defaults.base_url),
            api_key: std::env::var("STT_API_KEY").ok().filter(|k| !k.is_empty()),
            model: std::env::var("STT_MODEL").unwrap_or(defaults.model),
            timeout: std::env::var("STT_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            max_retries: std::env::var("STT_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
        }
    }
}

#[derive(Debug, Deserialize)]
struct VerboseTranscription {
    text: String,
    #[serde(default)]
    segments: Vec<SegmentResponse>,
    #[serde(default)]
    words: Option<Vec<WordResponse>>,
}

#[derive(Debug, Deserialize)]
struct SegmentResponse {
    start: f64,
    end: f64,
    text: String,
}

#[derive(Debug, Deserialize)]
struct WordResponse {
    word: String,
    start: f64,
    end: f64,
}

impl From<VerboseTranscription> for Transcript {
    fn from(raw: VerboseTranscription) -> Self {
        Transcript {
            full_text: raw.text.trim().to_string(),
            segments: raw
                .segments
                .into_iter()
                .map(|s| TimedText::new(s.start, s.end, s.text.trim()))
                .collect(),
            words: raw.words.map(|words| {
                words
                    .into_iter()
                    .map(|w| TimedText::new(w.start, w.end, w.word.trim()))
                    .collect()
            }),
        }
    }
}

/// Whisper-compatible transcription client.
pub struct WhisperClient {
    http: Client,
    config: SpeechClientConfig,
}

impl WhisperClient {
    pub fn new(config: SpeechClientConfig) -> MlResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(MlError::Network)?;

        Ok(Self { http, config })
    }

    pub fn from_env() -> MlResult<Self> {
        Self::new(SpeechClientConfig::from_env())
    }

    fn build_form(
        &self,
        file_name: &str,
        bytes: Vec<u8>,
        options: TranscribeOptions,
    ) -> MlResult<Form> {
        let file = Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str("application/octet-stream")?;

        let mut form = Form::new()
            .part("file", file)
            .text("model", self.config.model.clone())
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "segment");

        if options.word_level {
            form = form.text("timestamp_granularities[]", "word");
        }
        if options.prompt_for_disfluencies {
            form = form.text("prompt", DISFLUENCY_PROMPT);
        }
        Ok(form)
    }

    async fn send_once(
        &self,
        url: &str,
        file_name: &str,
        bytes: &[u8],
        options: TranscribeOptions,
    ) -> MlResult<Transcript> {
        let form = self.build_form(file_name, bytes.to_vec(), options)?;

        let mut request = self.http.post(url).multipart(form);
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::from_status(status, body));
        }

        let raw: VerboseTranscription = response
            .json()
            .await
            .map_err(|e| MlError::invalid_response(format!("transcription body: {e}")))?;
        Ok(raw.into())
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, path: &Path, options: TranscribeOptions) -> MlResult<Transcript> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "audio.mp4".to_string());
        let url = format!("{}/audio/transcriptions", self.config.base_url);

        debug!(
            path = %path.display(),
            bytes = bytes.len(),
            word_level = options.word_level,
            "Sending transcription request"
        );

        let transcript = with_retry("transcription", self.config.max_retries, || {
            self.send_once(&url, &file_name, &bytes, options)
        })
        .await?;

        info!(
            path = %path.display(),
            segments = transcript.segments.len(),
            words = transcript.words.as_ref().map(Vec::len).unwrap_or(0),
            "Transcription complete"
        );
        Ok(transcript)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, retries: u32) -> WhisperClient {
        WhisperClient::new(SpeechClientConfig {
            base_url: server.uri(),
            api_key: Some("test-key".into()),
            max_retries: retries,
            ..Default::default()
        })
        .unwrap()
    }

    fn media_file() -> tempfile::NamedTempFile {
        let file = tempfile::Builder::new().suffix(".mp4").tempfile().unwrap();
        std::fs::write(file.path(), b"not really a video").unwrap();
        file
    }

    fn verbose_body() -> serde_json::Value {
        serde_json::json!({
            "task": "transcribe",
            "text": " Um, so this is it. ",
            "segments": [{"id": 0, "start": 0.0, "end": 1.8, "text": " Um, so this is it."}],
            "words": [
                {"word": "Um", "start": 0.0, "end": 0.3},
                {"word": "so", "start": 0.4, "end": 0.6},
                {"word": "this", "start": 0.7, "end": 0.9},
                {"word": "is", "start": 1.0, "end": 1.1},
                {"word": "it", "start": 1.2, "end": 1.8}
            ]
        })
    }

    #[tokio::test]
    async fn test_transcribe_with_words_and_prompt() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .and(header("authorization", "Bearer test-key"))
            .and(body_string_contains("verbose_json"))
            .and(body_string_contains("I- I mean"))
            .respond_with(ResponseTemplate::new(200).set_body_json(verbose_body()))
            .expect(1)
            .mount(&server)
            .await;

        let file = media_file();
        let transcript = client_for(&server, 0)
            .transcribe(file.path(), TranscribeOptions::words().with_disfluencies())
            .await
            .unwrap();

        assert_eq!(transcript.full_text, "Um, so this is it.");
        assert_eq!(transcript.segments.len(), 1);
        let words = transcript.words.unwrap();
        assert_eq!(words.len(), 5);
        assert_eq!(words[0].text, "Um");
    }

    #[tokio::test]
    async fn test_retries_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("overloaded"))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(verbose_body()))
            .mount(&server)
            .await;

        let file = media_file();
        let transcript = client_for(&server, 1)
            .transcribe(file.path(), TranscribeOptions::default())
            .await
            .unwrap();
        assert!(!transcript.is_empty());
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/audio/transcriptions"))
            .respond_with(ResponseTemplate::new(400).set_body_string("unsupported file"))
            .expect(1)
            .mount(&server)
            .await;

        let file = media_file();
        let err = client_for(&server, 3)
            .transcribe(file.path(), TranscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Api { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let server = MockServer::start().await;
        let err = client_for(&server, 0)
            .transcribe(Path::new("/definitely/not/here.mp4"), TranscribeOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, MlError::Io(_)));
    }

    #[test]
    #[serial]
    fn test_config_from_env() {
        std::env::set_var("STT_BASE_URL", "http://stt.local/v1/");
        std::env::set_var("STT_MODEL", "whisper-large-v3");
        std::env::set_var("STT_RETRIES", "5");
        let config = SpeechClientConfig::from_env();
        std::env::remove_var("STT_BASE_URL");
        std::env::remove_var("STT_MODEL");
        std::env::remove_var("STT_RETRIES");

        assert_eq!(config.base_url, "http://stt.local/v1");
        assert_eq!(config.model, "whisper-large-v3");
        assert_eq!(config.max_retries, 5);
    }
}
