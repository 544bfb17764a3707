//! Whisper HTTP client for incident transcription
//!
//! Posts audio to an OpenAI-compatible `/audio/transcriptions` endpoint
//! and returns the plain-text transcript. Supports retry with exponential
//! backoff and configurable timeout.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::time::Duration;
use tokio::time::sleep;

use super::SpeechToText;

/// Default API base URL
const DEFAULT_WHISPER_BASE_URL: &str = "https://api.openai.com/v1";

/// Default transcription model
const DEFAULT_MODEL: &str = "whisper-1";

/// Incidents are recorded in Swahili
const DEFAULT_LANGUAGE: &str = "sw";

/// Default timeout for API requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Maximum number of retry attempts
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay for exponential backoff in milliseconds
const BASE_RETRY_DELAY_MS: u64 = 500;

/// Environment variable holding the API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Environment variable overriding the base URL
pub const BASE_URL_ENV: &str = "ANGAZA_WHISPER_URL";

/// Error types for Whisper operations
#[derive(Debug, thiserror::Error)]
pub enum WhisperError {
    #[error("No API key configured (set OPENAI_API_KEY)")]
    MissingApiKey,

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Server error ({status}): {message}")]
    ServerError { status: u16, message: String },

    #[error("Failed to build request: {0}")]
    InvalidRequest(String),

    #[error("Failed to read response: {0}")]
    ParseError(String),

    #[error("All {attempts} retry attempts failed: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },
}

impl WhisperError {
    fn is_retryable(&self) -> bool {
        match self {
            WhisperError::ConnectionFailed(_) | WhisperError::Timeout(_) => true,
            WhisperError::ServerError { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Client settings
#[derive(Debug, Clone, PartialEq)]
pub struct WhisperConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub language: String,
    pub timeout_secs: u64,
}

impl WhisperConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_WHISPER_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            language: DEFAULT_LANGUAGE.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// Reads the key and optional base URL from the environment
    pub fn from_env() -> Result<Self, WhisperError> {
        let api_key = std::env::var(API_KEY_ENV)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or(WhisperError::MissingApiKey)?;

        let mut config = Self::new(api_key);
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.base_url = url;
            }
        }
        Ok(config)
    }
}

/// Whisper API client
#[derive(Debug, Clone)]
pub struct WhisperClient {
    config: WhisperConfig,
    client: reqwest::Client,
}

impl WhisperClient {
    pub fn new(config: WhisperConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("Failed to configure Whisper client, using defaults: {}", e);
                reqwest::Client::new()
            });

        Self {
            config: WhisperConfig {
                base_url: config.base_url.trim_end_matches('/').to_string(),
                ..config
            },
            client,
        }
    }

    /// Get the configured timeout
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout_secs)
    }

    fn endpoint(&self) -> String {
        format!("{}/audio/transcriptions", self.config.base_url)
    }

    fn build_form(&self, file_name: &str, audio: Vec<u8>) -> Result<Form, WhisperError> {
        let part = Part::bytes(audio)
            .file_name(file_name.to_string())
            .mime_str("audio/mp4")
            .map_err(|e| WhisperError::InvalidRequest(e.to_string()))?;

        Ok(Form::new()
            .text("model", self.config.model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", "text")
            .part("file", part))
    }

    async fn send_transcription_request(
        &self,
        file_name: &str,
        audio: Vec<u8>,
    ) -> Result<String, WhisperError> {
        let form = self.build_form(file_name, audio)?;

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WhisperError::Timeout(self.config.timeout_secs)
                } else {
                    WhisperError::ConnectionFailed(e.to_string())
                }
            })?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(WhisperError::ServerError { status, message });
        }

        let text = response
            .text()
            .await
            .map_err(|e| WhisperError::ParseError(e.to_string()))?;

        Ok(text.trim().to_string())
    }

    /// Transcribe an audio clip
    ///
    /// # Arguments
    ///
    /// * `file_name` - Name sent with the upload (e.g., "incident.m4a")
    /// * `audio` - Raw file contents
    pub async fn transcribe_audio(&self, file_name: &str, audio: &[u8]) -> Result<String> {
        tracing::debug!(
            "Sending {} bytes to Whisper (model={}, language={})",
            audio.len(),
            self.config.model,
            self.config.language
        );

        let mut last_error: Option<WhisperError> = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            match self
                .send_transcription_request(file_name, audio.to_vec())
                .await
            {
                Ok(text) => {
                    if attempt > 0 {
                        tracing::debug!("Request succeeded on attempt {}", attempt + 1);
                    }
                    return Ok(text);
                }
                Err(e) => {
                    if !e.is_retryable() {
                        tracing::error!("Whisper request failed (attempt {}): {}", attempt + 1, e);
                        return Err(anyhow!(e));
                    }

                    if attempt == MAX_RETRY_ATTEMPTS - 1 {
                        tracing::error!("Whisper request failed (attempt {}): {}", attempt + 1, e);
                        last_error = Some(e);
                        break;
                    }

                    let delay_ms = BASE_RETRY_DELAY_MS * 2u64.pow(attempt);
                    tracing::warn!(
                        "Whisper request failed (attempt {}), retrying in {}ms: {}",
                        attempt + 1,
                        delay_ms,
                        e
                    );
                    last_error = Some(e);
                    sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }

        Err(anyhow!(WhisperError::RetriesExhausted {
            attempts: MAX_RETRY_ATTEMPTS,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        }))
    }
}

#[async_trait]
impl SpeechToText for WhisperClient {
    async fn transcribe(&self, file_name: &str, audio: &[u8]) -> Result<String> {
        self.transcribe_audio(file_name, audio).await
    }

    fn source_name(&self) -> &str {
        "whisper"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WhisperConfig::new("sk-test");
        assert_eq!(config.model, "whisper-1");
        assert_eq!(config.language, "sw");
        assert_eq!(config.base_url, DEFAULT_WHISPER_BASE_URL);
    }

    #[test]
    fn test_endpoint_trims_trailing_slash() {
        let mut config = WhisperConfig::new("sk-test");
        config.base_url = "http://localhost:9000/v1/".to_string();

        let client = WhisperClient::new(config);
        assert_eq!(client.endpoint(), "http://localhost:9000/v1/audio/transcriptions");
        assert_eq!(client.timeout().as_secs(), DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn test_build_form() {
        let client = WhisperClient::new(WhisperConfig::new("sk-test"));
        assert!(client.build_form("inc-1.m4a", vec![0u8; 16]).is_ok());
    }

    #[test]
    fn test_retryable_errors() {
        assert!(WhisperError::Timeout(5).is_retryable());
        assert!(WhisperError::ServerError {
            status: 503,
            message: String::new()
        }
        .is_retryable());
        assert!(WhisperError::ServerError {
            status: 429,
            message: String::new()
        }
        .is_retryable());
        assert!(!WhisperError::ServerError {
            status: 401,
            message: String::new()
        }
        .is_retryable());
    }

    #[test]
    fn test_error_display() {
        let err = WhisperError::ServerError {
            status: 401,
            message: "Invalid API key".to_string(),
        };
        assert_eq!(err.to_string(), "Server error (401): Invalid API key");

        let err = WhisperError::MissingApiKey;
        assert_eq!(err.to_string(), "No API key configured (set OPENAI_API_KEY)");
    }
}
