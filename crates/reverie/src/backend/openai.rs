//! Client for OpenAI-compatible `chat/completions` endpoints.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use secrecy::{ExposeSecret, SecretString};

use super::error::BackendError;
use super::parse::parse_analysis;
use super::types::{ApiError, ChatMessage, ChatRequest, ChatResponse};
use super::{EnrichmentRequest, EnrichmentResult, GenerationBackend};
use crate::config::BackendConfig;
use crate::secrets::{resolve_secret_optional, SecretError};

/// Longest provider error body kept in a failure message.
const MAX_ERROR_BODY: usize = 300;

/// Resolved connection settings for [`OpenAiBackend`].
#[derive(Debug)]
pub struct BackendSettings {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<SecretString>,
    pub timeout: Duration,
    pub connect_timeout: Duration,
    pub max_tokens: u32,
    pub temperature: f32,
    pub confidence_score: Option<f64>,
}

impl BackendSettings {
    /// Builds settings from config, resolving the API key source.
    pub fn from_config(config: &BackendConfig) -> Result<Self, SecretError> {
        let api_key = resolve_secret_optional(
            config.api_key.as_deref(),
            config.api_key_file.as_deref(),
            config.api_key_env.as_deref(),
        )?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            timeout: config.timeout(),
            connect_timeout: config.connect_timeout(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            confidence_score: config.confidence_score,
        })
    }
}

pub struct OpenAiBackend {
    client: reqwest::Client,
    settings: BackendSettings,
}

impl OpenAiBackend {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.timeout)
            .build()?;

        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.settings.base_url)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> BackendError {
        if err.is_timeout() {
            BackendError::Timeout(self.settings.timeout)
        } else if err.is_decode() {
            BackendError::MalformedOutput(format!("invalid completion response: {}", err))
        } else {
            BackendError::from(err)
        }
    }
}

#[async_trait]
impl GenerationBackend for OpenAiBackend {
    fn model_identifier(&self) -> &str {
        &self.settings.model
    }

    async fn generate(
        &self,
        request: &EnrichmentRequest,
    ) -> Result<EnrichmentResult, BackendError> {
        let body = ChatRequest {
            model: self.settings.model.clone(),
            messages: vec![
                ChatMessage::system(&request.system_prompt),
                ChatMessage::user(&request.user_prompt),
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let mut builder = self.client.post(self.endpoint()).json(&body);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }

        debug!(
            "Requesting analysis for entry {} from {}",
            request.parent_id, self.settings.model
        );

        let response = builder
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<ApiError>(&text) {
                Ok(api_error) => api_error.error.message,
                Err(_) => text.chars().take(MAX_ERROR_BODY).collect(),
            };
            return Err(BackendError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let completion: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let tokens_used = completion.usage.as_ref().and_then(|u| u.total_tokens);
        let model = completion
            .model
            .clone()
            .unwrap_or_else(|| self.settings.model.clone());
        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or(BackendError::EmptyResponse)?;
        let content = choice.message.content.unwrap_or_default();

        let analysis = parse_analysis(&content).map_err(|err| {
            if choice.finish_reason.as_deref() == Some("length") {
                warn!(
                    "Analysis for entry {} was cut off at {} tokens",
                    request.parent_id, self.settings.max_tokens
                );
                BackendError::MalformedOutput(format!(
                    "response truncated at max_tokens ({}): {}",
                    self.settings.max_tokens, err
                ))
            } else {
                err
            }
        })?;

        Ok(EnrichmentResult {
            analysis,
            model,
            tokens_used,
            confidence_score: self.settings.confidence_score,
        })
    }
}
