//! Generation backend: turns a journal entry into a structured analysis by
//! way of an external text-generation service.

use async_trait::async_trait;

use crate::enrichment::job::{Analysis, EntryId};

pub mod error;
pub mod openai;
pub mod parse;
pub mod prompt;
pub mod types;

pub use error::BackendError;
pub use openai::{BackendSettings, OpenAiBackend};
pub use prompt::{build_request, PROMPT_VERSION};

/// Everything the backend needs for one generation, already rendered from
/// the instruction template.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentRequest {
    pub parent_id: EntryId,
    pub system_prompt: String,
    pub user_prompt: String,
    pub prompt_version: String,
}

/// A successfully parsed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentResult {
    pub analysis: Analysis,
    /// Model that actually served the request.
    pub model: String,
    pub tokens_used: Option<u32>,
    pub confidence_score: Option<f64>,
}

/// A text-generation service producing [`Analysis`] payloads.
///
/// Implementations own their retries and timeouts; every failure, including
/// unusable output, comes back as a [`BackendError`].
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Identifier recorded as provenance when a job is claimed.
    fn model_identifier(&self) -> &str;

    async fn generate(&self, request: &EnrichmentRequest)
        -> Result<EnrichmentResult, BackendError>;
}
