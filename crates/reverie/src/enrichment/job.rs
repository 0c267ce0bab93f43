//! Enrichment job record and the analysis payload it carries.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Identity of the journal entry a job belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(i64);

impl EntryId {
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for EntryId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    Pending,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "PENDING",
            JobStatus::Completed => "COMPLETED",
            JobStatus::Failed => "FAILED",
        }
    }

    /// Terminal states may be claimed again for regeneration.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(JobStatus::Pending),
            "COMPLETED" => Ok(JobStatus::Completed),
            "FAILED" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status '{}'", other)),
        }
    }
}

// ─── Analysis payload ───
//
// Models emit `null` for sections they have nothing to say about. Every
// optional part of the payload reads `null` the same as a missing key.

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Keywords {
    #[serde(deserialize_with = "null_as_default")]
    pub primary: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub secondary: Vec<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub emotions: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionSpectrum {
    #[serde(deserialize_with = "null_as_default")]
    pub positive: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub negative: f64,
    #[serde(deserialize_with = "null_as_default")]
    pub neutral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedEmotion {
    #[serde(deserialize_with = "null_as_default")]
    pub emotion: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmotionAnalysis {
    pub dominant_emotion: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub emotion_spectrum: EmotionSpectrum,
    pub intensity: Option<f64>,
    #[serde(deserialize_with = "null_as_default")]
    pub emotions_detected: Vec<DetectedEmotion>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DreamSymbol {
    #[serde(deserialize_with = "null_as_default")]
    pub symbol: String,
    #[serde(default)]
    pub meaning: Option<String>,
    #[serde(default)]
    pub psychological_interpretation: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SymbolAnalysis {
    #[serde(deserialize_with = "null_as_default")]
    pub symbols: Vec<DreamSymbol>,
    pub overall_theme: Option<String>,
    pub life_connection: Option<String>,
}

/// Structured analysis produced by the generation backend.
///
/// Field names are the wire contract with the model and with clients.
/// Unknown fields are ignored; only `summary` is mandatory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub summary: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub keywords: Keywords,
    #[serde(default, deserialize_with = "null_as_default")]
    pub emotion_analysis: EmotionAnalysis,
    #[serde(default, deserialize_with = "null_as_default")]
    pub symbol_analysis: SymbolAnalysis,
    #[serde(default)]
    pub psychological_insight: Option<String>,
    #[serde(default)]
    pub advice: Option<String>,
}

// ─── Job record ───

/// Lifecycle state. Payload and error are carried by the variant, so a
/// COMPLETED job never has an error and a FAILED job never has a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum JobState {
    Pending,
    Completed(Analysis),
    Failed { error: String },
}

impl JobState {
    pub fn status(&self) -> JobStatus {
        match self {
            JobState::Pending => JobStatus::Pending,
            JobState::Completed(_) => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Optional generation telemetry.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Telemetry {
    pub tokens_used: Option<u32>,
    pub generation_duration_ms: Option<u64>,
    pub confidence_score: Option<f64>,
}

/// One enrichment record per journal entry.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichmentJob {
    pub parent_id: EntryId,
    pub state: JobState,
    pub model_identifier: String,
    pub prompt_version: String,
    pub telemetry: Telemetry,
    /// Number of claims accepted for this entry so far.
    pub attempt: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EnrichmentJob {
    /// A fresh PENDING job for an entry that has never been enriched.
    pub fn new_pending(
        parent_id: EntryId,
        model_identifier: &str,
        prompt_version: &str,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            parent_id,
            state: JobState::Pending,
            model_identifier: model_identifier.to_string(),
            prompt_version: prompt_version.to_string(),
            telemetry: Telemetry::default(),
            attempt: 1,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.state.status()
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, JobState::Pending)
    }

    pub fn result(&self) -> Option<&Analysis> {
        match &self.state {
            JobState::Completed(analysis) => Some(analysis),
            _ => None,
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error),
            _ => None,
        }
    }

    /// Re-enters PENDING for a new attempt, clearing payload, error and
    /// telemetry. `created_at` is kept.
    pub fn reset_to_pending(
        &mut self,
        model_identifier: &str,
        prompt_version: &str,
        now: DateTime<Utc>,
    ) {
        self.state = JobState::Pending;
        self.model_identifier = model_identifier.to_string();
        self.prompt_version = prompt_version.to_string();
        self.telemetry = Telemetry::default();
        self.attempt = self.attempt.saturating_add(1);
        self.updated_at = now;
    }
}

/// Current time truncated to the precision timestamps are stored with.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}
