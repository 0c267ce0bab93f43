pub mod backend;
pub mod config;
pub mod db;
pub mod enrichment;
pub mod error;
pub mod secrets;
pub mod telemetry;
pub mod worker;

pub use backend::{
    BackendError, BackendSettings, EnrichmentRequest, EnrichmentResult, GenerationBackend,
    OpenAiBackend,
};
pub use config::{load_config, load_config_from_str, EnrichmentConfig};
pub use db::{Database, DatabaseError};
pub use enrichment::{
    Analysis, EnrichmentJob, EntryId, JobCounts, JobStatus, JournalEntry, Orchestrator,
    OrchestratorOptions, Submission,
};
pub use error::{ConfigError, Result, ReverieError, WorkerError};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError};
