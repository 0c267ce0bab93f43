//! Enrichment jobs: one AI-generated analysis per journal entry, produced in
//! the background and polled by the caller.

pub mod entry;
pub mod job;
pub mod orchestrator;
pub mod runner;
pub mod state_machine;

pub use entry::{DreamType, JournalEntry, Mood, SleepQuality};
pub use job::{
    Analysis, DetectedEmotion, DreamSymbol, EmotionAnalysis, EmotionSpectrum, EnrichmentJob,
    EntryId, JobState, JobStatus, Keywords, SymbolAnalysis, Telemetry,
};
pub use orchestrator::{JobCounts, Orchestrator, OrchestratorOptions, Submission};
pub use runner::{EnrichmentRunner, EnrichmentTask};
pub use state_machine::{Claim, ClaimOutcome, CommitOutcome, StateMachine};
