//! Public entry point: request an enrichment, poll its result.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::{debug, info, warn};

use super::entry::JournalEntry;
use super::job::{EnrichmentJob, EntryId, JobStatus};
use super::runner::{EnrichmentRunner, EnrichmentTask};
use super::state_machine::{ClaimOutcome, CommitOutcome, StateMachine};
use crate::backend::{
    build_request, BackendError, BackendSettings, GenerationBackend, OpenAiBackend,
};
use crate::config::EnrichmentConfig;
use crate::db::{enrichment_repo, Database, DatabaseError};
use crate::error::{ConfigError, WorkerError};
use crate::worker::WorkerPool;

/// What `request_generation` did with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// A new attempt was claimed and queued.
    Scheduled,
    /// A generation is already running for this entry; nothing changed.
    AlreadyInProgress,
    /// The attempt was claimed but the pool refused it; the job was
    /// committed FAILED.
    NotScheduled,
}

#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub worker_count: usize,
    pub queue_capacity: usize,
    pub task_deadline: Duration,
    pub stale_pending_after: Option<Duration>,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            worker_count: num_cpus::get(),
            queue_capacity: 256,
            task_deadline: Duration::from_secs(120),
            stale_pending_after: None,
        }
    }
}

impl From<&EnrichmentConfig> for OrchestratorOptions {
    fn from(config: &EnrichmentConfig) -> Self {
        Self {
            worker_count: config.workers.count,
            queue_capacity: config.workers.queue_capacity,
            task_deadline: config.workers.task_deadline(),
            stale_pending_after: config.stale_pending_after(),
        }
    }
}

/// Number of jobs per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JobCounts {
    pub pending: u64,
    pub completed: u64,
    pub failed: u64,
}

pub struct Orchestrator {
    state_machine: Arc<StateMachine>,
    backend: Arc<dyn GenerationBackend>,
    runner: Arc<EnrichmentRunner>,
    pool: WorkerPool<EnrichmentRunner>,
}

impl Orchestrator {
    /// Starts the worker pool. Background tasks are driven on `handle`,
    /// which must belong to a multi-thread runtime.
    pub fn new(
        db: Database,
        backend: Arc<dyn GenerationBackend>,
        options: OrchestratorOptions,
        handle: Handle,
    ) -> Result<Self, WorkerError> {
        if handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(WorkerError::UnsupportedRuntime);
        }

        let state_machine =
            Arc::new(StateMachine::new(db).with_stale_reclaim(options.stale_pending_after));
        let runner = Arc::new(EnrichmentRunner::new(
            Arc::clone(&state_machine),
            Arc::clone(&backend),
            handle,
            options.task_deadline,
        ));
        let pool = WorkerPool::new(
            Arc::clone(&runner),
            options.worker_count,
            options.queue_capacity,
        )?;

        info!(
            model = backend.model_identifier(),
            workers = options.worker_count,
            "enrichment orchestrator ready"
        );

        Ok(Self {
            state_machine,
            backend,
            runner,
            pool,
        })
    }

    /// Opens the configured database and backend and starts the pool.
    pub fn from_config(config: &EnrichmentConfig, handle: Handle) -> crate::Result<Self> {
        let path = config.database.resolved_path().ok_or_else(|| ConfigError::Validation {
            message: "could not determine a database path; set database.path".to_string(),
        })?;
        let db = Database::open(&path)?;
        let settings = BackendSettings::from_config(&config.backend)?;
        let backend: Arc<dyn GenerationBackend> = Arc::new(OpenAiBackend::new(settings)?);

        Ok(Self::new(db, backend, OrchestratorOptions::from(config), handle)?)
    }

    /// Claims a new attempt for `entry` and queues it. Returns immediately.
    ///
    /// Only store failures are returned as errors; a running generation
    /// and a full queue are reported through [`Submission`].
    pub fn request_generation(&self, entry: &JournalEntry) -> Result<Submission, DatabaseError> {
        let request = build_request(entry);
        let claim = match self.state_machine.claim(
            entry.id,
            self.backend.model_identifier(),
            &request.prompt_version,
        )? {
            ClaimOutcome::Accepted(claim) => claim,
            ClaimOutcome::AlreadyInProgress => return Ok(Submission::AlreadyInProgress),
        };

        match self.pool.submit(EnrichmentTask { claim, request }) {
            Ok(()) => {
                debug!(entry = %entry.id, "enrichment scheduled");
                Ok(Submission::Scheduled)
            }
            Err(rejected) => {
                warn!(entry = %entry.id, error = %rejected.error, "enrichment not scheduled");
                let reason = BackendError::NotScheduled(rejected.error.to_string());
                self.state_machine.commit(rejected.task.claim, Err(reason))?;
                Ok(Submission::NotScheduled)
            }
        }
    }

    /// Claims, generates and commits inline. `None` means a generation was
    /// already running and nothing was done.
    pub async fn generate_now(
        &self,
        entry: &JournalEntry,
    ) -> Result<Option<EnrichmentJob>, DatabaseError> {
        let request = build_request(entry);
        let claim = match self.state_machine.claim(
            entry.id,
            self.backend.model_identifier(),
            &request.prompt_version,
        )? {
            ClaimOutcome::Accepted(claim) => claim,
            ClaimOutcome::AlreadyInProgress => return Ok(None),
        };

        match self
            .runner
            .run_to_commit(EnrichmentTask { claim, request })
            .await?
        {
            CommitOutcome::Committed(job) => Ok(Some(job)),
            CommitOutcome::Superseded => self.get_result(entry.id),
        }
    }

    pub fn get_result(&self, parent_id: EntryId) -> Result<Option<EnrichmentJob>, DatabaseError> {
        enrichment_repo::find(self.state_machine.database(), parent_id)
    }

    /// Whether an enrichment row exists for the entry, in any state.
    pub fn has_result(&self, parent_id: EntryId) -> Result<bool, DatabaseError> {
        enrichment_repo::exists(self.state_machine.database(), parent_id)
    }

    pub fn status_counts(&self) -> Result<JobCounts, DatabaseError> {
        let db = self.state_machine.database();
        Ok(JobCounts {
            pending: enrichment_repo::count_by_status(db, JobStatus::Pending)?,
            completed: enrichment_repo::count_by_status(db, JobStatus::Completed)?,
            failed: enrichment_repo::count_by_status(db, JobStatus::Failed)?,
        })
    }

    /// True when no queued or running tasks remain.
    pub fn is_idle(&self) -> bool {
        self.pool.outstanding() == 0
    }

    /// Waits until the pool is idle. Returns false if `timeout` ran out first.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while !self.is_idle() {
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        true
    }

    /// Stops accepting requests, finishes queued tasks and joins the
    /// workers. Blocks the calling thread; do not call it from a runtime
    /// worker thread.
    pub fn shutdown(self) {
        self.pool.shutdown();
        self.pool.wait();
    }
}
