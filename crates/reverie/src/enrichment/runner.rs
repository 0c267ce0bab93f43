//! Background half of an enrichment: backend call, then commit.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::runtime::Handle;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::state_machine::{Claim, CommitOutcome, StateMachine};
use crate::backend::{BackendError, EnrichmentRequest, EnrichmentResult, GenerationBackend};
use crate::db::DatabaseError;
use crate::worker::TaskRunner;

/// An accepted claim together with the request it was accepted for.
#[derive(Debug)]
pub struct EnrichmentTask {
    pub claim: Claim,
    pub request: EnrichmentRequest,
}

pub struct EnrichmentRunner {
    state_machine: Arc<StateMachine>,
    backend: Arc<dyn GenerationBackend>,
    handle: Handle,
    deadline: Duration,
}

impl EnrichmentRunner {
    pub fn new(
        state_machine: Arc<StateMachine>,
        backend: Arc<dyn GenerationBackend>,
        handle: Handle,
        deadline: Duration,
    ) -> Self {
        Self {
            state_machine,
            backend,
            handle,
            deadline,
        }
    }

    /// Runs the backend call and commits whatever came of it.
    ///
    /// A claim superseded while it waited is dropped without calling the
    /// backend. Backend errors, panics and the deadline all end in a FAILED
    /// commit; only store failures are returned.
    pub async fn run_to_commit(
        &self,
        task: EnrichmentTask,
    ) -> Result<CommitOutcome, DatabaseError> {
        let EnrichmentTask { claim, request } = task;
        let span = info_span!(
            "enrichment",
            entry = %claim.parent_id(),
            attempt = claim.attempt()
        );

        async move {
            if !self.state_machine.mark_started(&claim)? {
                info!("claim superseded before start, skipping generation");
                return Ok(CommitOutcome::Superseded);
            }

            let outcome = self.generate(&request).await;
            match &outcome {
                Ok(result) => debug!(
                    model = %result.model,
                    tokens = ?result.tokens_used,
                    "generation succeeded"
                ),
                Err(err) => warn!(error = %err, "generation failed"),
            }

            let committed = self.state_machine.commit(claim, outcome)?;
            if let CommitOutcome::Committed(job) = &committed {
                info!(
                    status = %job.status(),
                    duration_ms = ?job.telemetry.generation_duration_ms,
                    "enrichment committed"
                );
            }
            Ok(committed)
        }
        .instrument(span)
        .await
    }

    async fn generate(&self, request: &EnrichmentRequest) -> Result<EnrichmentResult, BackendError> {
        let call = AssertUnwindSafe(self.backend.generate(request)).catch_unwind();
        match tokio::time::timeout(self.deadline, call).await {
            Ok(Ok(result)) => result,
            Ok(Err(panic)) => Err(BackendError::Panicked(panic_message(panic.as_ref()))),
            Err(_) => Err(BackendError::Timeout(self.deadline)),
        }
    }
}

impl TaskRunner for EnrichmentRunner {
    type Task = EnrichmentTask;

    fn run(&self, task: EnrichmentTask) {
        let parent_id = task.claim.parent_id();
        if let Err(e) = self.handle.block_on(self.run_to_commit(task)) {
            error!(
                entry = %parent_id,
                error = %e,
                "FATAL: could not record enrichment outcome, job may stay PENDING"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
