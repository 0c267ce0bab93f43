//! Job state transitions.
//!
//! ```text
//!   (no row) ──claim──▶ PENDING ──commit(ok)──▶ COMPLETED ─┐
//!                         ▲  └───commit(err)──▶ FAILED ────┤
//!                         └─────────────claim───────────────┘
//! ```
//!
//! `claim` and `commit` each run in their own short IMMEDIATE transaction.
//! Nothing between them holds a lock, so a slow backend call for one entry
//! never delays claims or commits for another. A PENDING row rejects every
//! further claim; that rule plus the store's write lock is the whole
//! de-duplication mechanism.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::{debug, warn};

use super::job::{self, EnrichmentJob, EntryId, JobState, Telemetry};
use crate::backend::{BackendError, EnrichmentResult};
use crate::db::{enrichment_repo, Database, DatabaseError};

/// Proof that the holder won the right to run one generation attempt.
///
/// Consumed by [`StateMachine::commit`]; it cannot be cloned, so each
/// accepted claim is committed at most once.
#[derive(Debug)]
pub struct Claim {
    parent_id: EntryId,
    attempt: u32,
    accepted_at: Instant,
    reclaimed: bool,
}

impl Claim {
    fn for_job(job: &EnrichmentJob, reclaimed: bool) -> Self {
        Self {
            parent_id: job.parent_id,
            attempt: job.attempt,
            accepted_at: Instant::now(),
            reclaimed,
        }
    }

    pub fn parent_id(&self) -> EntryId {
        self.parent_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Whether this claim took over a stale PENDING job.
    pub fn is_reclaim(&self) -> bool {
        self.reclaimed
    }

    /// Wall-clock time since the claim was accepted.
    pub fn elapsed(&self) -> Duration {
        self.accepted_at.elapsed()
    }
}

#[derive(Debug)]
pub enum ClaimOutcome {
    Accepted(Claim),
    /// A generation for this entry is already running; nothing was written.
    AlreadyInProgress,
}

#[derive(Debug)]
pub enum CommitOutcome {
    Committed(EnrichmentJob),
    /// The row no longer belongs to this claim (reclaimed or removed);
    /// nothing was written.
    Superseded,
}

pub struct StateMachine {
    db: Database,
    stale_after: Option<Duration>,
}

impl StateMachine {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            stale_after: None,
        }
    }

    /// Allows a claim to take over a PENDING job whose last transition is
    /// older than `threshold`. `None` keeps stranded jobs PENDING.
    pub fn with_stale_reclaim(mut self, threshold: Option<Duration>) -> Self {
        self.stale_after = threshold;
        self
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Tries to move the job for `parent_id` into PENDING for a new attempt.
    pub fn claim(
        &self,
        parent_id: EntryId,
        model_identifier: &str,
        prompt_version: &str,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let now = job::now();
        self.db.with_transaction(|tx| {
            let loaded = enrichment_repo::load_for_update(tx, parent_id)?;
            self.claim_locked(tx, parent_id, loaded, model_identifier, prompt_version, now)
        })
    }

    /// Claim logic once the current row (if any) has been loaded under lock.
    fn claim_locked(
        &self,
        conn: &Connection,
        parent_id: EntryId,
        loaded: Option<EnrichmentJob>,
        model_identifier: &str,
        prompt_version: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let existing = match loaded {
            Some(job) => job,
            None => {
                let fresh = EnrichmentJob::new_pending(parent_id, model_identifier, prompt_version, now);
                match enrichment_repo::insert(conn, &fresh) {
                    Ok(()) => {
                        debug!(entry = %parent_id, "created enrichment job");
                        return Ok(ClaimOutcome::Accepted(Claim::for_job(&fresh, false)));
                    }
                    Err(DatabaseError::Conflict { .. }) => {
                        debug!(entry = %parent_id, "job inserted concurrently, re-checking");
                        enrichment_repo::load_for_update(conn, parent_id)?.ok_or(
                            DatabaseError::NotFound {
                                parent_id: parent_id.get(),
                            },
                        )?
                    }
                    Err(e) => return Err(e),
                }
            }
        };

        self.claim_existing(conn, existing, model_identifier, prompt_version, now)
    }

    fn claim_existing(
        &self,
        conn: &Connection,
        mut job: EnrichmentJob,
        model_identifier: &str,
        prompt_version: &str,
        now: DateTime<Utc>,
    ) -> Result<ClaimOutcome, DatabaseError> {
        let reclaimed = if job.is_pending() {
            if !self.is_stale(&job, now) {
                debug!(entry = %job.parent_id, attempt = job.attempt, "generation already in progress");
                return Ok(ClaimOutcome::AlreadyInProgress);
            }
            warn!(
                entry = %job.parent_id,
                attempt = job.attempt,
                pending_since = %job.updated_at,
                "reclaiming stale PENDING job"
            );
            true
        } else {
            false
        };

        job.reset_to_pending(model_identifier, prompt_version, now);
        enrichment_repo::save(conn, &job)?;
        Ok(ClaimOutcome::Accepted(Claim::for_job(&job, reclaimed)))
    }

    fn is_stale(&self, job: &EnrichmentJob, now: DateTime<Utc>) -> bool {
        let Some(threshold) = self.stale_after else {
            return false;
        };
        now.signed_duration_since(job.updated_at)
            .to_std()
            .map(|age| age >= threshold)
            .unwrap_or(false)
    }

    /// Marks the claimed attempt as running by touching `updated_at`.
    ///
    /// Staleness is measured from the last touch, so queue wait before the
    /// task starts does not count against the reclaim threshold. Returns
    /// `false` if the claim was superseded while queued; the attempt must
    /// then not call the backend.
    pub fn mark_started(&self, claim: &Claim) -> Result<bool, DatabaseError> {
        let now = job::now();
        self.db.with_transaction(|tx| {
            let Some(mut job) = enrichment_repo::load_for_update(tx, claim.parent_id)? else {
                return Ok(false);
            };
            if !job.is_pending() || job.attempt != claim.attempt {
                debug!(
                    entry = %claim.parent_id,
                    claimed_attempt = claim.attempt,
                    current_attempt = job.attempt,
                    "claim superseded while queued"
                );
                return Ok(false);
            }
            job.updated_at = now;
            enrichment_repo::save(tx, &job)?;
            Ok(true)
        })
    }

    /// Records the outcome of the attempt `claim` started.
    ///
    /// Success stores the analysis and clears any error; failure stores the
    /// error message and leaves no payload. Duration telemetry covers the
    /// time since the claim was accepted.
    pub fn commit(
        &self,
        claim: Claim,
        outcome: Result<EnrichmentResult, BackendError>,
    ) -> Result<CommitOutcome, DatabaseError> {
        let duration_ms = u64::try_from(claim.elapsed().as_millis()).unwrap_or(u64::MAX);
        let now = job::now();

        self.db.with_transaction(|tx| {
            let Some(mut job) = enrichment_repo::load_for_update(tx, claim.parent_id)? else {
                warn!(entry = %claim.parent_id, "enrichment job vanished before commit");
                return Ok(CommitOutcome::Superseded);
            };
            if !job.is_pending() || job.attempt != claim.attempt {
                warn!(
                    entry = %claim.parent_id,
                    claimed_attempt = claim.attempt,
                    current_attempt = job.attempt,
                    status = %job.status(),
                    "claim superseded, dropping outcome"
                );
                return Ok(CommitOutcome::Superseded);
            }

            match outcome {
                Ok(result) => {
                    job.state = JobState::Completed(result.analysis);
                    job.model_identifier = result.model;
                    job.telemetry = Telemetry {
                        tokens_used: result.tokens_used,
                        generation_duration_ms: Some(duration_ms),
                        confidence_score: result.confidence_score,
                    };
                }
                Err(err) => {
                    job.state = JobState::Failed {
                        error: err.to_string(),
                    };
                    job.telemetry = Telemetry {
                        tokens_used: None,
                        generation_duration_ms: Some(duration_ms),
                        confidence_score: None,
                    };
                }
            }
            job.updated_at = now;

            enrichment_repo::save(tx, &job)?;
            Ok(CommitOutcome::Committed(job))
        })
    }
}
