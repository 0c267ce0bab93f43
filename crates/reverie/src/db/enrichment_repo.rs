//! Enrichment job repository: row access for the `enrichment_jobs` table.
//!
//! `load_for_update`, `insert` and `save` take a connection that the caller
//! has placed inside [`Database::with_transaction`]; the IMMEDIATE
//! transaction is what makes the load an exclusive one. `find`, `exists` and
//! `count_by_status` are plain reads.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DatabaseError};
use crate::enrichment::job::{
    Analysis, EnrichmentJob, EntryId, JobState, JobStatus, Telemetry,
};

const SELECT_COLUMNS: &str = "parent_id, status, summary, keywords, emotion_analysis,
     symbol_analysis, psychological_insight, advice, model_identifier, prompt_version,
     error_message, tokens_used, generation_duration_ms, confidence_score, attempt,
     created_at, updated_at";

/// A raw enrichment row from the database.
#[derive(Debug, Clone)]
struct EnrichmentRow {
    parent_id: i64,
    status: String,
    summary: Option<String>,
    keywords: Option<String>,
    emotion_analysis: Option<String>,
    symbol_analysis: Option<String>,
    psychological_insight: Option<String>,
    advice: Option<String>,
    model_identifier: String,
    prompt_version: String,
    error_message: Option<String>,
    tokens_used: Option<u32>,
    generation_duration_ms: Option<i64>,
    confidence_score: Option<f64>,
    attempt: u32,
    created_at: String,
    updated_at: String,
}

impl EnrichmentRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            parent_id: row.get("parent_id")?,
            status: row.get("status")?,
            summary: row.get("summary")?,
            keywords: row.get("keywords")?,
            emotion_analysis: row.get("emotion_analysis")?,
            symbol_analysis: row.get("symbol_analysis")?,
            psychological_insight: row.get("psychological_insight")?,
            advice: row.get("advice")?,
            model_identifier: row.get("model_identifier")?,
            prompt_version: row.get("prompt_version")?,
            error_message: row.get("error_message")?,
            tokens_used: row.get("tokens_used")?,
            generation_duration_ms: row.get("generation_duration_ms")?,
            confidence_score: row.get("confidence_score")?,
            attempt: row.get("attempt")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    fn from_job(job: &EnrichmentJob) -> Result<Self, DatabaseError> {
        let (summary, keywords, emotion_analysis, symbol_analysis, insight, advice) =
            match &job.state {
                JobState::Completed(analysis) => (
                    Some(analysis.summary.clone()),
                    Some(serde_json::to_string(&analysis.keywords)?),
                    Some(serde_json::to_string(&analysis.emotion_analysis)?),
                    Some(serde_json::to_string(&analysis.symbol_analysis)?),
                    analysis.psychological_insight.clone(),
                    analysis.advice.clone(),
                ),
                _ => (None, None, None, None, None, None),
            };

        Ok(Self {
            parent_id: job.parent_id.get(),
            status: job.status().as_str().to_string(),
            summary,
            keywords,
            emotion_analysis,
            symbol_analysis,
            psychological_insight: insight,
            advice,
            model_identifier: job.model_identifier.clone(),
            prompt_version: job.prompt_version.clone(),
            error_message: job.error_message().map(str::to_string),
            tokens_used: job.telemetry.tokens_used,
            generation_duration_ms: job
                .telemetry
                .generation_duration_ms
                .map(|ms| i64::try_from(ms).unwrap_or(i64::MAX)),
            confidence_score: job.telemetry.confidence_score,
            attempt: job.attempt,
            created_at: format_timestamp(&job.created_at),
            updated_at: format_timestamp(&job.updated_at),
        })
    }

    fn into_job(self) -> Result<EnrichmentJob, DatabaseError> {
        let parent_id = self.parent_id;
        let corrupt = |reason: String| DatabaseError::Corrupt { parent_id, reason };

        let status: JobStatus = self.status.parse().map_err(corrupt)?;
        let state = match status {
            JobStatus::Pending => JobState::Pending,
            JobStatus::Failed => JobState::Failed {
                error: self.error_message.unwrap_or_default(),
            },
            JobStatus::Completed => {
                let summary = self
                    .summary
                    .ok_or_else(|| corrupt("completed row has no summary".to_string()))?;
                JobState::Completed(Analysis {
                    summary,
                    keywords: decode_json(parent_id, "keywords", self.keywords)?,
                    emotion_analysis: decode_json(
                        parent_id,
                        "emotion_analysis",
                        self.emotion_analysis,
                    )?,
                    symbol_analysis: decode_json(
                        parent_id,
                        "symbol_analysis",
                        self.symbol_analysis,
                    )?,
                    psychological_insight: self.psychological_insight,
                    advice: self.advice,
                })
            }
        };

        Ok(EnrichmentJob {
            parent_id: EntryId::new(parent_id),
            state,
            model_identifier: self.model_identifier,
            prompt_version: self.prompt_version,
            telemetry: Telemetry {
                tokens_used: self.tokens_used,
                generation_duration_ms: self
                    .generation_duration_ms
                    .and_then(|ms| u64::try_from(ms).ok()),
                confidence_score: self.confidence_score,
            },
            attempt: self.attempt,
            created_at: parse_timestamp(parent_id, &self.created_at)?,
            updated_at: parse_timestamp(parent_id, &self.updated_at)?,
        })
    }
}

fn decode_json<T>(parent_id: i64, column: &str, raw: Option<String>) -> Result<T, DatabaseError>
where
    T: serde::de::DeserializeOwned + Default,
{
    match raw {
        None => Ok(T::default()),
        Some(text) => serde_json::from_str(&text).map_err(|e| DatabaseError::Corrupt {
            parent_id,
            reason: format!("invalid {} JSON: {}", column, e),
        }),
    }
}

fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(parent_id: i64, s: &str) -> Result<DateTime<Utc>, DatabaseError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DatabaseError::Corrupt {
            parent_id,
            reason: format!("invalid timestamp '{}': {}", s, e),
        })
}

fn select_one(conn: &Connection, parent_id: EntryId) -> Result<Option<EnrichmentJob>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM enrichment_jobs WHERE parent_id = ?1",
        SELECT_COLUMNS
    );
    let row = conn
        .query_row(&sql, params![parent_id.get()], EnrichmentRow::from_row)
        .optional()?;
    row.map(EnrichmentRow::into_job).transpose()
}

// ─── Transactional access ───

/// Loads the job for `parent_id` under the caller's IMMEDIATE transaction.
pub fn load_for_update(
    conn: &Connection,
    parent_id: EntryId,
) -> Result<Option<EnrichmentJob>, DatabaseError> {
    select_one(conn, parent_id)
}

/// Inserts a new job row.
///
/// Fails with [`DatabaseError::Conflict`] when a row for the same entry
/// already exists.
pub fn insert(conn: &Connection, job: &EnrichmentJob) -> Result<(), DatabaseError> {
    let row = EnrichmentRow::from_job(job)?;
    let result = conn.execute(
        "INSERT INTO enrichment_jobs (parent_id, status, summary, keywords, emotion_analysis,
         symbol_analysis, psychological_insight, advice, model_identifier, prompt_version,
         error_message, tokens_used, generation_duration_ms, confidence_score, attempt,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
        params![
            row.parent_id,
            row.status,
            row.summary,
            row.keywords,
            row.emotion_analysis,
            row.symbol_analysis,
            row.psychological_insight,
            row.advice,
            row.model_identifier,
            row.prompt_version,
            row.error_message,
            row.tokens_used,
            row.generation_duration_ms,
            row.confidence_score,
            row.attempt,
            row.created_at,
            row.updated_at,
        ],
    );

    match result {
        Ok(_) => Ok(()),
        Err(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Err(DatabaseError::Conflict {
                parent_id: row.parent_id,
            })
        }
        Err(e) => Err(DatabaseError::Sqlite(e)),
    }
}

/// Overwrites every mutable column of an existing job. `created_at` is kept.
pub fn save(conn: &Connection, job: &EnrichmentJob) -> Result<(), DatabaseError> {
    let row = EnrichmentRow::from_job(job)?;
    let changed = conn.execute(
        "UPDATE enrichment_jobs SET status=?2, summary=?3, keywords=?4, emotion_analysis=?5,
         symbol_analysis=?6, psychological_insight=?7, advice=?8, model_identifier=?9,
         prompt_version=?10, error_message=?11, tokens_used=?12, generation_duration_ms=?13,
         confidence_score=?14, attempt=?15, updated_at=?16
         WHERE parent_id=?1",
        params![
            row.parent_id,
            row.status,
            row.summary,
            row.keywords,
            row.emotion_analysis,
            row.symbol_analysis,
            row.psychological_insight,
            row.advice,
            row.model_identifier,
            row.prompt_version,
            row.error_message,
            row.tokens_used,
            row.generation_duration_ms,
            row.confidence_score,
            row.attempt,
            row.updated_at,
        ],
    )?;

    if changed == 0 {
        return Err(DatabaseError::NotFound {
            parent_id: row.parent_id,
        });
    }
    Ok(())
}

// ─── Reads ───

/// Finds the job for an entry without taking any lock.
pub fn find(db: &Database, parent_id: EntryId) -> Result<Option<EnrichmentJob>, DatabaseError> {
    db.with_conn(|conn| select_one(conn, parent_id))
}

/// Returns whether a job row exists for the entry.
pub fn exists(db: &Database, parent_id: EntryId) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM enrichment_jobs WHERE parent_id = ?1",
                params![parent_id.get()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    })
}

/// Counts jobs with the given status.
pub fn count_by_status(db: &Database, status: JobStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM enrichment_jobs WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
