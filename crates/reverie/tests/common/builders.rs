//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use tokio::runtime::Handle;

use reverie::enrichment::{
    Analysis, DreamSymbol, DreamType, EnrichmentJob, EntryId, JournalEntry, Keywords, Mood,
    SleepQuality, SymbolAnalysis,
};
use reverie::{Database, GenerationBackend, Orchestrator, OrchestratorOptions};

/// Builder for creating `JournalEntry` instances.
pub struct EntryBuilder {
    entry: JournalEntry,
}

impl EntryBuilder {
    pub fn new(id: i64) -> Self {
        Self {
            entry: JournalEntry::new(
                id,
                "Flooded library",
                "I was in a library slowly filling with water. The books floated.",
            ),
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.entry.title = title.to_string();
        self
    }

    pub fn content(mut self, content: &str) -> Self {
        self.entry.content = content.to_string();
        self
    }

    /// Fill every optional field.
    pub fn detailed(mut self) -> Self {
        self.entry.dream_date = NaiveDate::from_ymd_opt(2024, 3, 14);
        self.entry.sleep_quality = Some(SleepQuality::Fair);
        self.entry.mood_before_sleep = Some(Mood::Anxious);
        self.entry.mood_after_wake = Some(Mood::Confused);
        self.entry.dream_type = Some(DreamType::Recurring);
        self.entry.vividness = Some(8);
        self.entry.tags = vec!["water".to_string(), "books".to_string()];
        self
    }

    pub fn build(self) -> JournalEntry {
        self.entry
    }
}

/// A journal entry with only the required fields.
pub fn entry(id: i64) -> JournalEntry {
    EntryBuilder::new(id).build()
}

/// An analysis with a summary and a couple of keywords.
pub fn analysis(summary: &str) -> Analysis {
    Analysis {
        summary: summary.to_string(),
        keywords: Keywords {
            primary: vec!["water".to_string(), "library".to_string()],
            secondary: vec!["books".to_string()],
            emotions: vec!["unease".to_string()],
        },
        emotion_analysis: Default::default(),
        symbol_analysis: SymbolAnalysis {
            symbols: vec![DreamSymbol {
                symbol: "water".to_string(),
                meaning: Some("emotion".to_string()),
                psychological_interpretation: None,
            }],
            overall_theme: Some("being overwhelmed".to_string()),
            life_connection: None,
        },
        psychological_insight: Some("Pressure is building somewhere.".to_string()),
        advice: None,
    }
}

/// Options for a small, fast orchestrator.
pub fn options(workers: usize) -> OrchestratorOptions {
    OrchestratorOptions {
        worker_count: workers,
        queue_capacity: 16,
        task_deadline: Duration::from_secs(10),
        stale_pending_after: None,
    }
}

/// An orchestrator over a fresh in-memory database. The database handle is
/// returned too so tests can inspect or tamper with the store.
pub fn orchestrator(
    backend: Arc<dyn GenerationBackend>,
    options: OrchestratorOptions,
) -> (Orchestrator, Database) {
    let db = Database::open_in_memory().unwrap();
    let orchestrator = Orchestrator::new(db.clone(), backend, options, Handle::current()).unwrap();
    (orchestrator, db)
}

/// Polls until the job for `id` leaves PENDING.
pub async fn wait_for_terminal(orchestrator: &Orchestrator, id: EntryId) -> EnrichmentJob {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        if let Some(job) = orchestrator.get_result(id).unwrap() {
            if !job.is_pending() {
                return job;
            }
        }
        assert!(Instant::now() < deadline, "job {} never finished", id);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Builder for config JSON documents.
pub struct ConfigBuilder {
    model: String,
    base_url: Option<String>,
    database_path: Option<String>,
    worker_count: Option<usize>,
    task_deadline_secs: Option<u64>,
    stale_pending_after_secs: Option<u64>,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            base_url: None,
            database_path: None,
            worker_count: None,
            task_deadline_secs: None,
            stale_pending_after_secs: None,
        }
    }

    pub fn model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.base_url = Some(url.to_string());
        self
    }

    pub fn database_path(mut self, path: &str) -> Self {
        self.database_path = Some(path.to_string());
        self
    }

    pub fn worker_count(mut self, count: usize) -> Self {
        self.worker_count = Some(count);
        self
    }

    pub fn task_deadline_secs(mut self, secs: u64) -> Self {
        self.task_deadline_secs = Some(secs);
        self
    }

    pub fn stale_pending_after_secs(mut self, secs: u64) -> Self {
        self.stale_pending_after_secs = Some(secs);
        self
    }

    pub fn to_json(&self) -> String {
        let mut backend = serde_json::json!({ "model": self.model });
        if let Some(url) = &self.base_url {
            backend["base_url"] = url.clone().into();
        }

        let mut workers = serde_json::Map::new();
        if let Some(count) = self.worker_count {
            workers.insert("count".to_string(), count.into());
        }
        if let Some(secs) = self.task_deadline_secs {
            workers.insert("task_deadline_secs".to_string(), secs.into());
        }

        let mut config = serde_json::json!({
            "version": "1.0",
            "backend": backend,
            "workers": workers,
        });
        if let Some(path) = &self.database_path {
            config["database"] = serde_json::json!({ "path": path });
        }
        if let Some(secs) = self.stale_pending_after_secs {
            config["stale_pending_after_secs"] = secs.into();
        }
        config.to_string()
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
