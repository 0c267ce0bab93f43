//! A generation backend that follows a script instead of calling a model.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Semaphore;

use reverie::enrichment::Analysis;
use reverie::{BackendError, EnrichmentRequest, EnrichmentResult, GenerationBackend};

pub const SCRIPTED_MODEL: &str = "scripted-model";

#[derive(Clone)]
enum Outcome {
    Succeed(Analysis),
    Fail(String),
    Panic,
}

/// One scripted `generate` call.
#[derive(Clone)]
pub struct Step {
    gate: Option<Arc<Semaphore>>,
    delay: Option<Duration>,
    outcome: Outcome,
}

impl Step {
    pub fn succeed(analysis: Analysis) -> Self {
        Self::with(Outcome::Succeed(analysis))
    }

    /// Fails with an HTTP 503 carrying `message`.
    pub fn fail(message: &str) -> Self {
        Self::with(Outcome::Fail(message.to_string()))
    }

    pub fn panic() -> Self {
        Self::with(Outcome::Panic)
    }

    /// Block until a permit is added to `gate`.
    pub fn after_gate(mut self, gate: &Arc<Semaphore>) -> Self {
        self.gate = Some(Arc::clone(gate));
        self
    }

    pub fn after_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    fn with(outcome: Outcome) -> Self {
        Self {
            gate: None,
            delay: None,
            outcome,
        }
    }
}

/// Plays queued steps in order, then repeats `fallback`.
pub struct ScriptedBackend {
    steps: Mutex<VecDeque<Step>>,
    fallback: Step,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(fallback: Step) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(VecDeque::new()),
            fallback,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn then(self: &Arc<Self>, step: Step) -> Arc<Self> {
        self.steps.lock().unwrap().push_back(step);
        Arc::clone(self)
    }

    /// Number of `generate` calls started so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Waits until at least `n` calls have started.
    pub async fn wait_for_calls(&self, n: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.calls() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "backend saw {} calls, expected {}",
                self.calls(),
                n
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

/// A gate with no permits; add one per call that should proceed.
pub fn gate() -> Arc<Semaphore> {
    Arc::new(Semaphore::new(0))
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    fn model_identifier(&self) -> &str {
        SCRIPTED_MODEL
    }

    async fn generate(
        &self,
        _request: &EnrichmentRequest,
    ) -> Result<EnrichmentResult, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut steps = self.steps.lock().unwrap();
            steps.pop_front().unwrap_or_else(|| self.fallback.clone())
        };

        if let Some(gate) = &step.gate {
            gate.acquire().await.unwrap().forget();
        }
        if let Some(delay) = step.delay {
            tokio::time::sleep(delay).await;
        }

        match step.outcome {
            Outcome::Succeed(analysis) => Ok(EnrichmentResult {
                analysis,
                model: SCRIPTED_MODEL.to_string(),
                tokens_used: Some(42),
                confidence_score: Some(0.85),
            }),
            Outcome::Fail(message) => Err(BackendError::Status {
                status: 503,
                message,
            }),
            Outcome::Panic => panic!("scripted backend blew up"),
        }
    }
}
