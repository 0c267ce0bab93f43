use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, error, info};

use crate::error::WorkerError;

/// Executes one task on a worker thread.
///
/// `run` must handle its own failures; a panic is caught and logged by the
/// pool, and the worker moves on to the next task.
pub trait TaskRunner: Send + Sync + 'static {
    type Task: Send + 'static;

    fn run(&self, task: Self::Task);
}

/// A task the pool refused, handed back so the caller can settle it.
#[derive(Debug)]
pub struct Rejected<T> {
    pub task: T,
    pub error: WorkerError,
}

/// Fixed set of worker threads fed through a bounded channel.
///
/// Tasks already queued when the pool shuts down are still run; only new
/// submissions are refused.
pub struct WorkerPool<R: TaskRunner> {
    task_sender: Sender<R::Task>,
    workers: Vec<JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
    outstanding: Arc<AtomicUsize>,
}

impl<R: TaskRunner> WorkerPool<R> {
    /// Starts `worker_count` workers sharing `runner`.
    ///
    /// # Panics
    /// Panics if `worker_count` is 0.
    pub fn new(
        runner: Arc<R>,
        worker_count: usize,
        queue_capacity: usize,
    ) -> Result<Self, WorkerError> {
        assert!(worker_count > 0, "worker_count must be > 0");
        let (task_sender, task_receiver) = bounded::<R::Task>(queue_capacity.max(1));
        let shutdown = Arc::new(AtomicBool::new(false));
        let outstanding = Arc::new(AtomicUsize::new(0));

        let mut workers = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let task_rx = task_receiver.clone();
            let worker_runner = Arc::clone(&runner);
            let worker_outstanding = Arc::clone(&outstanding);

            let handle = thread::Builder::new()
                .name(format!("reverie-worker-{}", worker_id))
                .spawn(move || {
                    run_worker(worker_id, task_rx, worker_runner, worker_outstanding);
                })
                .map_err(|e| WorkerError::SpawnFailed(e.to_string()))?;

            workers.push(handle);
        }

        info!("Started {} enrichment workers", worker_count);

        Ok(Self {
            task_sender,
            workers,
            shutdown,
            outstanding,
        })
    }

    /// Queues a task without blocking.
    pub fn submit(&self, task: R::Task) -> Result<(), Rejected<R::Task>> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Err(Rejected {
                task,
                error: WorkerError::ChannelClosed,
            });
        }

        self.outstanding.fetch_add(1, Ordering::SeqCst);
        self.task_sender.try_send(task).map_err(|e| {
            self.outstanding.fetch_sub(1, Ordering::SeqCst);
            match e {
                TrySendError::Full(task) => Rejected {
                    task,
                    error: WorkerError::QueueFull,
                },
                TrySendError::Disconnected(task) => Rejected {
                    task,
                    error: WorkerError::ChannelClosed,
                },
            }
        })
    }

    /// Tasks submitted and not yet finished, queued ones included.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    pub fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }

    /// Drains the queue and joins every worker.
    pub fn wait(self) {
        // Dropping the sender lets workers exit once the queue is empty.
        drop(self.task_sender);

        for (i, worker) in self.workers.into_iter().enumerate() {
            if let Err(e) = worker.join() {
                error!("Worker {} panicked: {:?}", i, e);
            } else {
                debug!("Worker {} finished", i);
            }
        }

        info!("All workers have stopped");
    }
}

fn run_worker<R: TaskRunner>(
    worker_id: usize,
    task_receiver: Receiver<R::Task>,
    runner: Arc<R>,
    outstanding: Arc<AtomicUsize>,
) {
    debug!("Worker {} started", worker_id);

    loop {
        match task_receiver.recv_timeout(Duration::from_millis(100)) {
            Ok(task) => {
                let result = panic::catch_unwind(AssertUnwindSafe(|| runner.run(task)));
                if let Err(payload) = result {
                    let message = payload
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| payload.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic payload".to_string());
                    error!("Worker {} task panicked: {}", worker_id, message);
                }
                outstanding.fetch_sub(1, Ordering::SeqCst);
            }
            Err(RecvTimeoutError::Timeout) => {
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => {
                debug!("Worker {} task channel disconnected", worker_id);
                break;
            }
        }
    }

    debug!("Worker {} stopped", worker_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Instant;

    /// Records the tasks it ran; panics on negative input.
    struct Recorder {
        seen: Mutex<Vec<i32>>,
        gate: Mutex<()>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
                gate: Mutex::new(()),
            })
        }
    }

    impl TaskRunner for Recorder {
        type Task = i32;

        fn run(&self, task: i32) {
            let _gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            if task < 0 {
                panic!("negative task {}", task);
            }
            self.seen.lock().unwrap().push(task);
        }
    }

    fn wait_until_idle<R: TaskRunner>(pool: &WorkerPool<R>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while pool.outstanding() > 0 {
            assert!(Instant::now() < deadline, "pool did not drain");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_worker_pool_creation() {
        let pool = WorkerPool::new(Recorder::new(), 2, 4).unwrap();

        assert!(!pool.is_shutdown());

        pool.shutdown();
        assert!(pool.is_shutdown());

        pool.wait();
    }

    #[test]
    fn test_submit_runs_tasks() {
        let recorder = Recorder::new();
        let pool = WorkerPool::new(Arc::clone(&recorder), 3, 16).unwrap();

        for i in 0..10 {
            pool.submit(i).unwrap();
        }
        wait_until_idle(&pool);

        let mut seen = recorder.seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());

        pool.shutdown();
        pool.wait();
    }

    #[test]
    fn test_panicking_task_does_not_kill_worker() {
        let recorder = Recorder::new();
        let pool = WorkerPool::new(Arc::clone(&recorder), 1, 4).unwrap();

        pool.submit(-1).unwrap();
        pool.submit(7).unwrap();
        wait_until_idle(&pool);

        assert_eq!(*recorder.seen.lock().unwrap(), vec![7]);
        pool.wait();
    }

    #[test]
    fn test_submit_after_shutdown_hands_task_back() {
        let pool = WorkerPool::new(Recorder::new(), 1, 4).unwrap();
        pool.shutdown();

        let rejected = pool.submit(5).unwrap_err();
        assert_eq!(rejected.task, 5);
        assert!(matches!(rejected.error, WorkerError::ChannelClosed));
        assert_eq!(pool.outstanding(), 0);
        pool.wait();
    }

    #[test]
    fn test_full_queue_hands_task_back() {
        let recorder = Recorder::new();
        let pool = WorkerPool::new(Arc::clone(&recorder), 1, 1).unwrap();

        // Hold the gate so the single worker blocks on its first task.
        let gate = recorder.gate.lock().unwrap();
        pool.submit(1).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        // Wait until the worker has taken task 1 off the queue.
        while pool.task_sender.len() > 0 {
            assert!(Instant::now() < deadline, "worker never picked up the task");
            thread::sleep(Duration::from_millis(5));
        }
        pool.submit(2).unwrap();

        let rejected = pool.submit(3).unwrap_err();
        assert_eq!(rejected.task, 3);
        assert!(matches!(rejected.error, WorkerError::QueueFull));

        drop(gate);
        wait_until_idle(&pool);
        assert_eq!(*recorder.seen.lock().unwrap(), vec![1, 2]);
        pool.wait();
    }

    #[test]
    fn test_queued_tasks_finish_after_shutdown() {
        let recorder = Recorder::new();
        let pool = WorkerPool::new(Arc::clone(&recorder), 1, 8).unwrap();

        let gate = recorder.gate.lock().unwrap();
        for i in 0..4 {
            pool.submit(i).unwrap();
        }
        pool.shutdown();
        drop(gate);
        pool.wait();

        assert_eq!(recorder.seen.lock().unwrap().len(), 4);
    }
}
