pub mod pool;

pub use pool::{Rejected, TaskRunner, WorkerPool};
