//! Explicitly sized worker pool shared by one run.

use rayon::{Scope, ThreadPool, ThreadPoolBuilder};

use crate::error::AppError;

/// Owns a dedicated rayon pool; the global rayon pool is never configured.
pub struct WorkerPool {
    pool: ThreadPool,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Result<Self, AppError> {
        if workers == 0 {
            return Err(AppError::config("Worker count must be >= 1."));
        }
        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("cyclefit-worker-{i}"))
            .build()
            .map_err(|e| AppError::config(format!("Failed to start worker pool: {e}")))?;
        tracing::debug!(workers, "worker pool started");
        Ok(Self { pool })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Run `op` with a scope whose spawned tasks all finish before this returns.
    pub(crate) fn scope<'scope, OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce(&Scope<'scope>) -> R + Send,
        R: Send,
    {
        self.pool.scope(op)
    }

    /// Stop the worker threads.
    pub fn shutdown(self) {
        tracing::debug!(workers = self.workers(), "worker pool shut down");
        drop(self.pool);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers())
            .finish()
    }
}
