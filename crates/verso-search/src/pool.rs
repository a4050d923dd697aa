//! Bounded pool for CPU-bound similarity work.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::error::{SearchError, SearchResult};

/// Runs blocking jobs on tokio's blocking threads, at most `workers` at a
/// time.
///
/// A permit is taken before the job is spawned and released when the job
/// finishes, so excess requests wait in the semaphore queue instead of
/// piling onto the blocking thread pool.
#[derive(Debug, Clone)]
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    workers: usize,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` jobs concurrently. Zero is
    /// treated as one.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(workers)),
            workers,
        }
    }

    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Number of permits currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Run `job` on a blocking thread once a permit is free.
    ///
    /// # Errors
    ///
    /// Returns whatever `job` returns, or [`SearchError::Worker`] if the
    /// pool is closed or the job panicked.
    pub async fn run<T, F>(&self, job: F) -> SearchResult<T>
    where
        F: FnOnce() -> SearchResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| SearchError::Worker("worker pool is closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            job()
        })
        .await
        .map_err(|e| SearchError::Worker(format!("query job failed: {e}")))?
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_WORKERS)
    }
}
