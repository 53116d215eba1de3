//! Parallel Executor: a bounded worker pool that runs a unit
//! of work across a slice of contexts, plus a shared-state mutation
//! primitive and a progress tick.
//!
//! Scheduling is undefined beyond the bound on concurrency; dispatch and
//! completion order are not guaranteed. A `Semaphore`-bounded `JoinSet`
//! stands in for a thread-pool-backed executor.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, warn};

/// Shared, lock-guarded state updated by concurrent workers. Scoped
/// acquisition releases the lock on every exit path, including panics
/// unwound through `Mutex::lock`.
#[derive(Debug, Clone)]
pub struct SharedState<T>(Arc<Mutex<T>>);

impl<T> SharedState<T> {
    pub fn new(value: T) -> Self {
        Self(Arc::new(Mutex::new(value)))
    }

    /// Acquire the lock, run `f` against the guarded value, release.
    pub async fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.0.lock().await;
        f(&mut guard)
    }

    pub async fn get_cloned(&self) -> T
    where
        T: Clone,
    {
        self.0.lock().await.clone()
    }
}

/// Live progress counter, ticked once per completed unit of work.
#[derive(Debug, Clone, Default)]
pub struct ProgressTicker(Arc<AtomicUsize>);

impl ProgressTicker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Bounded worker pool. Sized to CPU count unless overridden.
#[derive(Debug, Clone)]
pub struct Executor {
    worker_count: usize,
}

impl Executor {
    pub fn new(worker_count: Option<usize>) -> Self {
        Self {
            worker_count: worker_count.unwrap_or_else(num_cpus::get).max(1),
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    /// Runs `f(ctx)` for every `ctx` in `contexts`, bounded to
    /// `worker_count` concurrent tasks. Returns results in the same
    /// order as `contexts` (the executor reorders internally but
    /// reassembles before returning, since most callers need to pair a
    /// result back to its originating context).
    ///
    /// A context whose future panics is logged and contributes `None`;
    /// it does not abort the other workers.
    pub async fn run_parallel<C, Fut, R>(
        &self,
        contexts: Vec<C>,
        f: impl Fn(C) -> Fut + Send + Sync + 'static,
    ) -> Vec<Option<R>>
    where
        C: Send + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: Send + 'static,
    {
        let semaphore = Arc::new(Semaphore::new(self.worker_count));
        let f = Arc::new(f);
        let mut join_set = JoinSet::new();

        for (index, ctx) in contexts.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let f = Arc::clone(&f);
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire()
                    .await
                    .expect("executor semaphore is never closed");
                let result = f(ctx).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<R>> = (0..join_set.len()).map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(join_err) => {
                    error!(error = %join_err, "worker task panicked; item dropped");
                    warn!("executor continuing with remaining workers");
                }
            }
        }
        slots
    }
}
