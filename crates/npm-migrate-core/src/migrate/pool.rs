//! Bounded I/O pool.
//!
//! One semaphore admits every registry call, file write and archive
//! transform of a run. Only leaf operations hold a permit; package and
//! version pipelines await their steps without one, so work submitted from
//! inside other work can always make progress.

use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;

/// Shared concurrency limit for a migration run.
#[derive(Debug, Clone)]
pub struct IoPool {
    permits: Arc<Semaphore>,
    capacity: usize,
}

impl IoPool {
    /// Create a pool admitting `capacity` concurrent operations (at least 1).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Run `op` once a slot is free, holding the slot until it finishes.
    pub async fn run<F, T>(&self, op: F) -> T
    where
        F: Future<Output = T>,
    {
        // The semaphore is never closed, so acquire cannot fail.
        let _permit = self.permits.acquire().await.ok();
        op.await
    }

    /// Run blocking work on the blocking thread pool, holding a slot.
    ///
    /// # Panics
    /// Re-raises a panic from `f`.
    pub async fn run_blocking<F, T>(&self, f: F) -> T
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.permits.acquire().await.ok();
        match tokio::task::spawn_blocking(f).await {
            Ok(value) => value,
            Err(e) => std::panic::resume_unwind(e.into_panic()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn test_capacity_minimum_one() {
        assert_eq!(IoPool::new(0).capacity(), 1);
        assert_eq!(IoPool::new(4).capacity(), 4);
    }

    #[tokio::test]
    async fn test_run_respects_capacity() {
        let pool = IoPool::new(3);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks = (0..20).map(|_| {
            let pool = pool.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            async move {
                pool.run(async {
                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
            }
        });
        futures::future::join_all(tasks).await;

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_nested_work_with_capacity_one() {
        // An outer pipeline that awaits inner pool work must not deadlock.
        let pool = IoPool::new(1);
        let outer = async {
            let a = pool.run(async { 1 }).await;
            let inner = futures::future::join_all((0..3).map(|i| pool.run(async move { i })));
            a + inner.await.into_iter().sum::<i32>()
        };
        assert_eq!(outer.await, 4);
    }

    #[tokio::test]
    async fn test_run_blocking_returns_value() {
        let pool = IoPool::new(1);
        let value = pool.run_blocking(|| 6 * 7).await;
        assert_eq!(value, 42);
    }
}
