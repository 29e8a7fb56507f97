//! Fixed-size pool for running blocking jobs to completion.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::sync::Semaphore;

use crate::plugins::PluginError;

/// Twice the available parallelism, falling back to 2.
pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get() * 2)
        .unwrap_or(2)
}

/// Fails when called from a thread that is driving an async runtime.
pub(crate) fn ensure_blocking_context() -> Result<(), PluginError> {
    if Handle::try_current().is_ok() {
        return Err(PluginError::AsyncContext);
    }
    Ok(())
}

/// How a single job settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome<T> {
    Completed(T),
    Panicked(String),
    /// Ran longer than the timeout. The job keeps its thread until it
    /// returns; nothing interrupts it.
    TimedOut,
}

impl<T> JobOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }
}

/// Runs jobs on at most `size` threads of a dedicated runtime. Jobs beyond
/// that wait in the runtime's queue.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    size: usize,
}

impl WorkerPool {
    pub fn new(size: usize) -> Result<Self, PluginError> {
        let size = size.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(size)
            .thread_name("plugin-worker")
            .enable_time()
            .build()
            .map_err(|e| PluginError::WorkerPool(e.to_string()))?;
        Ok(Self {
            runtime: Some(runtime),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Runs every job and blocks until all have settled.
    ///
    /// At most `size` jobs run at once. The timeout for a job starts when it
    /// gets a thread, not when it is queued. `on_settled` is called on the
    /// calling thread with the job's index as each one settles. The returned
    /// outcomes are in job order. A job that panics or times out never
    /// cancels the others.
    pub fn run_all<T, F, S>(
        &self,
        jobs: Vec<F>,
        timeout: Option<Duration>,
        mut on_settled: S,
    ) -> Result<Vec<JobOutcome<T>>, PluginError>
    where
        T: Send + 'static,
        F: FnOnce() -> T + Send + 'static,
        S: FnMut(usize, &JobOutcome<T>),
    {
        ensure_blocking_context()?;
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| PluginError::WorkerPool("worker pool is shut down".into()))?;

        let count = jobs.len();
        let permits = Arc::new(Semaphore::new(self.size));
        let outcomes = runtime.block_on(async {
            let mut pending: FuturesUnordered<_> = jobs
                .into_iter()
                .enumerate()
                .map(|(index, job)| {
                    let permits = Arc::clone(&permits);
                    async move { (index, run_job(job, permits, timeout).await) }
                })
                .collect();

            let mut outcomes: Vec<Option<JobOutcome<T>>> = (0..count).map(|_| None).collect();
            while let Some((index, outcome)) = pending.next().await {
                on_settled(index, &outcome);
                outcomes[index] = Some(outcome);
            }
            outcomes
        });

        Ok(outcomes
            .into_iter()
            .map(|o| o.unwrap_or(JobOutcome::TimedOut))
            .collect())
    }
}

async fn run_job<T, F>(
    job: F,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
) -> JobOutcome<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    // The permit travels with the job, so a timed-out job keeps its slot
    // until it actually returns.
    let permit = match permits.acquire_owned().await {
        Ok(permit) => permit,
        Err(e) => return JobOutcome::Panicked(e.to_string()),
    };
    let handle = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        job()
    });

    let joined = match timeout {
        Some(limit) => match tokio::time::timeout(limit, handle).await {
            Ok(joined) => joined,
            Err(_) => return JobOutcome::TimedOut,
        },
        None => handle.await,
    };
    match joined {
        Ok(value) => JobOutcome::Completed(value),
        Err(e) if e.is_panic() => JobOutcome::Panicked(panic_message(e.into_panic().as_ref())),
        Err(e) => JobOutcome::Panicked(e.to_string()),
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("size", &self.size)
            .field("running", &self.runtime.is_some())
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    #[test]
    fn test_default_thread_count() {
        assert!(default_thread_count() >= 2);
        assert_eq!(default_thread_count() % 2, 0);
    }

    #[test]
    fn test_run_all_in_order() {
        let pool = WorkerPool::new(2).unwrap();
        let jobs: Vec<_> = (0..5).map(|i| move || i * 10).collect();

        let mut settled = 0;
        let outcomes = pool.run_all(jobs, None, |_, _| settled += 1).unwrap();

        assert_eq!(settled, 5);
        let values: Vec<_> = outcomes
            .into_iter()
            .map(|o| match o {
                JobOutcome::Completed(v) => v,
                other => panic!("unexpected outcome: {other:?}"),
            })
            .collect();
        assert_eq!(values, vec![0, 10, 20, 30, 40]);
    }

    #[test]
    fn test_pool_size_bounds_concurrency() {
        let pool = WorkerPool::new(2).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = (0..6)
            .map(|_| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(30));
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        let outcomes = pool.run_all(jobs, None, |_, _| {}).unwrap();
        assert!(outcomes.iter().all(JobOutcome::is_completed));
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn test_panic_does_not_cancel_siblings() {
        let pool = WorkerPool::new(2).unwrap();
        let jobs: Vec<Box<dyn FnOnce() -> u32 + Send>> = vec![
            Box::new(|| 1),
            Box::new(|| -> u32 { panic!("job failed") }),
            Box::new(|| 3),
        ];

        let outcomes = pool.run_all(jobs, None, |_, _| {}).unwrap();
        assert_eq!(outcomes[0], JobOutcome::Completed(1));
        assert_eq!(outcomes[1], JobOutcome::Panicked("job failed".into()));
        assert_eq!(outcomes[2], JobOutcome::Completed(3));
    }

    #[test]
    fn test_timeout_reports_and_continues() {
        let pool = WorkerPool::new(2).unwrap();
        let jobs: Vec<Box<dyn FnOnce() -> u32 + Send>> = vec![
            Box::new(|| {
                thread::sleep(Duration::from_millis(500));
                1
            }),
            Box::new(|| 2),
        ];

        let mut settled = Vec::new();
        let outcomes = pool
            .run_all(jobs, Some(Duration::from_millis(50)), |i, _| settled.push(i))
            .unwrap();
        assert_eq!(outcomes[0], JobOutcome::TimedOut);
        assert_eq!(outcomes[1], JobOutcome::Completed(2));
        settled.sort();
        assert_eq!(settled, vec![0, 1]);
    }

    #[test]
    fn test_timeout_excludes_queue_time() {
        let pool = WorkerPool::new(1).unwrap();
        let jobs: Vec<_> = (0..3)
            .map(|i| {
                move || {
                    thread::sleep(Duration::from_millis(150));
                    i
                }
            })
            .collect();

        let outcomes = pool
            .run_all(jobs, Some(Duration::from_millis(300)), |_, _| {})
            .unwrap();
        assert_eq!(
            outcomes,
            vec![
                JobOutcome::Completed(0),
                JobOutcome::Completed(1),
                JobOutcome::Completed(2)
            ]
        );
    }

    #[test]
    fn test_timed_out_job_keeps_its_slot() {
        let pool = WorkerPool::new(1).unwrap();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let jobs: Vec<_> = [300u64, 10]
            .into_iter()
            .map(|ms| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                move || {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(ms));
                    active.fetch_sub(1, Ordering::SeqCst);
                }
            })
            .collect();

        let outcomes = pool
            .run_all(jobs, Some(Duration::from_millis(100)), |_, _| {})
            .unwrap();
        assert_eq!(outcomes[0], JobOutcome::TimedOut);
        assert_eq!(outcomes[1], JobOutcome::Completed(()));
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_jobs() {
        let pool = WorkerPool::new(1).unwrap();
        let jobs: Vec<fn()> = Vec::new();
        let outcomes = pool.run_all(jobs, None, |_, _| {}).unwrap();
        assert!(outcomes.is_empty());
    }

    #[tokio::test]
    async fn test_rejects_async_context() {
        let pool = WorkerPool::new(1).unwrap();
        let jobs: Vec<fn()> = vec![(|| ()) as fn()];
        let err = pool.run_all(jobs, None, |_, _| {}).unwrap_err();
        assert!(matches!(err, PluginError::AsyncContext));
        drop(pool);
    }
}
