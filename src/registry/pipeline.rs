//! Bounded download pipeline
//!
//! Runs one tokio task per item with at most `max_concurrent` holding a semaphore
//! permit at any time. Each task reports `(index, result)` on a channel; the pipeline
//! waits for every report and surfaces the error of the lowest failing index.
//! A failure never cancels the sibling tasks.

use crate::error::{RegistryError, Result};
use crate::logging::Logger;
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Semaphore, mpsc};

/// Pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrent: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: crate::config::DEFAULT_CONCURRENCY,
        }
    }
}

/// Work item that knows its position in the layer chain
pub trait IndexedTask: Send + 'static {
    fn index(&self) -> usize;
}

/// Summary of a completed run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub dispatched: usize,
    pub succeeded: usize,
}

#[derive(Clone)]
pub struct DownloadPipeline {
    config: PipelineConfig,
    output: Logger,
}

impl DownloadPipeline {
    pub fn new(output: Logger) -> Self {
        Self {
            config: PipelineConfig::default(),
            output,
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Run `worker` over every task and wait until all of them have reported
    pub async fn execute<T, F, Fut>(&self, tasks: Vec<T>, worker: F) -> Result<PipelineStats>
    where
        T: IndexedTask,
        F: Fn(T) -> Fut + Clone + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let dispatched = tasks.len();
        if dispatched == 0 {
            return Ok(PipelineStats::default());
        }

        let permits = self.config.max_concurrent.max(1);
        self.output.detail(&format!(
            "Dispatching {} tasks with {} concurrent slots",
            dispatched, permits
        ));

        let semaphore = Arc::new(Semaphore::new(permits));
        let (tx, mut rx) = mpsc::channel::<(usize, Result<()>)>(dispatched);
        let mut pending: BTreeSet<usize> = BTreeSet::new();

        for task in tasks {
            let index = task.index();
            pending.insert(index);
            let semaphore = Arc::clone(&semaphore);
            let tx = tx.clone();
            let worker = worker.clone();

            tokio::spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => worker(task).await,
                    Err(e) => Err(RegistryError::Io(format!(
                        "Download slot unavailable: {}",
                        e
                    ))),
                };
                let _ = tx.send((index, result)).await;
            });
        }
        drop(tx);

        let mut errors: BTreeMap<usize, RegistryError> = BTreeMap::new();
        let mut succeeded = 0;
        while !pending.is_empty() {
            let Some((index, result)) = rx.recv().await else {
                break;
            };
            pending.remove(&index);
            match result {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    self.output.error(&e.to_string());
                    errors.insert(index, e);
                }
            }
        }

        // A task that panicked drops its sender without reporting.
        for index in pending {
            errors.insert(
                index,
                RegistryError::Io(format!("Task {} ended without reporting", index + 1)),
            );
        }

        match errors.into_iter().next() {
            Some((_, first)) => Err(first),
            None => Ok(PipelineStats {
                dispatched,
                succeeded,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    struct Job {
        index: usize,
        fail: bool,
        delay_ms: u64,
    }

    impl IndexedTask for Job {
        fn index(&self) -> usize {
            self.index
        }
    }

    fn jobs(count: usize, failing: &[usize]) -> Vec<Job> {
        (0..count)
            .map(|index| Job {
                index,
                fail: failing.contains(&index),
                delay_ms: 5 * (count - index) as u64,
            })
            .collect()
    }

    async fn run_job(job: Job) -> Result<()> {
        tokio::time::sleep(Duration::from_millis(job.delay_ms)).await;
        if job.fail {
            Err(RegistryError::LayerDownload {
                index: job.index,
                digest: format!("sha256:{}", job.index),
                message: "HTTP 500".to_string(),
            })
        } else {
            Ok(())
        }
    }

    #[tokio::test]
    async fn all_tasks_succeed() {
        let pipeline = DownloadPipeline::new(Logger::default())
            .with_config(PipelineConfig { max_concurrent: 3 });
        let stats = pipeline.execute(jobs(5, &[]), run_job).await.unwrap();
        assert_eq!(
            stats,
            PipelineStats {
                dispatched: 5,
                succeeded: 5
            }
        );
    }

    #[tokio::test]
    async fn lowest_failing_index_is_reported() {
        let pipeline = DownloadPipeline::new(Logger::default())
            .with_config(PipelineConfig { max_concurrent: 5 });
        // Higher indices finish first because of their shorter delays.
        let err = pipeline
            .execute(jobs(5, &[1, 3]), run_job)
            .await
            .unwrap_err();
        match err {
            RegistryError::LayerDownload { index, .. } => assert_eq!(index, 1),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn failure_does_not_cancel_siblings() {
        let finished = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&finished);
        let pipeline = DownloadPipeline::new(Logger::default())
            .with_config(PipelineConfig { max_concurrent: 2 });

        let result = pipeline
            .execute(jobs(4, &[0]), move |job| {
                let counter = Arc::clone(&counter);
                async move {
                    let result = run_job(job).await;
                    counter.fetch_add(1, Ordering::SeqCst);
                    result
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(finished.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn in_flight_never_exceeds_the_bound() {
        for bound in [1usize, 2, 3] {
            let in_flight = Arc::new(AtomicUsize::new(0));
            let peak = Arc::new(AtomicUsize::new(0));
            let (current, max) = (Arc::clone(&in_flight), Arc::clone(&peak));

            DownloadPipeline::new(Logger::default())
                .with_config(PipelineConfig { max_concurrent: bound })
                .execute(jobs(6, &[]), move |job| {
                    let current = Arc::clone(&current);
                    let max = Arc::clone(&max);
                    async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        max.fetch_max(now, Ordering::SeqCst);
                        let result = run_job(job).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        result
                    }
                })
                .await
                .unwrap();

            assert!(peak.load(Ordering::SeqCst) <= bound);
            assert_eq!(in_flight.load(Ordering::SeqCst), 0);
        }
    }

    #[tokio::test]
    async fn empty_input_is_a_no_op() {
        let stats = DownloadPipeline::new(Logger::default())
            .execute(Vec::<Job>::new(), run_job)
            .await
            .unwrap();
        assert_eq!(stats.dispatched, 0);
    }
}
