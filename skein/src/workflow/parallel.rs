//! Parallel fan-out over a worker pool, fan-in in input order.
//!
//! Items are tagged with their index and distributed over a bounded work
//! channel; N workers dequeue, run the processor, and push indexed results
//! onto a results channel. The collector partitions results into per-index
//! success and error maps and emits dense, order-preserving slices by walking
//! `0..len(items)`, so output order never depends on scheduling.
//!
//! Error modes: with `fail_fast` the first processor error cancels a derived
//! token that every worker checks between dequeues, aborting siblings
//! promptly. Without it the pool runs to completion and the call succeeds if
//! at least one item did; callers inspect [`ParallelOutcome::errors`] for
//! partial failures.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::observer::{Event, Level, NullObserver, Observer};

use super::WorkflowError;

/// Worker-pool knobs.
#[derive(Debug, Clone)]
pub struct ParallelConfig {
    /// Exact worker count when non-zero; `0` selects the auto formula
    /// `max(1, min(2 x cpus, worker_cap, items))`.
    pub max_workers: usize,
    /// Upper bound for the auto formula.
    pub worker_cap: usize,
    /// Abort siblings on the first processor error.
    pub fail_fast: bool,
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            worker_cap: 8,
            fail_fast: false,
        }
    }
}

/// One failed item: its input position, the item itself, and the error.
#[derive(Debug, Clone)]
pub struct TaskError<T> {
    pub index: usize,
    pub item: T,
    pub error: WorkflowError,
}

/// Fan-in result: successes and failures, each dense and in input order.
#[derive(Debug, Clone)]
pub struct ParallelOutcome<T, R> {
    pub results: Vec<R>,
    pub errors: Vec<TaskError<T>>,
}

/// Aggregated parallel failure. Indices are preserved in `errors`; successes
/// collected before the abort are in `partial`.
#[derive(Debug)]
pub struct ParallelError<T, R> {
    pub errors: Vec<TaskError<T>>,
    pub partial: Vec<R>,
    /// True when the caller's token (not fail-fast) ended the run.
    pub cancelled: bool,
}

impl<T: std::fmt::Debug, R: std::fmt::Debug> std::fmt::Display for ParallelError<T, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.cancelled {
            write!(
                f,
                "parallel execution cancelled ({} results collected)",
                self.partial.len()
            )
        } else {
            write!(f, "parallel execution failed for {} item(s)", self.errors.len())
        }
    }
}

impl<T: std::fmt::Debug, R: std::fmt::Debug> std::error::Error for ParallelError<T, R> {}

/// Success callback: `(completed, total, last_result)`. `completed` comes from
/// an atomic counter, so the numbering is monotonic but not tied to
/// result-slice indices.
pub type ProgressFn<R> = Arc<dyn Fn(usize, usize, &R) + Send + Sync>;

/// Worker-pool runner.
///
/// Events: `parallel.start`, `worker.start`/`worker.complete` per item (at
/// Verbose), `parallel.complete`.
pub struct Parallel {
    config: ParallelConfig,
    observer: Arc<dyn Observer>,
}

impl Parallel {
    pub fn new(config: ParallelConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    fn worker_count(&self, items: usize) -> usize {
        if self.config.max_workers > 0 {
            return self.config.max_workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        (2 * cpus).min(self.config.worker_cap.max(1)).min(items).max(1)
    }

    /// Processes every item through the pool; see the module docs for the
    /// ordering and error contract.
    pub async fn process<T, R, F, Fut>(
        &self,
        token: &CancellationToken,
        items: Vec<T>,
        processor: F,
        progress: Option<ProgressFn<R>>,
    ) -> Result<ParallelOutcome<T, R>, ParallelError<T, R>>
    where
        T: Clone + Send + 'static,
        R: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<R, WorkflowError>> + Send + 'static,
    {
        let total = items.len();
        let workers = self.worker_count(total);
        self.observer.observe(
            &Event::new("parallel.start", Level::Info, "workflow.parallel")
                .with("items", total)
                .with("workers", workers),
        );
        if total == 0 {
            self.observer.observe(
                &Event::new("parallel.complete", Level::Info, "workflow.parallel")
                    .with("results", 0)
                    .with("errors", 0),
            );
            return Ok(ParallelOutcome {
                results: Vec::new(),
                errors: Vec::new(),
            });
        }

        let originals = items.clone();

        // Work channel sized to the item count, so distribution never blocks.
        let (work_tx, work_rx) = mpsc::channel::<(usize, T)>(total);
        for indexed in items.into_iter().enumerate() {
            // Cannot fail: the buffer holds every item.
            let _ = work_tx.try_send(indexed);
        }
        drop(work_tx);
        let work_rx = Arc::new(Mutex::new(work_rx));

        let (result_tx, mut result_rx) = mpsc::channel::<(usize, Result<R, WorkflowError>)>(total);
        let child = token.child_token();
        let processor = Arc::new(processor);
        let completed = Arc::new(AtomicUsize::new(0));
        let fail_fast = self.config.fail_fast;

        for _ in 0..workers {
            let work_rx = Arc::clone(&work_rx);
            let result_tx = result_tx.clone();
            let child = child.clone();
            let processor = Arc::clone(&processor);
            let completed = Arc::clone(&completed);
            let progress = progress.clone();
            let observer = Arc::clone(&self.observer);
            tokio::spawn(async move {
                loop {
                    // Checked between dequeues: in-flight items finish, queued
                    // ones are abandoned after an abort.
                    if child.is_cancelled() {
                        break;
                    }
                    let next = {
                        let mut rx = work_rx.lock().await;
                        rx.recv().await
                    };
                    let Some((index, item)) = next else {
                        break;
                    };
                    observer.observe(
                        &Event::new("worker.start", Level::Verbose, "workflow.parallel")
                            .with("index", index),
                    );
                    match processor(item).await {
                        Ok(result) => {
                            let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                            if let Some(progress) = &progress {
                                progress(done, total, &result);
                            }
                            observer.observe(
                                &Event::new("worker.complete", Level::Verbose, "workflow.parallel")
                                    .with("index", index)
                                    .with("ok", true),
                            );
                            let _ = result_tx.send((index, Ok(result))).await;
                        }
                        Err(error) => {
                            observer.observe(
                                &Event::new("worker.complete", Level::Verbose, "workflow.parallel")
                                    .with("index", index)
                                    .with("ok", false),
                            );
                            if fail_fast {
                                child.cancel();
                            }
                            let _ = result_tx.send((index, Err(error))).await;
                        }
                    }
                }
            });
        }
        drop(result_tx);

        // Collector: drain until every worker has exited, then partition by
        // index.
        let mut successes: BTreeMap<usize, R> = BTreeMap::new();
        let mut failures: BTreeMap<usize, WorkflowError> = BTreeMap::new();
        while let Some((index, result)) = result_rx.recv().await {
            match result {
                Ok(value) => {
                    successes.insert(index, value);
                }
                Err(error) => {
                    failures.insert(index, error);
                }
            }
        }

        let mut results = Vec::with_capacity(successes.len());
        let mut errors = Vec::with_capacity(failures.len());
        for index in 0..total {
            if let Some(value) = successes.remove(&index) {
                results.push(value);
            } else if let Some(error) = failures.remove(&index) {
                errors.push(TaskError {
                    index,
                    item: originals[index].clone(),
                    error,
                });
            }
        }

        self.observer.observe(
            &Event::new("parallel.complete", Level::Info, "workflow.parallel")
                .with("results", results.len())
                .with("errors", errors.len()),
        );

        if token.is_cancelled() {
            return Err(ParallelError {
                errors,
                partial: results,
                cancelled: true,
            });
        }
        if self.config.fail_fast && !errors.is_empty() {
            return Err(ParallelError {
                errors,
                partial: results,
                cancelled: false,
            });
        }
        if results.is_empty() && !errors.is_empty() {
            return Err(ParallelError {
                errors,
                partial: results,
                cancelled: false,
            });
        }
        Ok(ParallelOutcome { results, errors })
    }
}
