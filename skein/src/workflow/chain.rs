//! Sequential composition of steps over one state type.
//!
//! Each step is `(token, state) -> state'`; the chain threads the state
//! through every step in order and aborts on the first error, naming the
//! failed step.

use std::sync::Arc;

use futures::future::BoxFuture;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::observer::{Event, Level, NullObserver, Observer};

use super::WorkflowError;

/// One chain step.
pub type ChainStep<S> =
    Arc<dyn Fn(CancellationToken, S) -> BoxFuture<'static, Result<S, WorkflowError>> + Send + Sync>;

/// Chain failure, naming the step that aborted the run.
#[derive(Debug, Error)]
#[error("step {step}: {source}")]
pub struct ChainError {
    pub step: String,
    #[source]
    pub source: WorkflowError,
}

/// Sequential step pipeline.
///
/// Events: `chain.start`, `step.start`/`step.complete` per step,
/// `chain.complete`.
pub struct Chain<S> {
    name: String,
    steps: Vec<(String, ChainStep<S>)>,
    observer: Arc<dyn Observer>,
}

impl<S: Send + 'static> Chain<S> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            observer: Arc::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Appends a named step; chainable.
    pub fn step<F, Fut>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken, S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<S, WorkflowError>> + Send + 'static,
    {
        self.steps
            .push((name.into(), Arc::new(move |token, state| Box::pin(f(token, state)))));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Runs every step in order; aborts on the first error.
    pub async fn run(&self, token: &CancellationToken, state: S) -> Result<S, ChainError> {
        self.observer.observe(
            &Event::new("chain.start", Level::Info, "workflow.chain")
                .with("chain", self.name.clone())
                .with("steps", self.steps.len()),
        );

        let mut state = state;
        for (name, step) in &self.steps {
            if token.is_cancelled() {
                return Err(ChainError {
                    step: name.clone(),
                    source: WorkflowError::Cancelled,
                });
            }
            self.observer.observe(
                &Event::new("step.start", Level::Info, "workflow.chain")
                    .with("step", name.clone()),
            );
            state = step(token.clone(), state).await.map_err(|source| ChainError {
                step: name.clone(),
                source,
            })?;
            self.observer.observe(
                &Event::new("step.complete", Level::Info, "workflow.chain")
                    .with("step", name.clone()),
            );
        }

        self.observer.observe(
            &Event::new("chain.complete", Level::Info, "workflow.chain")
                .with("chain", self.name.clone()),
        );
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: steps run in order, each seeing the previous step's
    /// output.
    #[tokio::test]
    async fn steps_thread_state_in_order() {
        let chain: Chain<Vec<&'static str>> = Chain::new("pipeline")
            .step("first", |_, mut s: Vec<&'static str>| async move {
                s.push("first");
                Ok(s)
            })
            .step("second", |_, mut s: Vec<&'static str>| async move {
                s.push("second");
                Ok(s)
            });

        let token = CancellationToken::new();
        let out = chain.run(&token, Vec::new()).await.unwrap();
        assert_eq!(out, ["first", "second"]);
    }

    /// **Scenario**: the first failing step aborts the chain; later steps do
    /// not run and the error names the step.
    #[tokio::test]
    async fn aborts_on_first_error() {
        let chain: Chain<u32> = Chain::new("pipeline")
            .step("ok", |_, s: u32| async move { Ok(s + 1) })
            .step("boom", |_, _s: u32| async move {
                Err(WorkflowError::failed("exploded"))
            })
            .step("never", |_, s: u32| async move { Ok(s + 100) });

        let token = CancellationToken::new();
        let err = chain.run(&token, 0).await.unwrap_err();
        assert_eq!(err.step, "boom");
        assert_eq!(err.source, WorkflowError::failed("exploded"));
    }

    /// **Scenario**: a cancelled token stops the chain before the next step.
    #[tokio::test]
    async fn cancellation_stops_between_steps() {
        let token = CancellationToken::new();
        let chain: Chain<u32> = Chain::new("pipeline")
            .step("cancel", {
                let token = token.clone();
                move |_, s: u32| {
                    let token = token.clone();
                    async move {
                        token.cancel();
                        Ok(s)
                    }
                }
            })
            .step("after", |_, s: u32| async move { Ok(s + 1) });

        let err = chain.run(&token, 0).await.unwrap_err();
        assert_eq!(err.step, "after");
        assert_eq!(err.source, WorkflowError::Cancelled);
    }
}
