//! Structural combinators over agent work: sequential chain, parallel
//! fan-out/fan-in, and conditional routing.
//!
//! All three operate on caller-chosen state/item types and report through the
//! [`Observer`](crate::observer::Observer) capability:
//! `chain.start|complete` and `step.start|complete`;
//! `parallel.start|complete` and `worker.start|complete` (workers at
//! Verbose); `route.evaluate|select|execute`.

mod chain;
mod conditional;
mod parallel;

pub use chain::{Chain, ChainError, ChainStep};
pub use conditional::{Conditional, ConditionalError, PredicateFn, RouteHandler, Routes};
pub use parallel::{
    Parallel, ParallelConfig, ParallelError, ParallelOutcome, ProgressFn, TaskError,
};

use thiserror::Error;

/// Failure inside a step, processor, predicate, or route handler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Failed(String),

    #[error("cancelled")]
    Cancelled,

    /// The predicate chose a route with no handler and no default exists.
    #[error("unknown route: {0}")]
    UnknownRoute(String),
}

impl WorkflowError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
