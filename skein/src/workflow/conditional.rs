//! Conditional routing: a predicate picks a labelled branch.
//!
//! The predicate maps state to a route key; a matching handler in
//! [`Routes::route`] runs, else the default, else the call fails with an
//! unknown route. Every failure wraps the chosen route key and the state the
//! failure happened on.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::observer::{Event, Level, NullObserver, Observer};

use super::WorkflowError;

/// One route handler: `(token, state) -> state'`.
pub type RouteHandler<S> =
    Arc<dyn Fn(CancellationToken, S) -> BoxFuture<'static, Result<S, WorkflowError>> + Send + Sync>;

/// Predicate: maps state to a route key.
pub type PredicateFn<S> = Arc<dyn Fn(&S) -> Result<String, WorkflowError> + Send + Sync>;

/// Route table plus optional default branch.
pub struct Routes<S> {
    handlers: HashMap<String, RouteHandler<S>>,
    default: Option<RouteHandler<S>>,
}

impl<S: Send + 'static> Routes<S> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            default: None,
        }
    }

    /// Adds a labelled branch; chainable.
    pub fn route<F, Fut>(mut self, key: impl Into<String>, f: F) -> Self
    where
        F: Fn(CancellationToken, S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<S, WorkflowError>> + Send + 'static,
    {
        self.handlers
            .insert(key.into(), Arc::new(move |token, state| Box::pin(f(token, state))));
        self
    }

    /// Branch taken when no key matches; chainable.
    pub fn default_route<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(CancellationToken, S) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<S, WorkflowError>> + Send + 'static,
    {
        self.default = Some(Arc::new(move |token, state| Box::pin(f(token, state))));
        self
    }
}

impl<S: Send + 'static> Default for Routes<S> {
    fn default() -> Self {
        Self::new()
    }
}

/// Conditional failure: the route key in play, the state it failed on, and
/// the underlying error.
#[derive(Debug)]
pub struct ConditionalError<S> {
    pub route: String,
    pub state: S,
    pub error: WorkflowError,
}

impl<S: std::fmt::Debug> std::fmt::Display for ConditionalError<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "route {}: {}", self.route, self.error)
    }
}

impl<S: std::fmt::Debug> std::error::Error for ConditionalError<S> {}

/// Conditional runner.
///
/// Events: `route.evaluate`, `route.select`, `route.execute`.
pub struct Conditional {
    observer: Arc<dyn Observer>,
}

impl Conditional {
    pub fn new() -> Self {
        Self {
            observer: Arc::new(NullObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Evaluates the predicate, selects the branch, and runs it.
    pub async fn process<S>(
        &self,
        token: &CancellationToken,
        state: S,
        predicate: PredicateFn<S>,
        routes: &Routes<S>,
    ) -> Result<S, ConditionalError<S>>
    where
        S: Clone + Send + 'static,
    {
        self.observer
            .observe(&Event::new("route.evaluate", Level::Info, "workflow.route"));
        let key = match predicate(&state) {
            Ok(key) => key,
            Err(error) => {
                return Err(ConditionalError {
                    route: String::new(),
                    state,
                    error,
                })
            }
        };
        self.observer.observe(
            &Event::new("route.select", Level::Info, "workflow.route")
                .with("route", key.clone()),
        );

        let handler = match routes.handlers.get(&key).or(routes.default.as_ref()) {
            Some(handler) => Arc::clone(handler),
            None => {
                return Err(ConditionalError {
                    route: key.clone(),
                    state,
                    error: WorkflowError::UnknownRoute(key),
                })
            }
        };

        self.observer.observe(
            &Event::new("route.execute", Level::Info, "workflow.route")
                .with("route", key.clone()),
        );
        let before = state.clone();
        handler(token.clone(), state)
            .await
            .map_err(|error| ConditionalError {
                route: key,
                state: before,
                error,
            })
    }
}

impl Default for Conditional {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn length_predicate() -> PredicateFn<String> {
        Arc::new(|s: &String| {
            Ok(if s.len() > 5 { "long" } else { "short" }.to_string())
        })
    }

    /// **Scenario**: the predicate's key selects the matching branch.
    #[tokio::test]
    async fn matching_route_runs() {
        let routes = Routes::new()
            .route("short", |_, s: String| async move { Ok(format!("s:{s}")) })
            .route("long", |_, s: String| async move { Ok(format!("l:{s}")) });

        let token = CancellationToken::new();
        let out = Conditional::new()
            .process(&token, "hi".to_string(), length_predicate(), &routes)
            .await
            .unwrap();
        assert_eq!(out, "s:hi");

        let out = Conditional::new()
            .process(&token, "hello world".to_string(), length_predicate(), &routes)
            .await
            .unwrap();
        assert_eq!(out, "l:hello world");
    }

    /// **Scenario**: an unmatched key falls back to the default branch.
    #[tokio::test]
    async fn unmatched_key_uses_default() {
        let routes = Routes::new()
            .route("known", |_, s: String| async move { Ok(s) })
            .default_route(|_, _s: String| async move { Ok("default".to_string()) });
        let predicate: PredicateFn<String> = Arc::new(|_| Ok("mystery".to_string()));

        let token = CancellationToken::new();
        let out = Conditional::new()
            .process(&token, "x".to_string(), predicate, &routes)
            .await
            .unwrap();
        assert_eq!(out, "default");
    }

    /// **Scenario**: no match and no default fails with UnknownRoute carrying
    /// the key and state.
    #[tokio::test]
    async fn unknown_route_fails() {
        let routes: Routes<String> =
            Routes::new().route("known", |_, s: String| async move { Ok(s) });
        let predicate: PredicateFn<String> = Arc::new(|_| Ok("mystery".to_string()));

        let token = CancellationToken::new();
        let err = Conditional::new()
            .process(&token, "x".to_string(), predicate, &routes)
            .await
            .unwrap_err();
        assert_eq!(err.route, "mystery");
        assert_eq!(err.state, "x");
        assert_eq!(err.error, WorkflowError::UnknownRoute("mystery".to_string()));
    }

    /// **Scenario**: predicate and handler failures both wrap as
    /// ConditionalError with the route key (empty for predicate failures).
    #[tokio::test]
    async fn failures_wrap_route_and_state() {
        let token = CancellationToken::new();

        let routes: Routes<String> = Routes::new();
        let bad_predicate: PredicateFn<String> =
            Arc::new(|_| Err(WorkflowError::failed("cannot decide")));
        let err = Conditional::new()
            .process(&token, "x".to_string(), bad_predicate, &routes)
            .await
            .unwrap_err();
        assert_eq!(err.route, "");
        assert_eq!(err.error, WorkflowError::failed("cannot decide"));

        let routes = Routes::new().route("boom", |_, _s: String| async move {
            Err(WorkflowError::failed("handler died"))
        });
        let predicate: PredicateFn<String> = Arc::new(|_| Ok("boom".to_string()));
        let err = Conditional::new()
            .process(&token, "x".to_string(), predicate, &routes)
            .await
            .unwrap_err();
        assert_eq!(err.route, "boom");
        assert_eq!(err.error, WorkflowError::failed("handler died"));
    }
}
