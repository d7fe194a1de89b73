//! Tool catalog: name -> (definition, handler), with dispatch.
//!
//! [`ToolRegistry`] maps case-sensitive names to a [`Tool`] definition plus an
//! async [`ToolHandler`]. Lookups run under a read lock; handlers execute
//! after the lock is dropped, so a slow tool never blocks registration or
//! listing.
//!
//! A handler signals a *domain* failure by returning
//! `ToolOutput { is_error: true, .. }`: that is content for the model to see,
//! not an infrastructure fault. Returning `Err` is an infrastructure failure
//! and is wrapped with the tool name.
//!
//! The kernel consumes the registry through the [`ToolExecutor`] seam, so
//! tests can substitute scripted executors.

pub mod builtin;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::message::Tool;

/// Result of one tool execution.
///
/// `is_error` marks a domain failure to be surfaced to the model; transport
/// and dispatch failures are `ToolError` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: false,
        }
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            is_error: true,
        }
    }
}

/// Tool dispatch error.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("tool name must not be empty")]
    EmptyName,

    #[error("tool already registered: {0}")]
    AlreadyExists(String),

    #[error("tool not found: {0}")]
    NotFound(String),

    /// Handler failure, wrapped with the tool name by [`ToolRegistry::execute`].
    #[error("tool {name}: {message}")]
    Execution { name: String, message: String },

    /// Raw failure raised inside a handler before wrapping.
    #[error("{0}")]
    Handler(String),
}

/// Async tool handler: JSON arguments in, [`ToolOutput`] out.
pub type ToolHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<ToolOutput, ToolError>> + Send + Sync>;

/// Wraps an async closure into a [`ToolHandler`].
pub fn tool_fn<F, Fut>(f: F) -> ToolHandler
where
    F: Fn(serde_json::Value) -> Fut + Send + Sync + 'static,
    Fut: std::future::Future<Output = Result<ToolOutput, ToolError>> + Send + 'static,
{
    Arc::new(move |args| Box::pin(f(args)))
}

/// Seam between the kernel and the tool catalog.
///
/// The registry implements this; tests substitute scripted executors.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Definitions advertised to the model.
    async fn catalog(&self) -> Vec<Tool>;

    /// Dispatches one call by name.
    async fn execute(&self, name: &str, arguments: serde_json::Value)
        -> Result<ToolOutput, ToolError>;
}

struct ToolEntry {
    definition: Tool,
    handler: ToolHandler,
}

/// Central name -> (definition, handler) catalog.
pub struct ToolRegistry {
    tools: RwLock<HashMap<String, ToolEntry>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a new tool. Fails on an empty name or an existing one.
    pub async fn register(&self, definition: Tool, handler: ToolHandler) -> Result<(), ToolError> {
        if definition.name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        let mut tools = self.tools.write().await;
        if tools.contains_key(&definition.name) {
            return Err(ToolError::AlreadyExists(definition.name));
        }
        tools.insert(
            definition.name.clone(),
            ToolEntry {
                definition,
                handler,
            },
        );
        Ok(())
    }

    /// Replaces an existing tool. Fails on an empty or unregistered name.
    pub async fn replace(&self, definition: Tool, handler: ToolHandler) -> Result<(), ToolError> {
        if definition.name.is_empty() {
            return Err(ToolError::EmptyName);
        }
        let mut tools = self.tools.write().await;
        if !tools.contains_key(&definition.name) {
            return Err(ToolError::NotFound(definition.name));
        }
        tools.insert(
            definition.name.clone(),
            ToolEntry {
                definition,
                handler,
            },
        );
        Ok(())
    }

    /// Returns the definition registered under `name`.
    pub async fn get(&self, name: &str) -> Result<Tool, ToolError> {
        let tools = self.tools.read().await;
        tools
            .get(name)
            .map(|entry| entry.definition.clone())
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    /// Snapshot of all definitions, in unspecified order.
    pub async fn list(&self) -> Vec<Tool> {
        let tools = self.tools.read().await;
        tools.values().map(|entry| entry.definition.clone()).collect()
    }

    /// Number of registered tools.
    pub async fn len(&self) -> usize {
        self.tools.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tools.read().await.is_empty()
    }

    /// Looks up `name` under the read lock, then runs the handler with the
    /// lock released. Handler errors come back wrapped with the tool name.
    pub async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        let handler = {
            let tools = self.tools.read().await;
            let entry = tools
                .get(name)
                .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
            Arc::clone(&entry.handler)
        };
        handler(arguments).await.map_err(|e| ToolError::Execution {
            name: name.to_string(),
            message: e.to_string(),
        })
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn catalog(&self) -> Vec<Tool> {
        self.list().await
    }

    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolOutput, ToolError> {
        ToolRegistry::execute(self, name, arguments).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn echo_handler() -> ToolHandler {
        tool_fn(|args| async move { Ok(ToolOutput::ok(args.to_string())) })
    }

    /// **Scenario**: register twice under one name fails with AlreadyExists;
    /// replace on an absent name fails with NotFound.
    #[tokio::test]
    async fn uniqueness_and_replace_discipline() {
        let registry = ToolRegistry::new();
        registry
            .register(Tool::new("echo"), echo_handler())
            .await
            .unwrap();

        let err = registry
            .register(Tool::new("echo"), echo_handler())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::AlreadyExists(name) if name == "echo"));

        let err = registry
            .replace(Tool::new("missing"), echo_handler())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(name) if name == "missing"));
    }

    /// **Scenario**: empty names are rejected by both register and replace.
    #[tokio::test]
    async fn empty_names_rejected() {
        let registry = ToolRegistry::new();
        assert!(matches!(
            registry.register(Tool::new(""), echo_handler()).await,
            Err(ToolError::EmptyName)
        ));
        assert!(matches!(
            registry.replace(Tool::new(""), echo_handler()).await,
            Err(ToolError::EmptyName)
        ));
    }

    /// **Scenario**: replace swaps the handler for subsequent executes.
    #[tokio::test]
    async fn replace_swaps_handler() {
        let registry = ToolRegistry::new();
        registry
            .register(Tool::new("t"), tool_fn(|_| async { Ok(ToolOutput::ok("old")) }))
            .await
            .unwrap();
        registry
            .replace(Tool::new("t"), tool_fn(|_| async { Ok(ToolOutput::ok("new")) }))
            .await
            .unwrap();

        let output = registry.execute("t", json!({})).await.unwrap();
        assert_eq!(output.content, "new");
    }

    /// **Scenario**: execute wraps a handler error with the tool name; a
    /// domain failure comes back as Ok with is_error set.
    #[tokio::test]
    async fn execute_wraps_infrastructure_and_passes_domain_errors() {
        let registry = ToolRegistry::new();
        registry
            .register(
                Tool::new("broken"),
                tool_fn(|_| async { Err(ToolError::Handler("tool broke".into())) }),
            )
            .await
            .unwrap();
        registry
            .register(
                Tool::new("domain"),
                tool_fn(|_| async { Ok(ToolOutput::error("bad input")) }),
            )
            .await
            .unwrap();

        let err = registry.execute("broken", json!({})).await.unwrap_err();
        assert_eq!(err.to_string(), "tool broken: tool broke");

        let output = registry.execute("domain", json!({})).await.unwrap();
        assert!(output.is_error);
        assert_eq!(output.content, "bad input");
    }

    /// **Scenario**: names are case-sensitive; list returns a snapshot of all
    /// definitions.
    #[tokio::test]
    async fn case_sensitive_names_and_list_snapshot() {
        let registry = ToolRegistry::new();
        registry
            .register(Tool::new("Echo"), echo_handler())
            .await
            .unwrap();
        registry
            .register(Tool::new("echo"), echo_handler())
            .await
            .unwrap();

        assert!(matches!(
            registry.execute("ECHO", json!({})).await,
            Err(ToolError::NotFound(_))
        ));
        let mut names: Vec<String> =
            registry.list().await.into_iter().map(|t| t.name).collect();
        names.sort();
        assert_eq!(names, ["Echo", "echo"]);
    }
}
