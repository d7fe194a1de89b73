//! The agentic execution loop: observe, think, act, repeat.
//!
//! One [`Kernel::run`] drives one prompt to completion: the prompt is appended
//! to the session, system content is assembled (configured system prompt plus
//! any memory entries, blank-line separated), and the loop calls the agent's
//! tools protocol until it answers without tool calls or the iteration budget
//! runs out. Tool calls within an iteration execute sequentially, in the order
//! the model returned them, and every result lands in the session before the
//! next model call so the model sees a coherent tool-use history.
//!
//! Failure discipline: tool *infrastructure* errors become a tool message
//! `error: <msg>` with `is_error = true` and the loop continues; tool *domain*
//! errors (handler said `is_error`) are appended unchanged. Memory errors and
//! empty agent responses are fatal for the run. `MaxIterations` and
//! cancellation carry the partial result alongside the error.
//!
//! Events: `kernel.run.start`, `kernel.iteration.start`, `kernel.tool.call`,
//! `kernel.tool.complete`, `kernel.response`, `kernel.error`,
//! `kernel.run.complete`.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::llm::{Agent, AgentError};
use crate::memory::{MemoryError, MemoryStore};
use crate::message::{Message, ToolCall};
use crate::observer::{Event, Level, NullObserver, Observer};
use crate::session::Session;
use crate::tools::ToolExecutor;

/// Per-kernel configuration.
#[derive(Debug, Clone)]
pub struct KernelConfig {
    /// Iteration budget; `0` means unbounded (stop only on a final response
    /// or cancellation).
    pub max_iterations: u32,
    /// Base system prompt; memory entries are appended after it.
    pub system_prompt: Option<String>,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            max_iterations: 10,
            system_prompt: None,
        }
    }
}

/// One executed tool call, as recorded by the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRecord {
    pub call: ToolCall,
    /// Iteration index the call ran in.
    pub iteration: u32,
    /// Tool message content (the output, or `error: <msg>`).
    pub result: String,
    pub is_error: bool,
}

/// Outcome of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    /// Final assistant content. Empty when the run did not complete.
    pub response: String,
    /// Iterations executed (the final, responding iteration included).
    pub iterations: u32,
    pub tool_calls: Vec<ToolCallRecord>,
}

/// Run error. Budget exhaustion and cancellation carry the partial result.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("agent returned an empty response")]
    EmptyResponse,

    #[error("memory: {0}")]
    Memory(#[from] MemoryError),

    #[error("agent: {0}")]
    Agent(AgentError),

    #[error("iteration budget exhausted")]
    MaxIterations { partial: RunResult },

    #[error("run cancelled")]
    Cancelled { partial: RunResult },
}

/// The per-prompt execution loop.
///
/// Owns its session; holds the agent, tool executor, optional memory store,
/// and observer as capabilities.
pub struct Kernel {
    session: Arc<Session>,
    agent: Arc<dyn Agent>,
    tools: Arc<dyn ToolExecutor>,
    memory: Option<Arc<dyn MemoryStore>>,
    observer: Arc<dyn Observer>,
    config: KernelConfig,
}

impl Kernel {
    pub fn new(agent: Arc<dyn Agent>, tools: Arc<dyn ToolExecutor>) -> Self {
        Self {
            session: Arc::new(Session::new()),
            agent,
            tools,
            memory: None,
            observer: Arc::new(NullObserver),
            config: KernelConfig::default(),
        }
    }

    pub fn with_session(mut self, session: Arc<Session>) -> Self {
        self.session = session;
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryStore>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// The session this kernel appends to.
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Runs one prompt to completion.
    pub async fn run(
        &self,
        token: &CancellationToken,
        prompt: &str,
    ) -> Result<RunResult, KernelError> {
        self.session.add_message(Message::user(prompt));
        let system_content = self.assemble_system_content().await?;
        let catalog = self.tools.catalog().await;

        self.emit(
            Event::new("kernel.run.start", Level::Info, "kernel")
                .with("prompt_len", prompt.len())
                .with("max_iterations", self.config.max_iterations)
                .with("tool_count", catalog.len()),
        );

        let mut records: Vec<ToolCallRecord> = Vec::new();
        let mut iteration: u32 = 0;
        loop {
            if self.config.max_iterations > 0 && iteration == self.config.max_iterations {
                self.emit(
                    Event::new("kernel.error", Level::Error, "kernel")
                        .with("error", "iteration budget exhausted")
                        .with("iterations", iteration),
                );
                return Err(KernelError::MaxIterations {
                    partial: RunResult {
                        response: String::new(),
                        iterations: iteration,
                        tool_calls: records,
                    },
                });
            }
            if token.is_cancelled() {
                return Err(KernelError::Cancelled {
                    partial: RunResult {
                        response: String::new(),
                        iterations: iteration,
                        tool_calls: records,
                    },
                });
            }

            self.emit(
                Event::new("kernel.iteration.start", Level::Verbose, "kernel")
                    .with("iteration", iteration),
            );

            let mut messages = Vec::with_capacity(self.session.len() + 1);
            if let Some(system) = &system_content {
                messages.push(Message::system(system.clone()));
            }
            messages.extend(self.session.messages());

            let response = self
                .agent
                .tools(&messages, &catalog, None)
                .await
                .map_err(KernelError::Agent)?;
            let Some(choice) = response.choices.into_iter().next() else {
                self.emit(
                    Event::new("kernel.error", Level::Error, "kernel")
                        .with("error", "empty response"),
                );
                return Err(KernelError::EmptyResponse);
            };

            if choice.message.tool_calls.is_empty() {
                let content = choice.message.content.as_text();
                self.session.add_message(Message::assistant(content.clone()));
                self.emit(
                    Event::new("kernel.response", Level::Info, "kernel")
                        .with("content_len", content.len())
                        .with("iteration", iteration),
                );
                let result = RunResult {
                    response: content,
                    iterations: iteration + 1,
                    tool_calls: records,
                };
                self.emit(
                    Event::new("kernel.run.complete", Level::Info, "kernel")
                        .with("iterations", result.iterations)
                        .with("tool_calls", result.tool_calls.len()),
                );
                return Ok(result);
            }

            let calls = choice.message.tool_calls.clone();
            self.session.add_message(Message::assistant_tool_calls(
                choice.message.content.clone(),
                calls.clone(),
            ));
            for call in calls {
                self.emit(
                    Event::new("kernel.tool.call", Level::Verbose, "kernel")
                        .with("tool", call.name.clone())
                        .with("iteration", iteration),
                );
                debug!(tool = %call.name, args = %call.arguments, "dispatching tool");

                let arguments = parse_arguments(&call.arguments);
                let (result, is_error) = match self.tools.execute(&call.name, arguments).await {
                    Ok(output) => (output.content, output.is_error),
                    Err(e) => {
                        warn!(tool = %call.name, error = %e, "tool call failed");
                        (format!("error: {e}"), true)
                    }
                };

                self.session
                    .add_message(Message::tool(result.clone(), call.id.clone()));
                records.push(ToolCallRecord {
                    call: call.clone(),
                    iteration,
                    result,
                    is_error,
                });
                self.emit(
                    Event::new("kernel.tool.complete", Level::Verbose, "kernel")
                        .with("tool", call.name)
                        .with("is_error", is_error),
                );
            }
            iteration += 1;
        }
    }

    /// System content: the configured prompt, then each memory entry value,
    /// blank-line separated. Any memory failure is fatal for the run.
    async fn assemble_system_content(&self) -> Result<Option<String>, KernelError> {
        let mut content = self.config.system_prompt.clone().unwrap_or_default();
        if let Some(memory) = &self.memory {
            let keys = memory.list().await?;
            let entries = memory.load(&keys).await?;
            for entry in entries {
                if !content.is_empty() {
                    content.push_str("\n\n");
                }
                content.push_str(&entry.value);
            }
        }
        Ok(if content.is_empty() {
            None
        } else {
            Some(content)
        })
    }

    fn emit(&self, event: Event) {
        self.observer.observe(&event);
    }
}

/// Parses a tool-call argument string leniently: empty input becomes `{}`,
/// invalid JSON is logged and replaced by `{}` so dispatch still happens.
fn parse_arguments(arguments: &str) -> serde_json::Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    match serde_json::from_str(arguments) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, arguments = %arguments, "tool arguments did not parse, using empty object");
            serde_json::json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: lenient argument parsing: empty and invalid input become
    /// an empty object, valid JSON passes through.
    #[test]
    fn parse_arguments_is_lenient() {
        assert_eq!(parse_arguments(""), serde_json::json!({}));
        assert_eq!(parse_arguments("  "), serde_json::json!({}));
        assert_eq!(parse_arguments("not json"), serde_json::json!({}));
        assert_eq!(
            parse_arguments(r#"{"name":"world"}"#),
            serde_json::json!({"name": "world"})
        );
    }
}
