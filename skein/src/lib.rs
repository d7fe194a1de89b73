//! # Skein
//!
//! An LLM agent runtime: a per-prompt **kernel loop** (observe, think, act,
//! repeat), a **hub** for many agents to exchange messages, and **workflow
//! combinators** (chain, parallel, conditional) over the same state
//! machinery.
//!
//! ## Design principles
//!
//! - **Capabilities over concretions**: the kernel sees the model only as an
//!   [`Agent`], tools only as a [`ToolExecutor`], memory only as a
//!   [`MemoryStore`], and sinks only as an [`Observer`]. Tests swap any seam.
//! - **Errors reified for the model**: tool infrastructure failures become
//!   tool messages the model can react to; infrastructure failures of the
//!   runtime itself propagate as typed errors.
//! - **Cancellation everywhere**: every blocking operation takes a
//!   [`CancellationToken`](tokio_util::sync::CancellationToken); partial
//!   results travel with the errors that interrupt them.
//!
//! ## Main modules
//!
//! - [`message`]: [`Message`], [`Role`], [`ToolCall`] (flat in memory, nested
//!   on the wire), [`Tool`].
//! - [`protocol`]: [`Protocol`] tags and per-protocol response shapes.
//! - [`session`]: [`Session`], the concurrent per-conversation log.
//! - [`tools`]: [`ToolRegistry`], [`ToolExecutor`], [`ToolOutput`].
//! - [`llm`]: [`Agent`] trait, [`OpenAiCompatAgent`], [`MockAgent`],
//!   [`AgentRegistry`].
//! - [`memory`]: [`MemoryStore`] contract, [`InMemoryMemory`],
//!   [`SqliteMemory`].
//! - [`kernel`]: [`Kernel`], [`RunResult`], [`ToolCallRecord`].
//! - [`channel`]: [`MessageChannel`], the bounded ctx-aware FIFO.
//! - [`hub`]: [`Hub`], [`Envelope`], [`EnvelopeHandler`].
//! - [`workflow`]: [`Chain`], [`Parallel`], [`Conditional`].
//! - [`observer`]: [`Event`], [`Observer`], [`MultiObserver`],
//!   [`TracingObserver`].
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use skein::{Kernel, KernelConfig, MockAgent, ToolRegistry};
//! use skein::message::ToolCall;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let agent = Arc::new(
//!     MockAgent::new("demo")
//!         .then_tool_calls(vec![ToolCall::new("c1", "current_time", "{}")])
//!         .then_content("All done."),
//! );
//! let tools = Arc::new(ToolRegistry::new());
//! skein::tools::builtin::register_builtin_tools(&tools).await.unwrap();
//!
//! let kernel = Kernel::new(agent, tools).with_config(KernelConfig {
//!     max_iterations: 5,
//!     system_prompt: Some("You are helpful.".into()),
//! });
//! let result = kernel.run(&CancellationToken::new(), "What time is it?").await.unwrap();
//! println!("{}", result.response);
//! # }
//! ```

pub mod channel;
pub mod hub;
pub mod kernel;
pub mod llm;
pub mod memory;
pub mod message;
pub mod observer;
pub mod protocol;
pub mod session;
pub mod tools;
pub mod workflow;

pub use channel::{ChannelError, MessageChannel};
pub use hub::{
    handler_fn, Envelope, EnvelopeHandler, HandlerError, Hub, HubConfig, HubError, HubMetrics,
    MessageType, Priority,
};
pub use kernel::{Kernel, KernelConfig, KernelError, RunResult, ToolCallRecord};
pub use llm::{
    Agent, AgentError, AgentInfo, AgentRegistry, CallOptions, MockAgent, MockTurn,
    OpenAiCompatAgent, RegistryError,
};
pub use memory::{InMemoryMemory, MemoryEntry, MemoryError, MemoryStore, SqliteMemory};
pub use message::{Content, ContentPart, ImageUrl, Message, Role, Tool, ToolCall};
pub use observer::{Event, Level, MultiObserver, NullObserver, Observer, TracingObserver};
pub use protocol::{
    AudioResponse, ChatChoice, ChatResponse, Embedding, EmbeddingsResponse, Protocol,
    ResponseUsage, StreamingChoice, StreamingChunk, StreamingDelta, StreamingFunction,
    StreamingToolCall, ToolsChoice, ToolsResponse, UnknownProtocol,
};
pub use session::Session;
pub use tools::{tool_fn, ToolError, ToolExecutor, ToolHandler, ToolOutput, ToolRegistry};
pub use workflow::{
    Chain, ChainError, ChainStep, Conditional, ConditionalError, Parallel, ParallelConfig,
    ParallelError, ParallelOutcome, PredicateFn, ProgressFn, RouteHandler, Routes, TaskError,
    WorkflowError,
};
