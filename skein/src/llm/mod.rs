//! Agent capability: the protocol methods an LLM endpoint exposes.
//!
//! The runtime sees an agent only as this trait: per-protocol calls taking a
//! message sequence and optional per-call options, returning the decoded
//! response shape for that protocol. Implementations range from
//! [`OpenAiCompatAgent`] (live HTTP) to [`MockAgent`] (scripted turns for
//! tests).
//!
//! # Streaming
//!
//! `chat_stream` and `vision_stream` accept an [`mpsc::Sender`] of
//! [`StreamingChunk`]s and still return the assembled response at the end.
//! The default implementations call the non-streaming method and emit the full
//! content as one synthetic chunk, so non-streaming backends satisfy the trait
//! unchanged.
//!
//! **Interaction**: the kernel drives `tools`; the hub and workflows call
//! whatever protocol their handlers need; the registry materializes
//! implementations lazily from [`env_config::AgentConfig`].

mod mock;
mod openai;
mod registry;

pub use mock::{MockAgent, MockTurn};
pub use openai::OpenAiCompatAgent;
pub use registry::{AgentInfo, AgentRegistry, RegistryError};

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::message::{Message, Tool};
use crate::protocol::{
    AudioResponse, ChatResponse, EmbeddingsResponse, Protocol, StreamingChoice, StreamingChunk,
    StreamingDelta, ToolsResponse,
};

/// Per-call option map, merged over the model's per-protocol defaults.
pub type CallOptions = HashMap<String, serde_json::Value>;

/// Agent call error.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The provider answered with no choices.
    #[error("agent returned no choices")]
    EmptyResponse,

    /// Transport-level failure (connect, timeout, body read).
    #[error("request failed: {0}")]
    Request(String),

    /// Non-success HTTP status from the provider.
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The response body did not decode as the expected shape.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The agent's configuration does not cover this protocol.
    #[error("protocol not supported: {0}")]
    Unsupported(Protocol),
}

/// An LLM endpoint the runtime can call.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Stable identifier, e.g. the registry name.
    fn id(&self) -> &str;

    /// Plain chat completion.
    async fn chat(
        &self,
        messages: &[Message],
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError>;

    /// Chat completion over messages that may carry image parts.
    async fn vision(
        &self,
        messages: &[Message],
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError>;

    /// Chat completion with a tool catalog; the response may request calls.
    async fn tools(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: Option<&CallOptions>,
    ) -> Result<ToolsResponse, AgentError>;

    /// Embeds each input string.
    async fn embed(
        &self,
        inputs: &[String],
        options: Option<&CallOptions>,
    ) -> Result<EmbeddingsResponse, AgentError>;

    /// Audio transcription.
    async fn audio(
        &self,
        input: &str,
        options: Option<&CallOptions>,
    ) -> Result<AudioResponse, AgentError>;

    /// Streaming chat: emit chunks through `chunk_tx` as they arrive, then
    /// return the assembled response.
    async fn chat_stream(
        &self,
        messages: &[Message],
        chunk_tx: mpsc::Sender<StreamingChunk>,
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let response = self.chat(messages, options).await?;
        send_whole_response_as_chunk(&response, &chunk_tx).await;
        Ok(response)
    }

    /// Streaming vision; same contract as [`Agent::chat_stream`].
    async fn vision_stream(
        &self,
        messages: &[Message],
        chunk_tx: mpsc::Sender<StreamingChunk>,
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let response = self.vision(messages, options).await?;
        send_whole_response_as_chunk(&response, &chunk_tx).await;
        Ok(response)
    }
}

/// Default-impl helper: one synthetic chunk carrying the full content.
async fn send_whole_response_as_chunk(
    response: &ChatResponse,
    chunk_tx: &mpsc::Sender<StreamingChunk>,
) {
    let Some(content) = response.first_content() else {
        return;
    };
    if content.is_empty() {
        return;
    }
    let _ = chunk_tx
        .send(StreamingChunk {
            id: response.id.clone(),
            choices: vec![StreamingChoice {
                index: 0,
                delta: StreamingDelta {
                    content: Some(content),
                    tool_calls: Vec::new(),
                },
                finish_reason: Some("stop".to_string()),
            }],
        })
        .await;
}
