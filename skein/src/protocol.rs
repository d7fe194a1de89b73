//! Protocol tags and decoded provider response shapes.
//!
//! [`Protocol`] is the closed set of LLM protocols an agent can speak. Each
//! protocol's response is a distinct shape with its own parser entry point;
//! there is no shared base type. Tool-call decoding inside these shapes goes
//! through [`ToolCall`](crate::message::ToolCall), which accepts both the
//! nested and the flat wire form.
//!
//! **Interaction**: produced by [`Agent`](crate::llm::Agent) implementations
//! (decoded from OpenAI-compatible JSON) and consumed by the kernel loop and
//! callers.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::Message;

/// The closed set of supported protocols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Chat,
    Vision,
    Tools,
    Embeddings,
    Audio,
}

impl Protocol {
    /// All tags, in canonical (sorted) order.
    pub const ALL: [Protocol; 5] = [
        Protocol::Chat,
        Protocol::Vision,
        Protocol::Tools,
        Protocol::Embeddings,
        Protocol::Audio,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Chat => "chat",
            Protocol::Vision => "vision",
            Protocol::Tools => "tools",
            Protocol::Embeddings => "embeddings",
            Protocol::Audio => "audio",
        }
    }

    /// Whether the protocol has a streaming variant.
    ///
    /// `chat`, `vision`, and `tools` stream; `embeddings` and `audio` do not.
    pub fn supports_streaming(&self) -> bool {
        matches!(self, Protocol::Chat | Protocol::Vision | Protocol::Tools)
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown tag at validation time.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown protocol tag: {0}")]
pub struct UnknownProtocol(pub String);

impl std::str::FromStr for Protocol {
    type Err = UnknownProtocol;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Protocol::Chat),
            "vision" => Ok(Protocol::Vision),
            "tools" => Ok(Protocol::Tools),
            "embeddings" => Ok(Protocol::Embeddings),
            "audio" => Ok(Protocol::Audio),
            other => Err(UnknownProtocol(other.to_string())),
        }
    }
}

/// Token usage attached to chat/tools/embeddings responses.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseUsage {
    #[serde(default)]
    pub prompt_tokens: u32,
    #[serde(default)]
    pub completion_tokens: u32,
    #[serde(default)]
    pub total_tokens: u32,
}

/// One completion alternative in a chat response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Decoded chat (and vision) completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
}

impl ChatResponse {
    /// Parser entry point for the chat protocol.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Content of the first choice, if any.
    pub fn first_content(&self) -> Option<String> {
        self.choices.first().map(|c| c.message.content.as_text())
    }
}

/// One completion alternative in a tools response; may carry tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsChoice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// Decoded tools completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolsResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub choices: Vec<ToolsChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
}

impl ToolsResponse {
    /// Parser entry point for the tools protocol.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// One embedding vector, positioned by input index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    #[serde(default)]
    pub index: u32,
    pub embedding: Vec<f32>,
}

/// Decoded embeddings response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsResponse {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub data: Vec<Embedding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ResponseUsage>,
}

impl EmbeddingsResponse {
    /// Parser entry point for the embeddings protocol.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Decoded audio transcription response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioResponse {
    #[serde(default)]
    pub text: String,
}

impl AudioResponse {
    /// Parser entry point for the audio protocol.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Partial tool call inside a streaming delta, accumulated by `index`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingToolCall {
    #[serde(default)]
    pub index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<StreamingFunction>,
}

/// Partial function fields inside a streaming tool-call delta.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingFunction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<String>,
}

/// Incremental fields of one streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingDelta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<StreamingToolCall>,
}

/// One streamed choice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingChoice {
    #[serde(default)]
    pub index: u32,
    #[serde(default)]
    pub delta: StreamingDelta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

/// One SSE chunk of a streaming chat/vision/tools response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamingChunk {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub choices: Vec<StreamingChoice>,
}

impl StreamingChunk {
    /// Parser entry point for one `data:` payload.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
