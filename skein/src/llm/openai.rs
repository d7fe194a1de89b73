//! OpenAI-compatible HTTP agent.
//!
//! Speaks the Chat Completions family against any base URL:
//! `/chat/completions` for chat, vision, and tools; `/embeddings`;
//! `/audio/transcriptions`. Responses decode through the per-protocol shapes
//! in [`crate::protocol`], so nested and flat tool-call wire forms are both
//! accepted.
//!
//! Request options are layered: the model's per-protocol capability defaults
//! first, per-call options on top, fixed fields (`model`, `messages`, `tools`,
//! `stream`) last.
//!
//! # Streaming
//!
//! `chat_stream`/`vision_stream` set `stream: true` and read the SSE body line
//! by line: each `data:` payload decodes as a [`StreamingChunk`], is forwarded
//! through the caller's channel, and is folded into the assembled response
//! (content appended, tool calls accumulated by index).

use std::collections::HashMap;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use env_config::AgentConfig;

use crate::message::{Message, Tool, ToolCall};
use crate::protocol::{
    AudioResponse, ChatChoice, ChatResponse, EmbeddingsResponse, Protocol, StreamingChunk,
    ToolsResponse,
};

use super::{Agent, AgentError, CallOptions};

/// HTTP client for one OpenAI-compatible endpoint and model.
pub struct OpenAiCompatAgent {
    id: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    headers: HashMap<String, String>,
    model: String,
    /// Per-protocol default options from the model's capability map.
    protocol_options: HashMap<Protocol, serde_json::Value>,
}

impl OpenAiCompatAgent {
    pub fn new(
        id: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            headers: HashMap::new(),
            model: model.into(),
            protocol_options: HashMap::new(),
        }
    }

    /// Builds the agent from a validated config entry. Unknown capability
    /// tags are dropped here; [`AgentRegistry::capabilities`] applies the same
    /// filter.
    ///
    /// [`AgentRegistry::capabilities`]: super::AgentRegistry::capabilities
    pub fn from_config(id: impl Into<String>, config: &AgentConfig) -> Self {
        let mut agent = Self::new(id, &config.provider.base_url, &config.model.name);
        agent.api_key = config.provider.api_key.clone();
        agent.headers = config.provider.headers.clone();
        agent.protocol_options = config
            .model
            .capabilities
            .iter()
            .filter_map(|(tag, options)| {
                tag.parse::<Protocol>().ok().map(|p| (p, options.clone()))
            })
            .collect();
        agent
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    /// Layers options into a request body: protocol defaults, then per-call
    /// options, then the fixed fields the caller passes in `base`.
    fn build_body(
        &self,
        protocol: Protocol,
        base: serde_json::Value,
        options: Option<&CallOptions>,
    ) -> serde_json::Value {
        let mut body = serde_json::Map::new();
        if let Some(serde_json::Value::Object(defaults)) = self.protocol_options.get(&protocol) {
            for (k, v) in defaults {
                body.insert(k.clone(), v.clone());
            }
        }
        if let Some(options) = options {
            for (k, v) in options {
                body.insert(k.clone(), v.clone());
            }
        }
        if let serde_json::Value::Object(fixed) = base {
            for (k, v) in fixed {
                body.insert(k, v);
            }
        }
        serde_json::Value::Object(body)
    }

    fn apply_headers(&self, mut request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        request
    }

    async fn post(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<reqwest::Response, AgentError> {
        let url = self.endpoint(path);
        debug!(agent = %self.id, url = %url, model = %self.model, "provider request");
        trace!(agent = %self.id, body = %body, "provider request body");
        let response = self
            .apply_headers(self.client.post(&url).json(body))
            .send()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(AgentError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    async fn post_text(&self, path: &str, body: &serde_json::Value) -> Result<String, AgentError> {
        self.post(path, body)
            .await?
            .text()
            .await
            .map_err(|e| AgentError::Request(e.to_string()))
    }

    fn tools_payload(tools: &[Tool]) -> serde_json::Value {
        let entries: Vec<serde_json::Value> = tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        serde_json::Value::Array(entries)
    }

    /// Shared streaming path for chat and vision.
    async fn stream_completion(
        &self,
        protocol: Protocol,
        messages: &[Message],
        chunk_tx: mpsc::Sender<StreamingChunk>,
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let body = self.build_body(
            protocol,
            serde_json::json!({
                "model": self.model,
                "messages": messages,
                "stream": true,
            }),
            options,
        );
        let response = self.post("chat/completions", &body).await?;

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut content = String::new();
        let mut response_id = String::new();
        // index -> (id, name, arguments), accumulated across deltas
        let mut calls: HashMap<u32, (String, String, String)> = HashMap::new();

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.map_err(|e| AgentError::Request(e.to_string()))?;
            buffer.push_str(&String::from_utf8_lossy(&bytes));
            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim().to_string();
                buffer.drain(..=newline);
                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload.is_empty() || payload == "[DONE]" {
                    continue;
                }
                let chunk = StreamingChunk::from_json(payload)
                    .map_err(|e| AgentError::Decode(e.to_string()))?;
                if response_id.is_empty() {
                    response_id = chunk.id.clone();
                }
                for choice in &chunk.choices {
                    if let Some(delta) = &choice.delta.content {
                        content.push_str(delta);
                    }
                    for tc in &choice.delta.tool_calls {
                        let entry = calls.entry(tc.index).or_default();
                        if let Some(id) = &tc.id {
                            if !id.is_empty() {
                                entry.0 = id.clone();
                            }
                        }
                        if let Some(function) = &tc.function {
                            if let Some(name) = &function.name {
                                entry.1.push_str(name);
                            }
                            if let Some(arguments) = &function.arguments {
                                entry.2.push_str(arguments);
                            }
                        }
                    }
                }
                let _ = chunk_tx.send(chunk).await;
            }
        }

        let mut indexed: Vec<(u32, ToolCall)> = calls
            .into_iter()
            .map(|(index, (id, name, arguments))| (index, ToolCall { id, name, arguments }))
            .collect();
        indexed.sort_by_key(|(index, _)| *index);
        let tool_calls: Vec<ToolCall> = indexed.into_iter().map(|(_, tc)| tc).collect();

        let message = if tool_calls.is_empty() {
            Message::assistant(content)
        } else {
            Message::assistant_tool_calls(content, tool_calls)
        };
        Ok(ChatResponse {
            id: response_id,
            model: self.model.clone(),
            choices: vec![ChatChoice {
                index: 0,
                message,
                finish_reason: None,
            }],
            usage: None,
        })
    }
}

#[async_trait]
impl Agent for OpenAiCompatAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        messages: &[Message],
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let body = self.build_body(
            Protocol::Chat,
            serde_json::json!({"model": self.model, "messages": messages}),
            options,
        );
        let text = self.post_text("chat/completions", &body).await?;
        ChatResponse::from_json(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn vision(
        &self,
        messages: &[Message],
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let body = self.build_body(
            Protocol::Vision,
            serde_json::json!({"model": self.model, "messages": messages}),
            options,
        );
        let text = self.post_text("chat/completions", &body).await?;
        ChatResponse::from_json(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn tools(
        &self,
        messages: &[Message],
        tools: &[Tool],
        options: Option<&CallOptions>,
    ) -> Result<ToolsResponse, AgentError> {
        let body = self.build_body(
            Protocol::Tools,
            serde_json::json!({
                "model": self.model,
                "messages": messages,
                "tools": Self::tools_payload(tools),
            }),
            options,
        );
        let text = self.post_text("chat/completions", &body).await?;
        ToolsResponse::from_json(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn embed(
        &self,
        inputs: &[String],
        options: Option<&CallOptions>,
    ) -> Result<EmbeddingsResponse, AgentError> {
        let body = self.build_body(
            Protocol::Embeddings,
            serde_json::json!({"model": self.model, "input": inputs}),
            options,
        );
        let text = self.post_text("embeddings", &body).await?;
        EmbeddingsResponse::from_json(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn audio(
        &self,
        input: &str,
        options: Option<&CallOptions>,
    ) -> Result<AudioResponse, AgentError> {
        let body = self.build_body(
            Protocol::Audio,
            serde_json::json!({"model": self.model, "input": input}),
            options,
        );
        let text = self.post_text("audio/transcriptions", &body).await?;
        AudioResponse::from_json(&text).map_err(|e| AgentError::Decode(e.to_string()))
    }

    async fn chat_stream(
        &self,
        messages: &[Message],
        chunk_tx: mpsc::Sender<StreamingChunk>,
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        self.stream_completion(Protocol::Chat, messages, chunk_tx, options)
            .await
    }

    async fn vision_stream(
        &self,
        messages: &[Message],
        chunk_tx: mpsc::Sender<StreamingChunk>,
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        self.stream_completion(Protocol::Vision, messages, chunk_tx, options)
            .await
    }
}
