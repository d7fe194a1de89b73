//! Scripted agent for tests: a fixed sequence of turns, no network.

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::message::{Message, Tool, ToolCall};
use crate::protocol::{
    AudioResponse, ChatChoice, ChatResponse, Embedding, EmbeddingsResponse, ToolsChoice,
    ToolsResponse,
};

use super::{Agent, AgentError, CallOptions};

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum MockTurn {
    /// Final assistant content.
    Content(String),
    /// Assistant turn requesting tool calls.
    ToolCalls(Vec<ToolCall>),
}

/// Agent that replays a scripted sequence of turns.
///
/// Each `chat`/`tools` call pops the next turn. With
/// [`MockAgent::repeat_last`], the final turn repeats forever once the script
/// is exhausted (useful for iteration-budget tests); otherwise an exhausted
/// script answers with zero choices.
///
/// Every `tools` call records a deep copy of the messages it was given, so
/// tests can assert on the exact prompt the agent saw.
pub struct MockAgent {
    id: String,
    turns: Mutex<VecDeque<MockTurn>>,
    repeat_last: bool,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl MockAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            turns: Mutex::new(VecDeque::new()),
            repeat_last: false,
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Appends a final-content turn; chainable.
    pub fn then_content(self, content: impl Into<String>) -> Self {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(MockTurn::Content(content.into()));
        self
    }

    /// Appends a tool-call turn; chainable.
    pub fn then_tool_calls(self, calls: Vec<ToolCall>) -> Self {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(MockTurn::ToolCalls(calls));
        self
    }

    /// Repeats the last scripted turn once the script runs out.
    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Message sequences observed by `tools`, in call order.
    pub fn seen_messages(&self) -> Vec<Vec<Message>> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn next_turn(&self) -> Option<MockTurn> {
        let mut turns = self.turns.lock().unwrap_or_else(PoisonError::into_inner);
        if self.repeat_last && turns.len() == 1 {
            return turns.front().cloned();
        }
        turns.pop_front()
    }

    fn turn_to_message(turn: MockTurn) -> Message {
        match turn {
            MockTurn::Content(content) => Message::assistant(content),
            MockTurn::ToolCalls(calls) => Message::assistant_tool_calls("", calls),
        }
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn chat(
        &self,
        _messages: &[Message],
        _options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        let choices = match self.next_turn() {
            Some(turn) => vec![ChatChoice {
                index: 0,
                message: Self::turn_to_message(turn),
                finish_reason: Some("stop".to_string()),
            }],
            None => Vec::new(),
        };
        Ok(ChatResponse {
            id: String::new(),
            model: "mock".to_string(),
            choices,
            usage: None,
        })
    }

    async fn vision(
        &self,
        messages: &[Message],
        options: Option<&CallOptions>,
    ) -> Result<ChatResponse, AgentError> {
        self.chat(messages, options).await
    }

    async fn tools(
        &self,
        messages: &[Message],
        _tools: &[Tool],
        _options: Option<&CallOptions>,
    ) -> Result<ToolsResponse, AgentError> {
        self.seen.lock().unwrap_or_else(PoisonError::into_inner).push(messages.to_vec());
        let choices = match self.next_turn() {
            Some(turn) => {
                let message = Self::turn_to_message(turn);
                let finish_reason = if message.tool_calls.is_empty() {
                    "stop"
                } else {
                    "tool_calls"
                };
                vec![ToolsChoice {
                    index: 0,
                    message,
                    finish_reason: Some(finish_reason.to_string()),
                }]
            }
            None => Vec::new(),
        };
        Ok(ToolsResponse {
            id: String::new(),
            model: "mock".to_string(),
            choices,
            usage: None,
        })
    }

    async fn embed(
        &self,
        inputs: &[String],
        _options: Option<&CallOptions>,
    ) -> Result<EmbeddingsResponse, AgentError> {
        let data = inputs
            .iter()
            .enumerate()
            .map(|(i, input)| Embedding {
                index: i as u32,
                embedding: vec![input.len() as f32, 0.0, 0.0],
            })
            .collect();
        Ok(EmbeddingsResponse {
            model: "mock".to_string(),
            data,
            usage: None,
        })
    }

    async fn audio(
        &self,
        input: &str,
        _options: Option<&CallOptions>,
    ) -> Result<AudioResponse, AgentError> {
        Ok(AudioResponse {
            text: format!("transcript of {} bytes", input.len()),
        })
    }
}
