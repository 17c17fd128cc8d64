//! LLM backend abstraction.
//!
//! Every generation step talks to the model through [`LlmBackend`], a single
//! `complete(request) -> text` capability. [`ChatCompletionsClient`] implements it
//! for OpenAI-compatible HTTP APIs (Groq by default).

mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use sdsynth_shared::Result;

pub use client::ChatCompletionsClient;

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged message of a completion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A single text-completion request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub messages: Vec<ChatMessage>,
}

impl CompletionRequest {
    pub fn new(model: impl Into<String>, temperature: f32, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            temperature,
            max_tokens,
            messages: Vec::new(),
        }
    }

    /// Append a message, builder style.
    pub fn message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    /// Content of the first message with the given role.
    pub fn content_of(&self, role: Role) -> Option<&str> {
        self.messages
            .iter()
            .find(|m| m.role == role)
            .map(|m| m.content.as_str())
    }
}

/// Request/response text completion. Calls may fail or time out; callers
/// decide whether a failure blocks or is tolerated.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Run one completion and return the generated text.
    async fn complete(&self, request: CompletionRequest) -> Result<String>;

    /// Human-readable backend name for logs.
    fn name(&self) -> &str;
}
