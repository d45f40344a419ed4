use async_trait::async_trait;
use serde_json::Value;

use deskpilot_items::{ChatMessage, Item, Usage};

use crate::ModelError;

/// Request on the flat chat-completion surface.
#[derive(Debug, Clone, Default)]
pub struct ChatRequest {
    /// Full model identifier, `provider/model` or a bare OpenAI model id.
    pub model: String,
    pub messages: Vec<ChatMessage>,
    /// Provider-specific tool schemas, passed through verbatim.  Strategies
    /// own this shape; the client does not inspect it.
    pub tools: Vec<Value>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ChatChoice {
    pub message: ChatMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub choices: Vec<ChatChoice>,
    pub usage: Usage,
}

impl ChatResponse {
    /// The first choice's message — the only one the loop consumes.
    pub fn message(&self) -> Option<&ChatMessage> {
        self.choices.first().map(|c| &c.message)
    }
}

/// Request on the item-shaped responses surface.
#[derive(Debug, Clone, Default)]
pub struct ResponsesRequest {
    pub model: String,
    pub input: Vec<Item>,
    pub tools: Vec<Value>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct ResponsesResponse {
    pub output: Vec<Item>,
    pub usage: Usage,
}

/// The unified completion surface strategies call.
///
/// One implementation speaks HTTP to real providers; the scripted mock
/// drives the orchestrator and strategy tests without network access.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// One chat-completion exchange.
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError>;

    /// One responses-API exchange.
    async fn responses(&self, req: ResponsesRequest) -> Result<ResponsesResponse, ModelError>;
}
