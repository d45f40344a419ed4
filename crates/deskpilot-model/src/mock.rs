// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;

use deskpilot_items::{ChatContent, ChatMessage, ChatRole, Item, ToolCallPayload, Usage};

use crate::{
    client::{ChatChoice, ChatRequest, ChatResponse, ResponsesRequest, ResponsesResponse},
    CompletionClient, ModelError,
};

fn default_usage() -> Usage {
    Usage {
        prompt_tokens: 10,
        completion_tokens: 10,
        total_tokens: 20,
        ..Default::default()
    }
}

/// Pre-scripted completion client.  Each call pops the next script from the
/// front of the corresponding queue, so tests specify exact multi-turn
/// exchanges — including tool calls and transient failures — without
/// network access.  Every request is recorded for inspection.
pub struct ScriptedClient {
    chat_scripts: Mutex<Vec<Result<ChatResponse, ModelError>>>,
    responses_scripts: Mutex<Vec<Result<ResponsesResponse, ModelError>>>,
    /// All chat requests seen, in order.
    pub chat_requests: Mutex<Vec<ChatRequest>>,
    /// All responses-surface requests seen, in order.
    pub responses_requests: Mutex<Vec<ResponsesRequest>>,
}

impl ScriptedClient {
    pub fn new() -> Self {
        Self {
            chat_scripts: Mutex::new(Vec::new()),
            responses_scripts: Mutex::new(Vec::new()),
            chat_requests: Mutex::new(Vec::new()),
            responses_requests: Mutex::new(Vec::new()),
        }
    }

    /// Queue a chat response.
    pub fn push_chat(&self, resp: ChatResponse) {
        self.chat_scripts.lock().unwrap().push(Ok(resp));
    }

    /// Queue a chat-surface error.
    pub fn push_chat_error(&self, err: ModelError) {
        self.chat_scripts.lock().unwrap().push(Err(err));
    }

    /// Queue a responses-surface script.
    pub fn push_responses(&self, resp: ResponsesResponse) {
        self.responses_scripts.lock().unwrap().push(Ok(resp));
    }

    /// Convenience: a chat response that is plain assistant text.
    pub fn text_response(text: impl Into<String>) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatContent::Text(text.into()),
                    tool_calls: vec![],
                    tool_call_id: None,
                },
                finish_reason: Some("stop".into()),
            }],
            usage: default_usage(),
        }
    }

    /// Convenience: a chat response carrying one tool call.
    pub fn tool_call_response(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> ChatResponse {
        ChatResponse {
            choices: vec![ChatChoice {
                message: ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatContent::Text(String::new()),
                    tool_calls: vec![ToolCallPayload::function(id, name, arguments.into())],
                    tool_call_id: None,
                },
                finish_reason: Some("tool_calls".into()),
            }],
            usage: default_usage(),
        }
    }

    /// Convenience: a responses-surface script from items.
    pub fn items_response(output: Vec<Item>) -> ResponsesResponse {
        ResponsesResponse { output, usage: default_usage() }
    }
}

impl Default for ScriptedClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CompletionClient for ScriptedClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        self.chat_requests.lock().unwrap().push(req);
        let mut scripts = self.chat_scripts.lock().unwrap();
        if scripts.is_empty() {
            // Default fallback when all scripts are consumed.
            return Ok(Self::text_response("[no more scripts]"));
        }
        scripts.remove(0)
    }

    async fn responses(&self, req: ResponsesRequest) -> Result<ResponsesResponse, ModelError> {
        self.responses_requests.lock().unwrap().push(req);
        let mut scripts = self.responses_scripts.lock().unwrap();
        if scripts.is_empty() {
            return Ok(ResponsesResponse {
                output: vec![Item::assistant("[no more scripts]")],
                usage: default_usage(),
            });
        }
        scripts.remove(0)
    }
}
