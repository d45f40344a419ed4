// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Flat chat-completion view of the canonical item trace.
//!
//! Most provider SDKs consume `{role, content, tool_calls?, tool_call_id?}`
//! messages.  Strategies that need that shape derive it here and fold model
//! output back into items; the item trace itself stays the source of truth.

use serde::{Deserialize, Serialize};

use crate::action::Action;
use crate::item::{CallOutput, CallStatus, ContentPart, Item, MessageContent, Role};

/// Placeholder text for tool results whose screenshot was demoted to a
/// separate user message.
pub const SCREENSHOT_PLACEHOLDER: &str = "screenshot attached";

/// Synthetic function name that carries computer actions over the
/// chat-completion wire.
pub const COMPUTER_FUNCTION: &str = "computer";

// ─── Chat message shape ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ChatPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        Self::ImageUrl { image_url: ImageUrl { url: url.into() } }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChatContent {
    Text(String),
    Parts(Vec<ChatPart>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionPayload {
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub function: FunctionPayload,
}

impl ToolCallPayload {
    pub fn function(id: impl Into<String>, name: impl Into<String>, arguments: String) -> Self {
        Self {
            id: id.into(),
            kind: "function".into(),
            function: FunctionPayload { name: name.into(), arguments },
        }
    }
}

/// One flat chat-completion message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: ChatContent,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn text(role: ChatRole, text: impl Into<String>) -> Self {
        Self {
            role,
            content: ChatContent::Text(text.into()),
            tool_calls: vec![],
            tool_call_id: None,
        }
    }

    fn tool_result(call_id: impl Into<String>, content: ChatContent) -> Self {
        Self {
            role: ChatRole::Tool,
            content,
            tool_calls: vec![],
            tool_call_id: Some(call_id.into()),
        }
    }
}

// ─── Items → chat ─────────────────────────────────────────────────────────────

fn message_content_to_chat(content: &MessageContent) -> ChatContent {
    match content {
        MessageContent::Text(t) => ChatContent::Text(t.clone()),
        MessageContent::Parts(parts) => ChatContent::Parts(
            parts
                .iter()
                .map(|p| match p {
                    ContentPart::InputText { text } | ContentPart::OutputText { text } => {
                        ChatPart::text(text.clone())
                    }
                    ContentPart::InputImage { image_url } => ChatPart::image(image_url.clone()),
                })
                .collect(),
        ),
    }
}

/// Project the item trace onto flat chat-completion messages.
///
/// `computer_call` becomes an assistant message carrying a synthetic
/// `computer` tool call; `computer_call_output` becomes a tool-role message.
/// When `allow_images_in_tool_results` is false the screenshot moves into a
/// follow-up user message and the tool content is a textual placeholder —
/// required by providers that reject image blocks in tool results.
///
/// `reasoning` items are not representable on this wire and are dropped;
/// strategies that can forward reasoning use the item shape directly.
pub fn items_to_chat(items: &[Item], allow_images_in_tool_results: bool) -> Vec<ChatMessage> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Item::Message { role, content } => {
                let chat_role = match role {
                    Role::System => ChatRole::System,
                    Role::User => ChatRole::User,
                    Role::Assistant => ChatRole::Assistant,
                };
                out.push(ChatMessage {
                    role: chat_role,
                    content: message_content_to_chat(content),
                    tool_calls: vec![],
                    tool_call_id: None,
                });
            }
            Item::Reasoning { .. } => {}
            Item::ComputerCall { call_id, action, .. } => {
                let arguments =
                    serde_json::to_string(action).unwrap_or_else(|_| "{}".to_string());
                out.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatContent::Text(String::new()),
                    tool_calls: vec![ToolCallPayload::function(
                        call_id.clone(),
                        COMPUTER_FUNCTION,
                        arguments,
                    )],
                    tool_call_id: None,
                });
            }
            Item::ComputerCallOutput { call_id, output } => {
                let url = output.image_url().to_string();
                if allow_images_in_tool_results {
                    out.push(ChatMessage::tool_result(
                        call_id.clone(),
                        ChatContent::Parts(vec![ChatPart::image(url)]),
                    ));
                } else {
                    out.push(ChatMessage::tool_result(
                        call_id.clone(),
                        ChatContent::Text(SCREENSHOT_PLACEHOLDER.into()),
                    ));
                    out.push(ChatMessage {
                        role: ChatRole::User,
                        content: ChatContent::Parts(vec![ChatPart::image(url)]),
                        tool_calls: vec![],
                        tool_call_id: None,
                    });
                }
            }
            Item::FunctionCall { call_id, name, arguments } => {
                out.push(ChatMessage {
                    role: ChatRole::Assistant,
                    content: ChatContent::Text(String::new()),
                    tool_calls: vec![ToolCallPayload::function(
                        call_id.clone(),
                        name.clone(),
                        arguments.clone(),
                    )],
                    tool_call_id: None,
                });
            }
            Item::FunctionCallOutput { call_id, output } => {
                out.push(ChatMessage::tool_result(
                    call_id.clone(),
                    ChatContent::Text(output.clone()),
                ));
            }
        }
    }
    out
}

// ─── Chat → items ─────────────────────────────────────────────────────────────

fn chat_content_to_parts(content: &ChatContent, assistant: bool) -> MessageContent {
    match content {
        ChatContent::Text(t) if assistant => {
            MessageContent::Parts(vec![ContentPart::output_text(t.clone())])
        }
        ChatContent::Text(t) => MessageContent::Text(t.clone()),
        ChatContent::Parts(parts) => MessageContent::Parts(
            parts
                .iter()
                .map(|p| match p {
                    ChatPart::Text { text } if assistant => ContentPart::output_text(text.clone()),
                    ChatPart::Text { text } => ContentPart::input_text(text.clone()),
                    ChatPart::ImageUrl { image_url } => {
                        ContentPart::input_image(image_url.url.clone())
                    }
                })
                .collect(),
        ),
    }
}

fn chat_text(content: &ChatContent) -> String {
    match content {
        ChatContent::Text(t) => t.clone(),
        ChatContent::Parts(parts) => parts
            .iter()
            .filter_map(|p| match p {
                ChatPart::Text { text } => Some(text.as_str()),
                ChatPart::ImageUrl { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn first_image(content: &ChatContent) -> Option<&str> {
    match content {
        ChatContent::Text(_) => None,
        ChatContent::Parts(parts) => parts.iter().find_map(|p| match p {
            ChatPart::ImageUrl { image_url } => Some(image_url.url.as_str()),
            _ => None,
        }),
    }
}

/// Fold flat chat messages back into canonical items.
///
/// An assistant `computer` tool call whose arguments parse as a normalized
/// action becomes a `computer_call`; all other tool calls become
/// `function_call` items.  Tool-role messages carrying an image become
/// `computer_call_output`, plain ones `function_call_output`.
pub fn chat_to_items(messages: &[ChatMessage]) -> Vec<Item> {
    let mut out = Vec::with_capacity(messages.len());
    for msg in messages {
        match msg.role {
            ChatRole::System | ChatRole::User => {
                let role = if msg.role == ChatRole::System { Role::System } else { Role::User };
                out.push(Item::Message {
                    role,
                    content: chat_content_to_parts(&msg.content, false),
                });
            }
            ChatRole::Assistant => {
                let text = chat_text(&msg.content);
                if !text.is_empty() {
                    out.push(Item::Message {
                        role: Role::Assistant,
                        content: chat_content_to_parts(&msg.content, true),
                    });
                }
                for tc in &msg.tool_calls {
                    if tc.function.name == COMPUTER_FUNCTION {
                        if let Ok(action) =
                            serde_json::from_str::<Action>(&tc.function.arguments)
                        {
                            out.push(Item::ComputerCall {
                                call_id: tc.id.clone(),
                                status: CallStatus::Completed,
                                action,
                            });
                            continue;
                        }
                    }
                    out.push(Item::FunctionCall {
                        call_id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    });
                }
            }
            ChatRole::Tool => {
                let call_id = msg.tool_call_id.clone().unwrap_or_default();
                if let Some(url) = first_image(&msg.content) {
                    out.push(Item::ComputerCallOutput {
                        call_id,
                        output: CallOutput::InputImage { image_url: url.to_string() },
                    });
                } else {
                    out.push(Item::FunctionCallOutput {
                        call_id,
                        output: chat_text(&msg.content),
                    });
                }
            }
        }
    }
    out
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
