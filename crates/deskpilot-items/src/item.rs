// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use crate::action::Action;

// ─── Content parts ────────────────────────────────────────────────────────────

/// A single content part in a multi-part message.
///
/// `input_*` parts appear on user/tool-origin items, `output_*` parts on
/// assistant-origin items.  Images are data URLs
/// (`data:image/png;base64,…`) or HTTPS URLs for providers that accept
/// remote references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    OutputText { text: String },
    InputImage { image_url: String },
}

impl ContentPart {
    pub fn input_text(text: impl Into<String>) -> Self {
        Self::InputText { text: text.into() }
    }

    pub fn output_text(text: impl Into<String>) -> Self {
        Self::OutputText { text: text.into() }
    }

    pub fn input_image(image_url: impl Into<String>) -> Self {
        Self::InputImage { image_url: image_url.into() }
    }
}

/// The content of a `message` item: a plain string or a list of parts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenated text of all textual parts.
    pub fn text(&self) -> String {
        match self {
            Self::Text(t) => t.clone(),
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::InputText { text } | ContentPart::OutputText { text } => {
                        Some(text.as_str())
                    }
                    ContentPart::InputImage { .. } => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// All image URLs embedded in this content.
    pub fn image_urls(&self) -> Vec<&str> {
        match self {
            Self::Text(_) => vec![],
            Self::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::InputImage { image_url } => Some(image_url.as_str()),
                    _ => None,
                })
                .collect(),
        }
    }
}

/// One entry of a `reasoning` item's summary.  Opaque to the loop and
/// preserved verbatim across turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SummaryPart {
    SummaryText { text: String },
}

// ─── Item variants ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// Completion status of a `computer_call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    #[default]
    Completed,
    Failed,
}

/// Output of a `computer_call` — a post-action screenshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallOutput {
    InputImage { image_url: String },
}

impl CallOutput {
    pub fn image_url(&self) -> &str {
        match self {
            Self::InputImage { image_url } => image_url,
        }
    }
}

/// One item of a conversation trace.
///
/// Item order is the conversation order fed back to the model; the runtime
/// never re-sorts.  History is append-only apart from the image-retention
/// callback's pruning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Item {
    Message {
        role: Role,
        content: MessageContent,
    },
    Reasoning {
        summary: Vec<SummaryPart>,
    },
    ComputerCall {
        call_id: String,
        #[serde(default)]
        status: CallStatus,
        action: Action,
    },
    ComputerCallOutput {
        call_id: String,
        output: CallOutput,
    },
    FunctionCall {
        call_id: String,
        name: String,
        /// JSON-encoded argument object.
        arguments: String,
    },
    FunctionCallOutput {
        call_id: String,
        output: String,
    },
}

impl Item {
    pub fn user(text: impl Into<String>) -> Self {
        Self::Message { role: Role::User, content: MessageContent::Text(text.into()) }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::Message {
            role: Role::Assistant,
            content: MessageContent::Parts(vec![ContentPart::output_text(text)]),
        }
    }

    pub fn computer_call(call_id: impl Into<String>, action: Action) -> Self {
        Self::ComputerCall {
            call_id: call_id.into(),
            status: CallStatus::Completed,
            action,
        }
    }

    pub fn screenshot_output(call_id: impl Into<String>, image_url: impl Into<String>) -> Self {
        Self::ComputerCallOutput {
            call_id: call_id.into(),
            output: CallOutput::InputImage { image_url: image_url.into() },
        }
    }

    pub fn function_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self::FunctionCallOutput { call_id: call_id.into(), output: output.into() }
    }

    /// The `call_id` of call and output variants.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Self::ComputerCall { call_id, .. }
            | Self::ComputerCallOutput { call_id, .. }
            | Self::FunctionCall { call_id, .. }
            | Self::FunctionCallOutput { call_id, .. } => Some(call_id),
            _ => None,
        }
    }
}

// ─── Run input ────────────────────────────────────────────────────────────────

/// Input accepted by `Agent::run`: a fresh user-text task, or a full prior
/// item trace for resumption.
#[derive(Debug, Clone)]
pub enum RunInput {
    Text(String),
    Items(Vec<Item>),
}

impl RunInput {
    /// Normalize into the canonical item sequence.
    pub fn into_items(self) -> Vec<Item> {
        match self {
            Self::Text(t) => vec![Item::user(t)],
            Self::Items(items) => items,
        }
    }
}

impl From<&str> for RunInput {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for RunInput {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<Vec<Item>> for RunInput {
    fn from(items: Vec<Item>) -> Self {
        Self::Items(items)
    }
}

// ─── Trace helpers ────────────────────────────────────────────────────────────

/// `call_id`s of `computer_call` items that have no matching
/// `computer_call_output` *and* no `function_call_output` marking failure.
/// A turn is complete when this is empty.
pub fn pending_computer_calls(items: &[Item]) -> Vec<&str> {
    items
        .iter()
        .filter_map(|it| match it {
            Item::ComputerCall { call_id, .. } => Some(call_id.as_str()),
            _ => None,
        })
        .filter(|id| {
            !items.iter().any(|it| match it {
                Item::ComputerCallOutput { call_id, .. }
                | Item::FunctionCallOutput { call_id, .. } => call_id == id,
                _ => false,
            })
        })
        .collect()
}

/// The most recent screenshot in the trace — the last `computer_call_output`
/// image, falling back to the last user-message image part.
pub fn latest_image_url(items: &[Item]) -> Option<&str> {
    items.iter().rev().find_map(|it| match it {
        Item::ComputerCallOutput { output, .. } => Some(output.image_url()),
        Item::Message { role: Role::User, content } => {
            content.image_urls().last().copied()
        }
        _ => None,
    })
}

// ─── Data URLs ────────────────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("not a data URL")]
    NotDataUrl,
    #[error("malformed data URL")]
    MalformedDataUrl,
}

/// Parse `data:<mime>;base64,<b64>` into `(mime, b64)`.  Errors on
/// non-data-URLs so callers can fall back to treating the string as a plain
/// HTTPS reference.
pub fn parse_data_url(url: &str) -> Result<(&str, &str), ItemError> {
    let rest = url.strip_prefix("data:").ok_or(ItemError::NotDataUrl)?;
    let (meta, b64) = rest.split_once(',').ok_or(ItemError::MalformedDataUrl)?;
    Ok((meta.strip_suffix(";base64").unwrap_or(meta), b64))
}

/// Wrap a base64 PNG into a data URL.
pub fn png_data_url(b64: &str) -> String {
    format!("data:image/png;base64,{b64}")
}

// ─── Unit tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Button;

    #[test]
    fn message_item_serializes_with_type_tag() {
        let json = serde_json::to_value(Item::user("hello")).unwrap();
        assert_eq!(json["type"], "message");
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hello");
    }

    #[test]
    fn assistant_helper_uses_output_text_parts() {
        let json = serde_json::to_value(Item::assistant("done")).unwrap();
        assert_eq!(json["content"][0]["type"], "output_text");
    }

    #[test]
    fn computer_call_round_trips() {
        let it = Item::computer_call(
            "call_1",
            Action::Click { x: 100, y: 200, button: Button::Left },
        );
        let json = serde_json::to_string(&it).unwrap();
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, it);
    }

    #[test]
    fn computer_call_status_defaults_to_completed() {
        let it: Item = serde_json::from_str(
            r#"{"type":"computer_call","call_id":"c1","action":{"type":"wait"}}"#,
        )
        .unwrap();
        match it {
            Item::ComputerCall { status, .. } => assert_eq!(status, CallStatus::Completed),
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn reasoning_summary_round_trips_verbatim() {
        let it = Item::Reasoning {
            summary: vec![SummaryPart::SummaryText { text: "thinking".into() }],
        };
        let json = serde_json::to_string(&it).unwrap();
        assert!(json.contains("summary_text"));
        let back: Item = serde_json::from_str(&json).unwrap();
        assert_eq!(back, it);
    }

    #[test]
    fn pending_calls_ignores_answered_ids() {
        let items = vec![
            Item::computer_call("a", Action::Wait),
            Item::screenshot_output("a", "data:image/png;base64,AA"),
            Item::computer_call("b", Action::Wait),
        ];
        assert_eq!(pending_computer_calls(&items), vec!["b"]);
    }

    #[test]
    fn pending_calls_accepts_failure_output_as_answer() {
        let items = vec![
            Item::computer_call("a", Action::Wait),
            Item::function_output("a", "error: element not found"),
        ];
        assert!(pending_computer_calls(&items).is_empty());
    }

    #[test]
    fn latest_image_prefers_most_recent_output() {
        let items = vec![
            Item::screenshot_output("a", "data:image/png;base64,OLD"),
            Item::user("next"),
            Item::screenshot_output("b", "data:image/png;base64,NEW"),
        ];
        assert_eq!(latest_image_url(&items), Some("data:image/png;base64,NEW"));
    }

    #[test]
    fn latest_image_falls_back_to_user_message_parts() {
        let items = vec![Item::Message {
            role: Role::User,
            content: MessageContent::Parts(vec![
                ContentPart::input_text("look"),
                ContentPart::input_image("data:image/png;base64,IMG"),
            ]),
        }];
        assert_eq!(latest_image_url(&items), Some("data:image/png;base64,IMG"));
    }

    #[test]
    fn parse_data_url_splits_mime_and_payload() {
        let (mime, b64) = parse_data_url("data:image/png;base64,QUJD").unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(b64, "QUJD");
    }

    #[test]
    fn parse_data_url_rejects_plain_urls() {
        assert!(parse_data_url("https://example.com/x.png").is_err());
    }

    #[test]
    fn run_input_text_becomes_single_user_item() {
        let items = RunInput::from("click Submit").into_items();
        assert_eq!(items, vec![Item::user("click Submit")]);
    }
}
