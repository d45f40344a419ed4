// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Canonical conversation model for the agent runtime.
//!
//! A run's trace is an ordered sequence of [`Item`]s — the "responses" shape.
//! This is the source of truth; the flat chat-completion shape used by most
//! provider SDKs is generated on demand via [`chat::items_to_chat`] and folded
//! back with [`chat::chat_to_items`].  Strategies that speak the responses
//! wire format directly never pay the conversion cost.

pub mod action;
pub mod chat;
pub mod item;
pub mod normalize;
pub mod usage;

pub use action::{Action, Button, Point};
pub use chat::{
    chat_to_items, items_to_chat, ChatContent, ChatMessage, ChatPart, ChatRole, FunctionPayload,
    ImageUrl, ToolCallPayload, COMPUTER_FUNCTION, SCREENSHOT_PLACEHOLDER,
};
pub use item::{
    latest_image_url, parse_data_url, pending_computer_calls, png_data_url, CallOutput,
    CallStatus, ContentPart, Item, ItemError, MessageContent, Role, RunInput, SummaryPart,
};
pub use usage::{InputTokensDetails, OutputTokensDetails, Usage};
