// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;

use deskpilot_items::{Item, MessageContent, Role};

use super::Callback;

/// Prepends a user instructions message before each LLM call.
///
/// The lightest form of prompt engineering: it works with every loop and
/// provider because it only touches the message list, never the tool
/// schemas.  Skips the prepend when the instructions are already at the
/// head, so repeated turns do not stack copies.
pub struct PromptInstructions {
    instructions: String,
}

impl PromptInstructions {
    pub fn new(instructions: impl Into<String>) -> Self {
        Self { instructions: instructions.into() }
    }
}

#[async_trait]
impl Callback for PromptInstructions {
    async fn on_llm_start(&self, items: Vec<Item>) -> Vec<Item> {
        if self.instructions.is_empty() {
            return items;
        }
        if let Some(Item::Message { role: Role::User, content: MessageContent::Text(t) }) =
            items.first()
        {
            if *t == self.instructions {
                return items;
            }
        }
        let mut out = Vec::with_capacity(items.len() + 1);
        out.push(Item::user(self.instructions.clone()));
        out.extend(items);
        out
    }
}
