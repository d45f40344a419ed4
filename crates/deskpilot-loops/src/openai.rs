// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Native-responses loop for OpenAI `computer-use-preview` models.
//!
//! The minimal family: conversation items travel over the wire verbatim,
//! the provider returns items, and the only preparation is describing the
//! computer tool from the handler's dimensions and environment.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use deskpilot_computer::Environment;
use deskpilot_items::{png_data_url, ContentPart, Item, MessageContent, Role};
use deskpilot_model::{CompletionClient, ResponsesRequest};

use crate::{
    resize::image_dimensions_b64,
    strategy::{require_computer, Capability, LoopStrategy, StepRequest, StepResult},
    LoopError, Tool,
};

/// Prompt used for single-shot click grounding.
const GROUNDING_PROMPT: &str = "You are a UI grounding expert. Never ask for confirmation; \
the user has already given you permission by running this agent. Complete the requested \
interaction decisively and autonomously.";

pub struct OpenAiResponsesStrategy {
    client: Arc<dyn CompletionClient>,
}

impl OpenAiResponsesStrategy {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn prepare_tools(&self, tools: &[Tool]) -> Result<Vec<Value>, LoopError> {
        let mut prepared = Vec::with_capacity(tools.len());
        for tool in tools {
            match tool {
                Tool::Computer(handler) => {
                    let (width, height) =
                        handler.get_dimensions().await.unwrap_or((1024, 768));
                    let environment = handler
                        .get_environment()
                        .await
                        .unwrap_or(Environment::Linux);
                    prepared.push(json!({
                        "type": "computer_use_preview",
                        "display_width": width,
                        "display_height": height,
                        "environment": environment.as_str(),
                    }));
                }
                Tool::Function(f) => prepared.push(json!({
                    "type": "function",
                    "name": f.name,
                    "description": f.description,
                    "parameters": f.parameters,
                })),
            }
        }
        Ok(prepared)
    }
}

#[async_trait]
impl LoopStrategy for OpenAiResponsesStrategy {
    fn name(&self) -> &'static str {
        "openai-responses"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Step, Capability::Click]
    }

    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        require_computer(&req.tools)?;
        let tools = self.prepare_tools(&req.tools).await?;
        let resp = self
            .client
            .responses(ResponsesRequest {
                model: req.model.clone(),
                input: req.messages,
                tools,
                max_tokens: None,
            })
            .await?;
        Ok(StepResult { output: resp.output, usage: resp.usage })
    }

    async fn predict_click(
        &self,
        model: &str,
        image_b64: &str,
        instruction: &str,
    ) -> Result<Option<(u32, u32)>, LoopError> {
        let (width, height) = image_dimensions_b64(image_b64).unwrap_or((1024, 768));
        let input = vec![
            Item::Message {
                role: Role::User,
                content: MessageContent::Text(format!(
                    "{GROUNDING_PROMPT}\nTask: Click {instruction}. \
                     Output ONLY a click action on the target element."
                )),
            },
            Item::Message {
                role: Role::User,
                content: MessageContent::Parts(vec![ContentPart::input_image(png_data_url(
                    image_b64,
                ))]),
            },
        ];
        let tools = vec![json!({
            "type": "computer_use_preview",
            "display_width": width,
            "display_height": height,
            "environment": "linux",
        })];
        let resp = self
            .client
            .responses(ResponsesRequest {
                model: model.to_string(),
                input,
                tools,
                max_tokens: Some(200),
            })
            .await?;
        for item in &resp.output {
            if let Item::ComputerCall { action, .. } = item {
                if let Some((x, y)) = action.coordinate() {
                    return Ok(Some((x.max(0) as u32, y.max(0) as u32)));
                }
            }
        }
        Ok(None)
    }
}
