// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-calling loop for Claude models.
//!
//! Claude is driven over the flat chat surface with a `computer` function
//! tool whose action vocabulary mirrors the `computer_20250124` tool:
//! `left_click`, `key`, `coordinate: [x, y]`, directional scrolling.  The
//! returned vocabulary is translated into the normalized action schema
//! before items are emitted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use deskpilot_computer::Environment;
use deskpilot_items::{
    chat_to_items, items_to_chat, normalize::repair_action, png_data_url, Action, ChatContent,
    ChatMessage, ChatPart, ChatRole, Item, COMPUTER_FUNCTION,
};
use deskpilot_model::{ChatRequest, CompletionClient};

use crate::{
    strategy::{require_computer, Capability, LoopStrategy, StepRequest, StepResult},
    LoopError, Tool,
};

pub struct AnthropicStrategy {
    client: Arc<dyn CompletionClient>,
}

impl AnthropicStrategy {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn computer_tool(width: u32, height: u32, environment: Environment) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": COMPUTER_FUNCTION,
                "description": format!(
                    "Use a mouse and keyboard to interact with a {} computer, and take \
                     screenshots. The screen's resolution is {width}x{height}. Always consult \
                     a screenshot to determine element coordinates before clicking, and aim \
                     for the center of each element.",
                    environment.as_str()
                ),
                "parameters": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": [
                                "key", "type", "mouse_move", "left_click", "left_click_drag",
                                "right_click", "middle_click", "double_click", "triple_click",
                                "scroll", "wait", "screenshot", "cursor_position",
                                "left_mouse_down", "left_mouse_up", "hold_key"
                            ],
                            "description": "The action to perform."
                        },
                        "coordinate": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "(x, y): pixel coordinates from the top-left corner."
                        },
                        "start_coordinate": {
                            "type": "array",
                            "items": { "type": "integer" },
                            "description": "Drag start (action=left_click_drag)."
                        },
                        "text": {
                            "type": "string",
                            "description": "Text to type, or a key combination like 'ctrl+s'."
                        },
                        "scroll_direction": {
                            "type": "string",
                            "enum": ["up", "down", "left", "right"]
                        },
                        "scroll_amount": { "type": "integer" },
                        "duration": { "type": "number", "description": "Seconds (action=wait/hold_key)." }
                    },
                    "required": ["action"]
                }
            }
        })
    }

    async fn prepare_tools(&self, tools: &[Tool]) -> Result<Vec<Value>, LoopError> {
        let handler = require_computer(tools)?;
        let (width, height) = handler.get_dimensions().await.unwrap_or((1024, 768));
        let environment = handler.get_environment().await.unwrap_or(Environment::Linux);
        let mut prepared = vec![Self::computer_tool(width, height, environment)];
        for tool in tools {
            if let Tool::Function(f) = tool {
                prepared.push(json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": f.parameters,
                    }
                }));
            }
        }
        Ok(prepared)
    }

    fn fold_output(message: &ChatMessage) -> Vec<Item> {
        let mut out = Vec::new();
        // Reuse the generic chat folding for text, then retranslate each
        // tool call through the Anthropic action vocabulary.
        let text_only = ChatMessage { tool_calls: vec![], ..message.clone() };
        out.extend(chat_to_items(std::slice::from_ref(&text_only)));
        for tc in &message.tool_calls {
            if tc.function.name == COMPUTER_FUNCTION {
                let args: Value =
                    serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                if let Some(action_value) = anthropic_args_to_action(&args) {
                    match serde_json::from_value::<Action>(repair_action(action_value)) {
                        Ok(action) => {
                            out.push(Item::computer_call(tc.id.clone(), action));
                            continue;
                        }
                        Err(e) => warn!(error = %e, "untranslatable computer action"),
                    }
                }
            }
            out.push(Item::FunctionCall {
                call_id: tc.id.clone(),
                name: tc.function.name.clone(),
                arguments: tc.function.arguments.clone(),
            });
        }
        out
    }
}

/// Translate Anthropic computer-tool arguments into the canonical action
/// object.  Returns `None` for unknown action names.
fn anthropic_args_to_action(args: &Value) -> Option<Value> {
    let action = args.get("action")?.as_str()?;
    let coord = |key: &str| -> Option<(i64, i64)> {
        let arr = args.get(key)?.as_array()?;
        Some((arr.first()?.as_i64()?, arr.get(1)?.as_i64()?))
    };
    let text = args.get("text").and_then(Value::as_str);

    Some(match action {
        "screenshot" => json!({"type": "screenshot"}),
        "wait" => json!({"type": "wait"}),
        "left_click" | "right_click" | "middle_click" => {
            let (x, y) = coord("coordinate")?;
            let button = match action {
                "right_click" => "right",
                "middle_click" => "wheel",
                _ => "left",
            };
            json!({"type": "click", "button": button, "x": x, "y": y})
        }
        "double_click" => {
            let (x, y) = coord("coordinate")?;
            json!({"type": "double_click", "x": x, "y": y})
        }
        "triple_click" => {
            let (x, y) = coord("coordinate")?;
            json!({"type": "triple_click", "button": "left", "x": x, "y": y})
        }
        "mouse_move" | "cursor_position" => {
            let (x, y) = coord("coordinate")?;
            json!({"type": "move", "x": x, "y": y})
        }
        "left_click_drag" => {
            let (sx, sy) = coord("start_coordinate")?;
            let (ex, ey) = coord("coordinate")?;
            json!({"type": "drag", "path": [{"x": sx, "y": sy}, {"x": ex, "y": ey}]})
        }
        "key" | "hold_key" => {
            json!({"type": "keypress", "keys": text?})
        }
        "type" => json!({"type": "type", "text": text?}),
        "scroll" => {
            let (x, y) = coord("coordinate")?;
            let amount = args.get("scroll_amount").and_then(Value::as_i64).unwrap_or(3);
            let (sx, sy) = match args.get("scroll_direction").and_then(Value::as_str) {
                Some("up") => (0, -amount),
                Some("left") => (-amount, 0),
                Some("right") => (amount, 0),
                _ => (0, amount),
            };
            json!({"type": "scroll", "x": x, "y": y, "scroll_x": sx, "scroll_y": sy})
        }
        "left_mouse_down" => {
            let (x, y) = coord("coordinate")?;
            json!({"type": "left_mouse_down", "x": x, "y": y})
        }
        "left_mouse_up" => {
            let (x, y) = coord("coordinate")?;
            json!({"type": "left_mouse_up", "x": x, "y": y})
        }
        _ => return None,
    })
}

#[async_trait]
impl LoopStrategy for AnthropicStrategy {
    fn name(&self) -> &'static str {
        "anthropic"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Step, Capability::Click]
    }

    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        let tools = self.prepare_tools(&req.tools).await?;
        // Claude accepts image blocks inside tool results.
        let messages = items_to_chat(&req.messages, true);
        let resp = self
            .client
            .chat(ChatRequest {
                model: req.model.clone(),
                messages,
                tools,
                max_tokens: Some(4096),
                temperature: None,
            })
            .await?;
        let output = resp.message().map(Self::fold_output).unwrap_or_default();
        Ok(StepResult { output, usage: resp.usage })
    }

    async fn predict_click(
        &self,
        model: &str,
        image_b64: &str,
        instruction: &str,
    ) -> Result<Option<(u32, u32)>, LoopError> {
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: ChatContent::Parts(vec![
                ChatPart::text(format!(
                    "Click {instruction}. Output ONLY a left_click action on the target \
                     element, via the computer tool."
                )),
                ChatPart::image(png_data_url(image_b64)),
            ]),
            tool_calls: vec![],
            tool_call_id: None,
        }];
        let (width, height) =
            crate::resize::image_dimensions_b64(image_b64).unwrap_or((1024, 768));
        let tools = vec![Self::computer_tool(width, height, Environment::Linux)];
        let resp = self
            .client
            .chat(ChatRequest {
                model: model.to_string(),
                messages,
                tools,
                max_tokens: Some(256),
                temperature: None,
            })
            .await?;
        let Some(message) = resp.message() else { return Ok(None) };
        for item in Self::fold_output(message) {
            if let Item::ComputerCall { action, .. } = item {
                if let Some((x, y)) = action.coordinate() {
                    return Ok(Some((x.max(0) as u32, y.max(0) as u32)));
                }
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_computer::ScriptedComputer;
    use deskpilot_items::Button;
    use deskpilot_model::ScriptedClient;

    fn step_req(tools: Vec<Tool>) -> StepRequest {
        StepRequest::new("anthropic/claude-sonnet-4", vec![Item::user("go")], tools)
    }

    #[tokio::test]
    async fn left_click_vocabulary_is_translated() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "toolu_1",
            "computer",
            r#"{"action":"left_click","coordinate":[100,200]}"#,
        ));
        let s = AnthropicStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s
            .predict_step(step_req(vec![Tool::Computer(Arc::new(ScriptedComputer::new()))]))
            .await
            .unwrap();
        assert_eq!(
            result.output,
            vec![Item::computer_call(
                "toolu_1",
                Action::Click { x: 100, y: 200, button: Button::Left }
            )]
        );
    }

    #[tokio::test]
    async fn key_combo_splits_into_key_list() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "toolu_2",
            "computer",
            r#"{"action":"key","text":"ctrl+s"}"#,
        ));
        let s = AnthropicStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s
            .predict_step(step_req(vec![Tool::Computer(Arc::new(ScriptedComputer::new()))]))
            .await
            .unwrap();
        assert_eq!(
            result.output,
            vec![Item::computer_call(
                "toolu_2",
                Action::Keypress { keys: vec!["ctrl".into(), "s".into()] }
            )]
        );
    }

    #[tokio::test]
    async fn scroll_direction_maps_to_signed_deltas() {
        let args = json!({
            "action": "scroll", "coordinate": [50, 60],
            "scroll_direction": "up", "scroll_amount": 5
        });
        let action = anthropic_args_to_action(&args).unwrap();
        assert_eq!(action["scroll_y"], -5);
        assert_eq!(action["scroll_x"], 0);
    }

    #[tokio::test]
    async fn drag_builds_two_point_path() {
        let args = json!({
            "action": "left_click_drag",
            "start_coordinate": [1, 2], "coordinate": [3, 4]
        });
        let value = anthropic_args_to_action(&args).unwrap();
        let action: Action = serde_json::from_value(repair_action(value)).unwrap();
        match action {
            Action::Drag { path } => {
                assert_eq!((path[0].x, path[0].y), (1, 2));
                assert_eq!((path[1].x, path[1].y), (3, 4));
            }
            other => panic!("expected drag, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_action_falls_back_to_function_call() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "toolu_3",
            "computer",
            r#"{"action":"levitate"}"#,
        ));
        let s = AnthropicStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s
            .predict_step(step_req(vec![Tool::Computer(Arc::new(ScriptedComputer::new()))]))
            .await
            .unwrap();
        assert!(matches!(&result.output[0], Item::FunctionCall { name, .. } if name == "computer"));
    }

    #[tokio::test]
    async fn missing_computer_tool_is_config_error() {
        let s = AnthropicStrategy::new(Arc::new(ScriptedClient::new()));
        assert!(matches!(
            s.predict_step(step_req(vec![])).await,
            Err(LoopError::Config(_))
        ));
    }

    #[tokio::test]
    async fn assistant_text_becomes_message_item() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::text_response("All done."));
        let s = AnthropicStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s
            .predict_step(step_req(vec![Tool::Computer(Arc::new(ScriptedComputer::new()))]))
            .await
            .unwrap();
        assert_eq!(result.output, vec![Item::assistant("All done.")]);
    }

    #[tokio::test]
    async fn predict_click_parses_tool_call() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "toolu_4",
            "computer",
            r#"{"action":"left_click","coordinate":[412,77]}"#,
        ));
        let s = AnthropicStrategy::new(client);
        let click = s
            .predict_click("anthropic/claude-sonnet-4", "QUJD", "the Save button")
            .await
            .unwrap();
        assert_eq!(click, Some((412, 77)));
    }
}
