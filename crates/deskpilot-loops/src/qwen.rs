// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-calling loop for Qwen-VL models.
//!
//! Qwen reports coordinates in the space of the image its processor
//! actually consumed — both sides snapped by `smart_resize` — so every
//! coordinate is inverted back to screen space against the most recent
//! screenshot.  Some deployments emit the tool call as `<tool_call>` JSON
//! in the text stream instead of a structured call; both paths land in the
//! same translation.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Value};

use deskpilot_items::{
    items_to_chat, latest_image_url, png_data_url, Action, Button, ChatContent, ChatMessage,
    ChatPart, ChatRole, Item, Point, COMPUTER_FUNCTION,
};
use deskpilot_model::{ChatRequest, CompletionClient};

use crate::{
    resize::{
        image_dimensions_b64, model_to_screen, smart_resize, QWEN_FACTOR, QWEN_MAX_PIXELS,
        QWEN_MIN_PIXELS,
    },
    strategy::{require_computer, Capability, LoopStrategy, StepRequest, StepResult},
    LoopError, Tool,
};

pub struct QwenStrategy {
    client: Arc<dyn CompletionClient>,
    tool_call_re: Regex,
}

impl QwenStrategy {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self {
            client,
            tool_call_re: Regex::new(r"(?s)<tool_call>\s*(\{.*?\})\s*</tool_call>")
                .expect("static regex"),
        }
    }

    fn computer_tool() -> Value {
        json!({
            "type": "function",
            "function": {
                "name": COMPUTER_FUNCTION,
                "description": "Use a mouse and keyboard to interact with a computer, and \
                                take screenshots. Consult a screenshot to determine element \
                                coordinates before moving the cursor, and click with the \
                                cursor tip in the center of the element.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": [
                                "key", "type", "mouse_move", "left_click", "left_click_drag",
                                "right_click", "middle_click", "double_click", "triple_click",
                                "scroll", "hscroll", "screenshot", "wait"
                            ],
                            "description": "The action to perform."
                        },
                        "keys": {
                            "type": "array",
                            "items": { "type": "string" },
                            "description": "Required only by action=key."
                        },
                        "text": { "type": "string", "description": "Required only by action=type." },
                        "coordinate": {
                            "type": "array",
                            "items": { "type": "number" },
                            "minItems": 2,
                            "maxItems": 2,
                            "description": "(x, y): pixel coordinates from top-left."
                        },
                        "pixels": {
                            "type": "number",
                            "description": "Scroll amount. Positive=up, negative=down."
                        },
                        "time": { "type": "number", "description": "Seconds to wait (action=wait)." }
                    },
                    "required": ["action"]
                }
            }
        })
    }

    /// Model-space `(width, height)` Qwen consumed for the given screen.
    fn model_dims(screen: (u32, u32)) -> (u32, u32) {
        let (w, h) = screen;
        let (rh, rw) = smart_resize(h, w, QWEN_FACTOR, QWEN_MIN_PIXELS, QWEN_MAX_PIXELS);
        (rw, rh)
    }

    /// Translate Qwen tool arguments into a normalized action, inverting
    /// model-space coordinates to screen space.
    fn translate_args(args: &Value, screen: (u32, u32)) -> Option<Action> {
        let action = args.get("action")?.as_str()?;
        let model = Self::model_dims(screen);
        let coord = || -> Option<(i64, i64)> {
            let arr = args.get("coordinate")?.as_array()?;
            let x = arr.first()?.as_f64()?;
            let y = arr.get(1)?.as_f64()?;
            Some(model_to_screen(x, y, model, screen))
        };
        let pixels = args.get("pixels").and_then(Value::as_f64).unwrap_or(0.0) as i64;

        Some(match action {
            "key" => Action::Keypress {
                keys: args
                    .get("keys")?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            },
            "type" => Action::Type { text: args.get("text")?.as_str()?.to_string() },
            "mouse_move" => {
                let (x, y) = coord()?;
                Action::Move { x, y }
            }
            "left_click" | "right_click" | "middle_click" => {
                let (x, y) = coord()?;
                let button = match action {
                    "right_click" => Button::Right,
                    "middle_click" => Button::Wheel,
                    _ => Button::Left,
                };
                Action::Click { x, y, button }
            }
            "double_click" => {
                let (x, y) = coord()?;
                Action::DoubleClick { x, y }
            }
            "triple_click" => {
                let (x, y) = coord()?;
                Action::TripleClick { button: Button::Left, x, y }
            }
            "left_click_drag" => {
                let (x, y) = coord()?;
                Action::Drag { path: vec![Point { x, y }] }
            }
            "scroll" => {
                let (x, y) = coord().unwrap_or((screen.0 as i64 / 2, screen.1 as i64 / 2));
                // Positive pixels scroll up in Qwen's convention.
                Action::Scroll { x, y, scroll_x: 0, scroll_y: -pixels }
            }
            "hscroll" => {
                let (x, y) = coord().unwrap_or((screen.0 as i64 / 2, screen.1 as i64 / 2));
                Action::Scroll { x, y, scroll_x: pixels, scroll_y: 0 }
            }
            "screenshot" => Action::Screenshot,
            "wait" => Action::Wait,
            _ => return None,
        })
    }

    /// Fallback for deployments that write the tool call into the text
    /// stream as `<tool_call>{…}</tool_call>`.
    fn parse_tool_call_from_text(&self, text: &str) -> Option<Value> {
        let caps = self.tool_call_re.captures(text)?;
        let parsed: Value = serde_json::from_str(caps.get(1)?.as_str()).ok()?;
        // Either {"name": "computer", "arguments": {...}} or bare arguments.
        if let Some(arguments) = parsed.get("arguments") {
            Some(arguments.clone())
        } else {
            Some(parsed)
        }
    }

    async fn screen_dims(&self, req: &StepRequest) -> (u32, u32) {
        if let Some(url) = latest_image_url(&req.messages) {
            if let Some(dims) = image_dimensions_b64(url) {
                return dims;
            }
        }
        if let Ok(handler) = require_computer(&req.tools) {
            if let Ok(dims) = handler.get_dimensions().await {
                return dims;
            }
        }
        (1024, 768)
    }
}

#[async_trait]
impl LoopStrategy for QwenStrategy {
    fn name(&self) -> &'static str {
        "qwen"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Step, Capability::Click]
    }

    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        require_computer(&req.tools)?;
        let screen = self.screen_dims(&req).await;
        let mut tools = vec![Self::computer_tool()];
        for tool in &req.tools {
            if let Tool::Function(f) = tool {
                tools.push(json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": f.parameters,
                    }
                }));
            }
        }
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

        let mut output = Vec::new();
        if let Some(message) = resp.message() {
            let text = match &message.content {
                ChatContent::Text(t) => t.clone(),
                ChatContent::Parts(_) => String::new(),
            };
            let mut emitted_call = false;
            for tc in &message.tool_calls {
                let args: Value =
                    serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                if tc.function.name == COMPUTER_FUNCTION {
                    if let Some(action) = Self::translate_args(&args, screen) {
                        output.push(Item::computer_call(tc.id.clone(), action));
                        emitted_call = true;
                        continue;
                    }
                }
                output.push(Item::FunctionCall {
                    call_id: tc.id.clone(),
                    name: tc.function.name.clone(),
                    arguments: tc.function.arguments.clone(),
                });
                emitted_call = true;
            }
            // Text-embedded tool call, only when nothing structured arrived.
            if !emitted_call {
                if let Some(args) = self.parse_tool_call_from_text(&text) {
                    if let Some(action) = Self::translate_args(&args, screen) {
                        let call_id = format!("qwen_{}", uuid::Uuid::new_v4().simple());
                        output.push(Item::computer_call(call_id, action));
                        emitted_call = true;
                    }
                }
            }
            if !text.is_empty() && !emitted_call {
                output.push(Item::assistant(text));
            }
        }
        Ok(StepResult { output, usage: resp.usage })
    }

    async fn predict_click(
        &self,
        model: &str,
        image_b64: &str,
        instruction: &str,
    ) -> Result<Option<(u32, u32)>, LoopError> {
        let screen = image_dimensions_b64(image_b64).unwrap_or((1024, 768));
        let messages = vec![ChatMessage {
            role: ChatRole::User,
            content: ChatContent::Parts(vec![
                ChatPart::text(format!(
                    "Click {instruction}. Respond with exactly one left_click action."
                )),
                ChatPart::image(png_data_url(image_b64)),
            ]),
            tool_calls: vec![],
            tool_call_id: None,
        }];
        let resp = self
            .client
            .chat(ChatRequest {
                model: model.to_string(),
                messages,
                tools: vec![Self::computer_tool()],
                max_tokens: Some(256),
                temperature: None,
            })
            .await?;
        let Some(message) = resp.message() else { return Ok(None) };
        for tc in &message.tool_calls {
            let args: Value = serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
            if let Some(action) = Self::translate_args(&args, screen) {
                if let Some((x, y)) = action.coordinate() {
                    return Ok(Some((x.max(0) as u32, y.max(0) as u32)));
                }
            }
        }
        let text = match &message.content {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Parts(_) => String::new(),
        };
        if let Some(args) = self.parse_tool_call_from_text(&text) {
            if let Some(action) = Self::translate_args(&args, screen) {
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
    use deskpilot_model::ScriptedClient;

    fn req(dims: (u32, u32)) -> StepRequest {
        StepRequest::new(
            "dashscope/qwen3-vl-plus",
            vec![Item::user("go")],
            vec![Tool::Computer(Arc::new(ScriptedComputer::with_dimensions(dims.0, dims.1)))],
        )
    }

    #[tokio::test]
    async fn identity_mapping_when_screen_already_snapped() {
        // 1024×768 is already a multiple of 32 within the pixel budget, so
        // model space equals screen space and coordinates pass through.
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "q1",
            "computer",
            r#"{"action":"left_click","coordinate":[512,384]}"#,
        ));
        let s = QwenStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req((1024, 768))).await.unwrap();
        assert_eq!(
            result.output,
            vec![Item::computer_call(
                "q1",
                Action::Click { x: 512, y: 384, button: Button::Left }
            )]
        );
    }

    #[test]
    fn coordinates_invert_through_smart_resize_space() {
        // An 8K screen exceeds the processor's pixel budget and is shrunk;
        // a model-space center must map back to the screen center.
        let screen = (7680, 4320);
        let (mw, mh) = QwenStrategy::model_dims(screen);
        assert!(mw < 7680);
        let args = json!({
            "action": "left_click",
            "coordinate": [mw as f64 / 2.0, mh as f64 / 2.0]
        });
        let action = QwenStrategy::translate_args(&args, screen).unwrap();
        let (x, y) = action.coordinate().unwrap();
        assert!((x - 3840).abs() <= 2, "x={x}");
        assert!((y - 2160).abs() <= 2, "y={y}");
    }

    #[test]
    fn scroll_pixels_positive_means_up() {
        let args = json!({"action": "scroll", "coordinate": [100, 100], "pixels": 40});
        let action = QwenStrategy::translate_args(&args, (1024, 768)).unwrap();
        match action {
            Action::Scroll { scroll_y, .. } => assert_eq!(scroll_y, -40),
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[test]
    fn key_action_collects_key_list() {
        let args = json!({"action": "key", "keys": ["ctrl", "c"]});
        assert_eq!(
            QwenStrategy::translate_args(&args, (1024, 768)).unwrap(),
            Action::Keypress { keys: vec!["ctrl".into(), "c".into()] }
        );
    }

    #[tokio::test]
    async fn text_embedded_tool_call_is_parsed() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::text_response(
            "I will click it now.\n<tool_call>\n{\"name\": \"computer\", \"arguments\": \
             {\"action\": \"left_click\", \"coordinate\": [256, 256]}}\n</tool_call>",
        ));
        let s = QwenStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req((1024, 768))).await.unwrap();
        assert_eq!(result.output.len(), 1);
        assert!(matches!(
            &result.output[0],
            Item::ComputerCall { action: Action::Click { x: 256, y: 256, .. }, .. }
        ));
    }

    #[tokio::test]
    async fn plain_text_stays_a_message() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::text_response("Task complete."));
        let s = QwenStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req((1024, 768))).await.unwrap();
        assert_eq!(result.output, vec![Item::assistant("Task complete.")]);
    }
}
