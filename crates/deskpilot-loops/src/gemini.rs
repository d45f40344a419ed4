// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Tool-calling loop for Gemini computer-use models.
//!
//! Gemini's action set addresses the screen in a 0–999 normalized space and
//! includes browser-level verbs.  The tool schema excludes the predefined
//! functions a desktop handler cannot honor (`open_web_browser`, `search`,
//! `navigate`); coordinates are rescaled against the most recent
//! screenshot's dimensions before normalized items are emitted.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use deskpilot_items::{
    items_to_chat, latest_image_url, png_data_url, Action, Button, ChatContent, ChatMessage,
    ChatPart, ChatRole, Item, Point, COMPUTER_FUNCTION,
};
use deskpilot_model::{ChatRequest, CompletionClient};

use crate::{
    resize::{image_dimensions_b64, norm1000_to_screen},
    strategy::{require_computer, Capability, LoopStrategy, StepRequest, StepResult},
    LoopError, Tool,
};

/// Default scroll magnitude in the normalized space, matching the
/// provider-side default.
const DEFAULT_SCROLL_MAGNITUDE: f64 = 800.0;

pub struct GeminiStrategy {
    client: Arc<dyn CompletionClient>,
}

impl GeminiStrategy {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    fn computer_tool() -> Value {
        json!({
            "type": "function",
            "function": {
                "name": COMPUTER_FUNCTION,
                "description": "Interact with the computer screen. All coordinates are \
                                normalized to a 0-999 range on both axes.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "action": {
                            "type": "string",
                            "enum": [
                                "click_at", "hover_at", "type_text_at", "key_combination",
                                "scroll_document", "scroll_at", "wait_5_seconds",
                                "go_back", "go_forward", "drag_and_drop"
                            ]
                        },
                        "x": { "type": "integer", "description": "0-999 normalized x." },
                        "y": { "type": "integer", "description": "0-999 normalized y." },
                        "destination_x": { "type": "integer" },
                        "destination_y": { "type": "integer" },
                        "text": { "type": "string" },
                        "press_enter": { "type": "boolean" },
                        "keys": { "type": "string", "description": "Combination like 'ctrl+c'." },
                        "direction": { "type": "string", "enum": ["up", "down", "left", "right"] },
                        "magnitude": { "type": "integer", "description": "Scroll distance, 0-999 scale." }
                    },
                    "required": ["action"]
                }
            }
        })
    }

    /// Translate one Gemini tool call into zero or more normalized calls.
    /// Compound verbs (`type_text_at`) expand into a click/type/keypress
    /// sequence with suffixed call ids.
    fn translate_call(call_id: &str, args: &Value, screen: (u32, u32)) -> Option<Vec<Item>> {
        let action = args.get("action")?.as_str()?;
        let norm = |key_x: &str, key_y: &str| -> Option<(i64, i64)> {
            let x = args.get(key_x)?.as_f64()?;
            let y = args.get(key_y)?.as_f64()?;
            Some(norm1000_to_screen(x, y, screen))
        };
        let item = |action: Action| Item::computer_call(call_id.to_string(), action);

        Some(match action {
            "click_at" => {
                let (x, y) = norm("x", "y")?;
                vec![item(Action::Click { x, y, button: Button::Left })]
            }
            "hover_at" => {
                let (x, y) = norm("x", "y")?;
                vec![item(Action::Move { x, y })]
            }
            "type_text_at" => {
                let (x, y) = norm("x", "y")?;
                let text = args.get("text")?.as_str()?.to_string();
                let mut seq = vec![
                    Item::computer_call(
                        format!("{call_id}__click"),
                        Action::Click { x, y, button: Button::Left },
                    ),
                    Item::computer_call(call_id.to_string(), Action::Type { text }),
                ];
                if args.get("press_enter").and_then(Value::as_bool).unwrap_or(false) {
                    seq.push(Item::computer_call(
                        format!("{call_id}__enter"),
                        Action::Keypress { keys: vec!["Return".into()] },
                    ));
                }
                seq
            }
            "key_combination" => {
                let combo = args.get("keys")?.as_str()?;
                let keys = combo.split('+').map(str::to_string).collect();
                vec![item(Action::Keypress { keys })]
            }
            "scroll_document" | "scroll_at" => {
                let (x, y) = if action == "scroll_at" {
                    norm("x", "y")?
                } else {
                    (screen.0 as i64 / 2, screen.1 as i64 / 2)
                };
                let magnitude = args
                    .get("magnitude")
                    .and_then(Value::as_f64)
                    .unwrap_or(DEFAULT_SCROLL_MAGNITUDE);
                let dx = (magnitude * screen.0 as f64 / 1000.0).round() as i64;
                let dy = (magnitude * screen.1 as f64 / 1000.0).round() as i64;
                let (scroll_x, scroll_y) = match args.get("direction").and_then(Value::as_str) {
                    Some("up") => (0, -dy),
                    Some("left") => (-dx, 0),
                    Some("right") => (dx, 0),
                    _ => (0, dy),
                };
                vec![item(Action::Scroll { x, y, scroll_x, scroll_y })]
            }
            "wait_5_seconds" => vec![item(Action::Wait)],
            "go_back" => vec![item(Action::Keypress { keys: vec!["alt".into(), "Left".into()] })],
            "go_forward" => {
                vec![item(Action::Keypress { keys: vec!["alt".into(), "Right".into()] })]
            }
            "drag_and_drop" => {
                let (sx, sy) = norm("x", "y")?;
                let (ex, ey) = norm("destination_x", "destination_y")?;
                vec![item(Action::Drag {
                    path: vec![Point { x: sx, y: sy }, Point { x: ex, y: ey }],
                })]
            }
            _ => return None,
        })
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
impl LoopStrategy for GeminiStrategy {
    fn name(&self) -> &'static str {
        "gemini"
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
            if !text.is_empty() {
                output.push(Item::assistant(text));
            }
            for tc in &message.tool_calls {
                let args: Value =
                    serde_json::from_str(&tc.function.arguments).unwrap_or(Value::Null);
                match Self::translate_call(&tc.id, &args, screen) {
                    Some(items) if tc.function.name == COMPUTER_FUNCTION => output.extend(items),
                    _ => output.push(Item::FunctionCall {
                        call_id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    }),
                }
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
                    "Click {instruction}. Respond with exactly one click_at call."
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
            if let Some(items) = Self::translate_call(&tc.id, &args, screen) {
                for item in items {
                    if let Item::ComputerCall { action, .. } = item {
                        if let Some((x, y)) = action.coordinate() {
                            return Ok(Some((x.max(0) as u32, y.max(0) as u32)));
                        }
                    }
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

    fn req_with_computer(dims: (u32, u32)) -> StepRequest {
        StepRequest::new(
            "gemini/gemini-2.5-computer-use",
            vec![Item::user("go")],
            vec![Tool::Computer(Arc::new(ScriptedComputer::with_dimensions(dims.0, dims.1)))],
        )
    }

    #[tokio::test]
    async fn click_at_rescales_from_normalized_space() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "g1",
            "computer",
            r#"{"action":"click_at","x":500,"y":500}"#,
        ));
        let s = GeminiStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req_with_computer((1920, 1080))).await.unwrap();
        assert_eq!(
            result.output,
            vec![Item::computer_call(
                "g1",
                Action::Click { x: 960, y: 540, button: Button::Left }
            )]
        );
    }

    #[tokio::test]
    async fn type_text_at_expands_to_click_then_type() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "g2",
            "computer",
            r#"{"action":"type_text_at","x":0,"y":0,"text":"hello","press_enter":true}"#,
        ));
        let s = GeminiStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req_with_computer((1000, 1000))).await.unwrap();
        assert_eq!(result.output.len(), 3);
        assert!(matches!(
            &result.output[1],
            Item::ComputerCall { action: Action::Type { text }, .. } if text == "hello"
        ));
        assert!(matches!(
            &result.output[2],
            Item::ComputerCall { action: Action::Keypress { .. }, .. }
        ));
    }

    #[tokio::test]
    async fn scroll_document_targets_screen_center() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "g3",
            "computer",
            r#"{"action":"scroll_document","direction":"down"}"#,
        ));
        let s = GeminiStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req_with_computer((1000, 800))).await.unwrap();
        match &result.output[0] {
            Item::ComputerCall { action: Action::Scroll { x, y, scroll_y, .. }, .. } => {
                assert_eq!((*x, *y), (500, 400));
                assert!(*scroll_y > 0);
            }
            other => panic!("expected scroll, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn key_combination_splits_on_plus() {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "g4",
            "computer",
            r#"{"action":"key_combination","keys":"ctrl+shift+t"}"#,
        ));
        let s = GeminiStrategy::new(Arc::clone(&client) as Arc<dyn CompletionClient>);
        let result = s.predict_step(req_with_computer((1000, 1000))).await.unwrap();
        assert_eq!(
            result.output,
            vec![Item::computer_call(
                "g4",
                Action::Keypress { keys: vec!["ctrl".into(), "shift".into(), "t".into()] }
            )]
        );
    }

    #[tokio::test]
    async fn predict_click_uses_image_dimensions() {
        let img = image::RgbImage::from_pixel(200, 100, image::Rgb([0, 0, 0]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        use base64::Engine as _;
        let b64 = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());

        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::tool_call_response(
            "g5",
            "computer",
            r#"{"action":"click_at","x":500,"y":500}"#,
        ));
        let s = GeminiStrategy::new(client);
        let click = s
            .predict_click("gemini/gemini-2.5-computer-use", &b64, "center")
            .await
            .unwrap();
        assert_eq!(click, Some((100, 50)));
    }
}
