// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Grounded vision backends: models that answer with pixel coordinates in
//! free-form text instead of structured tool calls.
//!
//! Each family has its own output dialect and coordinate space:
//!
//! | family    | dialect                                  | space            |
//! |-----------|------------------------------------------|------------------|
//! | UI-TARS   | `Action: click(start_box='(x,y)')`       | 0–1000           |
//! | Holo      | `{"x": …, "y": …}`                       | smart_resize(28) |
//! | InternVL  | `[[x,y]]`                                | 0–1000           |
//! | OpenCUA   | `pyautogui.click(x=…, y=…)`              | screen pixels    |
//! | Moondream | `{"points": [{"x": 0–1, "y": 0–1}]}`     | 0–1 fractions    |
//!
//! All but UI-TARS are click-only; a step request against them goes through
//! the composed loop's self-composition instead.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::Value;

use deskpilot_items::{
    items_to_chat, latest_image_url, png_data_url, Action, Button, ChatContent, ChatMessage,
    ChatPart, ChatRole, Item, Point, SummaryPart,
};
use deskpilot_model::{ChatRequest, CompletionClient};

use crate::{
    resize::{image_dimensions_b64, model_to_screen, norm1000_to_screen, smart_resize},
    strategy::{Capability, LoopStrategy, StepRequest, StepResult},
    LoopError,
};

/// Patch multiple used by Holo's image processor.
const HOLO_FACTOR: u32 = 28;
const HOLO_MIN_PIXELS: u32 = 3136;
const HOLO_MAX_PIXELS: u32 = 12_845_056;

/// Scroll delta emitted for UI-TARS directional scrolls.
const UITARS_SCROLL_DELTA: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroundedFamily {
    UiTars,
    Holo,
    InternVl,
    OpenCua,
    Moondream,
}

impl GroundedFamily {
    fn grounding_prompt(&self, instruction: &str) -> String {
        match self {
            Self::UiTars => format!(
                "Output only the coordinate of one point in your response. \
                 What element matches the following task: {instruction}"
            ),
            Self::Holo => format!(
                "Localize an element on the GUI image according to the provided target. \
                 Reply with exactly one JSON object {{\"x\": int, \"y\": int}}.\n\
                 Target: {instruction}"
            ),
            Self::InternVl => format!(
                "Please provide the coordinate [[x,y]] (normalized to 0-1000) of the \
                 element described by: {instruction}"
            ),
            Self::OpenCua => format!(
                "You need to perform pyautogui actions to complete the task. \
                 Click {instruction}. Answer with a single pyautogui.click call."
            ),
            Self::Moondream => format!("Point: {instruction}"),
        }
    }

    /// Parse the model's answer into screen coordinates.
    fn parse_click(&self, text: &str, screen: (u32, u32)) -> Option<(u32, u32)> {
        let clamp = |(x, y): (i64, i64)| -> (u32, u32) { (x.max(0) as u32, y.max(0) as u32) };
        match self {
            Self::UiTars => {
                let (x, y) = parse_box_point(text)?;
                Some(clamp(norm1000_to_screen(x, y, screen)))
            }
            Self::Holo => {
                let v = first_json_object(text)?;
                let x = v.get("x")?.as_f64()?;
                let y = v.get("y")?.as_f64()?;
                let (w, h) = screen;
                let (mh, mw) = smart_resize(h, w, HOLO_FACTOR, HOLO_MIN_PIXELS, HOLO_MAX_PIXELS);
                Some(clamp(model_to_screen(x, y, (mw, mh), screen)))
            }
            Self::InternVl => {
                let re = Regex::new(r"\[\[\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\]\]")
                    .expect("static regex");
                let caps = re.captures(text)?;
                let x: f64 = caps[1].parse().ok()?;
                let y: f64 = caps[2].parse().ok()?;
                Some(clamp(norm1000_to_screen(x, y, screen)))
            }
            Self::OpenCua => {
                let re = Regex::new(r"pyautogui\.click\(x=(\d+),\s*y=(\d+)\)").expect("static regex");
                let caps = re.captures(text)?;
                Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
            }
            Self::Moondream => {
                let v = first_json_object(text)?;
                let point = v
                    .get("points")
                    .and_then(Value::as_array)
                    .and_then(|a| a.first().cloned())
                    .unwrap_or(v);
                let x = point.get("x")?.as_f64()?;
                let y = point.get("y")?.as_f64()?;
                let (w, h) = screen;
                Some(clamp((
                    (x * w as f64).round() as i64,
                    (y * h as f64).round() as i64,
                )))
            }
        }
    }
}

/// `(x,y)` from `start_box='(x,y)'`, `<|box_start|>(x,y)<|box_end|>`, or a
/// bare `(x,y)` pair.
fn parse_box_point(text: &str) -> Option<(f64, f64)> {
    let re = Regex::new(r"\(\s*(\d+(?:\.\d+)?)\s*,\s*(\d+(?:\.\d+)?)\s*\)").expect("static regex");
    let caps = re.captures(text)?;
    Some((caps[1].parse().ok()?, caps[2].parse().ok()?))
}

/// First balanced `{…}` object in the text that parses as JSON.
fn first_json_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    for (i, ch) in text[start..].char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return serde_json::from_str(&text[start..start + i + 1]).ok();
                }
            }
            _ => {}
        }
    }
    None
}

pub struct GroundedStrategy {
    client: Arc<dyn CompletionClient>,
    family: GroundedFamily,
}

impl GroundedStrategy {
    pub fn new(client: Arc<dyn CompletionClient>, family: GroundedFamily) -> Self {
        Self { client, family }
    }

    /// Parse one UI-TARS `Thought: … Action: …` turn into items.
    fn parse_uitars_step(text: &str, screen: (u32, u32)) -> Vec<Item> {
        let mut out = Vec::new();
        let thought = Regex::new(r"(?s)Thought:\s*(.*?)\s*(?:Action:|$)")
            .expect("static regex")
            .captures(text)
            .map(|c| c[1].trim().to_string())
            .filter(|t| !t.is_empty());
        if let Some(thought) = thought {
            out.push(Item::Reasoning {
                summary: vec![SummaryPart::SummaryText { text: thought }],
            });
        }

        let action_line = Regex::new(r"(?s)Action:\s*(.+)$")
            .expect("static regex")
            .captures(text)
            .map(|c| c[1].trim().to_string());
        let Some(line) = action_line else {
            if out.is_empty() && !text.trim().is_empty() {
                out.push(Item::assistant(text.trim()));
            }
            return out;
        };

        let call_id = format!("uitars_{}", uuid::Uuid::new_v4().simple());
        let point = |segment: &str| -> Option<(i64, i64)> {
            parse_box_point(segment).map(|(x, y)| norm1000_to_screen(x, y, screen))
        };
        let content_of = |line: &str| -> Option<String> {
            Regex::new(r"(?s)(?:content|key)='(.*?)'\s*\)")
                .expect("static regex")
                .captures(line)
                .map(|c| c[1].replace("\\n", "\n").replace("\\'", "'"))
        };

        let action = if line.starts_with("click") {
            point(&line).map(|(x, y)| Action::Click { x, y, button: Button::Left })
        } else if line.starts_with("left_double") {
            point(&line).map(|(x, y)| Action::DoubleClick { x, y })
        } else if line.starts_with("right_single") {
            point(&line).map(|(x, y)| Action::Click { x, y, button: Button::Right })
        } else if line.starts_with("drag") {
            let re = Regex::new(r"start_box='([^']*)'.*end_box='([^']*)'").expect("static regex");
            re.captures(&line).and_then(|c| {
                let s = point(&c[1])?;
                let e = point(&c[2])?;
                Some(Action::Drag {
                    path: vec![Point { x: s.0, y: s.1 }, Point { x: e.0, y: e.1 }],
                })
            })
        } else if line.starts_with("hotkey") {
            content_of(&line).map(|keys| Action::Keypress {
                keys: keys.split_whitespace().map(str::to_string).collect(),
            })
        } else if line.starts_with("type") {
            content_of(&line).map(|text| Action::Type { text })
        } else if line.starts_with("scroll") {
            point(&line).map(|(x, y)| {
                let down = line.contains("down");
                let delta = if down { UITARS_SCROLL_DELTA } else { -UITARS_SCROLL_DELTA };
                Action::Scroll { x, y, scroll_x: 0, scroll_y: delta }
            })
        } else if line.starts_with("wait") {
            Some(Action::Wait)
        } else if line.starts_with("finished") {
            let content = content_of(&line).unwrap_or_else(|| "Task finished.".into());
            out.push(Item::assistant(content));
            None
        } else {
            None
        };

        if let Some(action) = action {
            out.push(Item::computer_call(call_id, action));
        }
        out
    }
}

#[async_trait]
impl LoopStrategy for GroundedStrategy {
    fn name(&self) -> &'static str {
        "grounded"
    }

    fn capabilities(&self) -> &[Capability] {
        match self.family {
            GroundedFamily::UiTars => &[Capability::Step, Capability::Click],
            _ => &[Capability::Click],
        }
    }

    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        if self.family != GroundedFamily::UiTars {
            return Err(LoopError::StepUnsupported(req.model.clone()));
        }
        let screen = latest_image_url(&req.messages)
            .and_then(image_dimensions_b64)
            .unwrap_or((1024, 768));
        let mut messages = vec![ChatMessage::text(
            ChatRole::System,
            "You are a GUI agent. For each step, output your reasoning as \
             'Thought: …' followed by exactly one 'Action: …' from the action space: \
             click(start_box='(x,y)'), left_double(start_box='(x,y)'), \
             right_single(start_box='(x,y)'), drag(start_box='(x,y)', end_box='(x,y)'), \
             hotkey(key='ctrl c'), type(content='…'), scroll(start_box='(x,y)', \
             direction='down'), wait(), finished(content='…'). Coordinates are \
             normalized to 0-1000.",
        )];
        messages.extend(items_to_chat(&req.messages, true));
        let resp = self
            .client
            .chat(ChatRequest {
                model: req.model.clone(),
                messages,
                tools: vec![],
                max_tokens: Some(1024),
                temperature: None,
            })
            .await?;
        let output = resp
            .message()
            .map(|m| {
                let text = match &m.content {
                    ChatContent::Text(t) => t.clone(),
                    ChatContent::Parts(_) => String::new(),
                };
                Self::parse_uitars_step(&text, screen)
            })
            .unwrap_or_default();
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
                ChatPart::text(self.family.grounding_prompt(instruction)),
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
                tools: vec![],
                max_tokens: Some(256),
                temperature: None,
            })
            .await?;
        let Some(message) = resp.message() else { return Ok(None) };
        let text = match &message.content {
            ChatContent::Text(t) => t.clone(),
            ChatContent::Parts(_) => String::new(),
        };
        Ok(self.family.parse_click(&text, screen))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_model::ScriptedClient;

    async fn click_for(family: GroundedFamily, answer: &str) -> Option<(u32, u32)> {
        let client = Arc::new(ScriptedClient::new());
        client.push_chat(ScriptedClient::text_response(answer));
        let s = GroundedStrategy::new(client, family);
        // 1×1 png would skew rescale tests; use known dims via a generated image.
        let img = image::RgbImage::from_pixel(1000, 1000, image::Rgb([0, 0, 0]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        use base64::Engine as _;
        let b64 = base64::engine::general_purpose::STANDARD.encode(buf.into_inner());
        s.predict_click("m", &b64, "target").await.unwrap()
    }

    #[tokio::test]
    async fn uitars_parses_box_point_in_norm_space() {
        let click = click_for(GroundedFamily::UiTars, "click(start_box='(500,250)')").await;
        assert_eq!(click, Some((500, 250)));
    }

    #[tokio::test]
    async fn internvl_parses_double_bracket_point() {
        let click = click_for(GroundedFamily::InternVl, "The element is at [[120, 460]].").await;
        assert_eq!(click, Some((120, 460)));
    }

    #[tokio::test]
    async fn opencua_parses_pyautogui_click() {
        let click = click_for(GroundedFamily::OpenCua, "pyautogui.click(x=812, y=330)").await;
        assert_eq!(click, Some((812, 330)));
    }

    #[tokio::test]
    async fn moondream_scales_fractional_points() {
        let click =
            click_for(GroundedFamily::Moondream, r#"{"points": [{"x": 0.25, "y": 0.5}]}"#).await;
        assert_eq!(click, Some((250, 500)));
    }

    #[tokio::test]
    async fn holo_parses_json_point() {
        // 1000×1000 is not a multiple of 28; Holo's processor snaps it, so
        // the parsed point lands near (but not exactly at) the raw value.
        let click = click_for(GroundedFamily::Holo, r#"{"x": 500, "y": 500}"#).await;
        let (x, y) = click.unwrap();
        assert!((x as i64 - 500).abs() < 30, "x={x}");
        assert!((y as i64 - 500).abs() < 30, "y={y}");
    }

    #[tokio::test]
    async fn unparseable_answer_is_none() {
        let click = click_for(GroundedFamily::Holo, "I cannot find that element.").await;
        assert_eq!(click, None);
    }

    #[test]
    fn uitars_step_parses_thought_and_click() {
        let items = GroundedStrategy::parse_uitars_step(
            "Thought: The Save button is in the toolbar.\nAction: click(start_box='(412,77)')",
            (1000, 1000),
        );
        assert_eq!(items.len(), 2);
        assert!(matches!(items[0], Item::Reasoning { .. }));
        assert!(matches!(
            &items[1],
            Item::ComputerCall { action: Action::Click { x: 412, y: 77, .. }, .. }
        ));
    }

    #[test]
    fn uitars_step_parses_hotkey_and_type() {
        let items = GroundedStrategy::parse_uitars_step(
            "Action: hotkey(key='ctrl s')",
            (1000, 1000),
        );
        assert!(matches!(
            &items[0],
            Item::ComputerCall { action: Action::Keypress { keys }, .. }
                if keys == &vec!["ctrl".to_string(), "s".to_string()]
        ));

        let items = GroundedStrategy::parse_uitars_step(
            "Action: type(content='hello world')",
            (1000, 1000),
        );
        assert!(matches!(
            &items[0],
            Item::ComputerCall { action: Action::Type { text }, .. } if text == "hello world"
        ));
    }

    #[test]
    fn uitars_finished_becomes_assistant_message() {
        let items = GroundedStrategy::parse_uitars_step(
            "Thought: Done.\nAction: finished(content='Saved the file.')",
            (1000, 1000),
        );
        assert!(items
            .iter()
            .any(|i| matches!(i, Item::Message { .. })));
        assert!(!items.iter().any(|i| matches!(i, Item::ComputerCall { .. })));
    }

    #[tokio::test]
    async fn step_unsupported_for_click_only_families() {
        let s = GroundedStrategy::new(Arc::new(ScriptedClient::new()), GroundedFamily::Holo);
        let req = StepRequest::new("huggingface/Hcompany/Holo1.5-7B", vec![], vec![]);
        assert!(matches!(
            s.predict_step(req).await,
            Err(LoopError::StepUnsupported(_))
        ));
    }
}
