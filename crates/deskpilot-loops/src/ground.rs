// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Grounding: element descriptions ↔ screen coordinates.
//!
//! The composed loop is a two-pass compiler over the item stream.  The
//! planner emits a *plan IR* whose operands are natural-language element
//! descriptions; the grounding pass resolves each description against the
//! current screenshot; lowering substitutes the resolved coordinates to
//! produce dispatchable actions.  [`GroundingCache`] is the symbol table —
//! it also runs in reverse, so planner prompts show element semantics
//! instead of pixels the planner never produced.

use std::collections::HashMap;

use serde_json::{json, Value};

use deskpilot_items::{Action, Button, Point};

// ─── Grounding cache ──────────────────────────────────────────────────────────

/// Per-run mapping `element_description → (x, y)`, with reverse lookup by
/// rounded pixel position.  Created with the agent, appended by the
/// grounding pass, never mutated elsewhere.
#[derive(Debug, Default, Clone)]
pub struct GroundingCache {
    by_desc: HashMap<String, (f64, f64)>,
}

impl GroundingCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, description: impl Into<String>, x: f64, y: f64) {
        self.by_desc.insert(description.into(), (x, y));
    }

    pub fn get(&self, description: &str) -> Option<(f64, f64)> {
        self.by_desc.get(description).copied()
    }

    /// Reverse lookup: the description previously grounded at this pixel.
    pub fn description_at(&self, x: i64, y: i64) -> Option<&str> {
        self.by_desc
            .iter()
            .find(|(_, (cx, cy))| cx.round() as i64 == x && cy.round() as i64 == y)
            .map(|(d, _)| d.as_str())
    }

    pub fn len(&self) -> usize {
        self.by_desc.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_desc.is_empty()
    }
}

// ─── Plan IR ──────────────────────────────────────────────────────────────────

/// One planned action, element-description operands in place of pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanAction {
    Click { element_description: String, button: Button },
    DoubleClick { element_description: String },
    TripleClick { element_description: String },
    Move { element_description: String },
    Scroll { element_description: String, scroll_x: i64, scroll_y: i64 },
    Type { text: String },
    Keypress { keys: Vec<String> },
    Drag { start_element_description: String, end_element_description: String },
    Wait,
    Screenshot,
}

impl PlanAction {
    /// Parse the virtual computer tool's arguments.
    pub fn from_args(args: &Value) -> Option<Self> {
        let action = args.get("action")?.as_str()?;
        let desc = |key: &str| -> Option<String> {
            args.get(key).and_then(Value::as_str).map(str::to_string)
        };
        let num = |key: &str| args.get(key).and_then(Value::as_i64).unwrap_or(0);
        Some(match action {
            "click" => Self::Click {
                element_description: desc("element_description")?,
                button: args
                    .get("button")
                    .and_then(Value::as_str)
                    .map(Button::from_str_lossy)
                    .unwrap_or_default(),
            },
            "double_click" => Self::DoubleClick { element_description: desc("element_description")? },
            "triple_click" => Self::TripleClick { element_description: desc("element_description")? },
            "move" => Self::Move { element_description: desc("element_description")? },
            "scroll" => Self::Scroll {
                element_description: desc("element_description")?,
                scroll_x: num("scroll_x"),
                scroll_y: num("scroll_y"),
            },
            "type" => Self::Type { text: desc("text")? },
            "keypress" => Self::Keypress {
                keys: args
                    .get("keys")?
                    .as_array()?
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect(),
            },
            "drag" => Self::Drag {
                start_element_description: desc("start_element_description")?,
                end_element_description: desc("end_element_description")?,
            },
            "wait" => Self::Wait,
            "screenshot" => Self::Screenshot,
            _ => return None,
        })
    }

    /// Descriptions this action needs grounded, in operand order.
    pub fn descriptions(&self) -> Vec<&str> {
        match self {
            Self::Click { element_description, .. }
            | Self::DoubleClick { element_description }
            | Self::TripleClick { element_description }
            | Self::Move { element_description }
            | Self::Scroll { element_description, .. } => vec![element_description.as_str()],
            Self::Drag { start_element_description, end_element_description } => {
                vec![start_element_description.as_str(), end_element_description.as_str()]
            }
            _ => vec![],
        }
    }
}

/// Lower a planned action to a dispatchable one using the cache as symbol
/// table.  `Err` carries the first unresolved description.
pub fn lower_plan(plan: &PlanAction, cache: &GroundingCache) -> Result<Action, String> {
    let resolve = |desc: &str| -> Result<(i64, i64), String> {
        cache
            .get(desc)
            .map(|(x, y)| (x.round() as i64, y.round() as i64))
            .ok_or_else(|| desc.to_string())
    };
    Ok(match plan {
        PlanAction::Click { element_description, button } => {
            let (x, y) = resolve(element_description)?;
            Action::Click { x, y, button: *button }
        }
        PlanAction::DoubleClick { element_description } => {
            let (x, y) = resolve(element_description)?;
            Action::DoubleClick { x, y }
        }
        PlanAction::TripleClick { element_description } => {
            let (x, y) = resolve(element_description)?;
            Action::TripleClick { button: Button::Left, x, y }
        }
        PlanAction::Move { element_description } => {
            let (x, y) = resolve(element_description)?;
            Action::Move { x, y }
        }
        PlanAction::Scroll { element_description, scroll_x, scroll_y } => {
            let (x, y) = resolve(element_description)?;
            Action::Scroll { x, y, scroll_x: *scroll_x, scroll_y: *scroll_y }
        }
        PlanAction::Type { text } => Action::Type { text: text.clone() },
        PlanAction::Keypress { keys } => Action::Keypress { keys: keys.clone() },
        PlanAction::Drag { start_element_description, end_element_description } => {
            let (sx, sy) = resolve(start_element_description)?;
            let (ex, ey) = resolve(end_element_description)?;
            Action::Drag { path: vec![Point { x: sx, y: sy }, Point { x: ex, y: ey }] }
        }
        PlanAction::Wait => Action::Wait,
        PlanAction::Screenshot => Action::Screenshot,
    })
}

/// Rewrite a dispatched action back into plan-IR arguments for the planner's
/// view of history.  Falls back to the pixel form when the cache has no
/// description for a coordinate.
pub fn plan_args_for_action(action: &Action, cache: &GroundingCache) -> Value {
    let desc_for = |x: i64, y: i64| cache.description_at(x, y).map(str::to_string);
    match action {
        Action::Click { x, y, button } => match desc_for(*x, *y) {
            Some(d) => json!({"action": "click", "element_description": d, "button": button.as_str()}),
            None => json!({"action": "click", "x": x, "y": y, "button": button.as_str()}),
        },
        Action::DoubleClick { x, y } => match desc_for(*x, *y) {
            Some(d) => json!({"action": "double_click", "element_description": d}),
            None => json!({"action": "double_click", "x": x, "y": y}),
        },
        Action::TripleClick { x, y, .. } => match desc_for(*x, *y) {
            Some(d) => json!({"action": "triple_click", "element_description": d}),
            None => json!({"action": "triple_click", "x": x, "y": y}),
        },
        Action::Move { x, y } => match desc_for(*x, *y) {
            Some(d) => json!({"action": "move", "element_description": d}),
            None => json!({"action": "move", "x": x, "y": y}),
        },
        Action::Scroll { x, y, scroll_x, scroll_y } => match desc_for(*x, *y) {
            Some(d) => json!({
                "action": "scroll", "element_description": d,
                "scroll_x": scroll_x, "scroll_y": scroll_y
            }),
            None => json!({
                "action": "scroll", "x": x, "y": y,
                "scroll_x": scroll_x, "scroll_y": scroll_y
            }),
        },
        Action::Drag { path } => {
            let start = path.first();
            let end = path.last();
            match (
                start.and_then(|p| desc_for(p.x, p.y)),
                end.and_then(|p| desc_for(p.x, p.y)),
            ) {
                (Some(s), Some(e)) => json!({
                    "action": "drag",
                    "start_element_description": s,
                    "end_element_description": e
                }),
                _ => serde_json::to_value(action).unwrap_or_default(),
            }
        }
        other => {
            let mut v = serde_json::to_value(other).unwrap_or_default();
            if let Some(obj) = v.as_object_mut() {
                if let Some(t) = obj.remove("type") {
                    obj.insert("action".into(), t);
                }
            }
            v
        }
    }
}

// ─── Virtual tool schema ──────────────────────────────────────────────────────

/// The single virtual `computer` function tool shown to planner models.
///
/// Synthesized regardless of how many real computer handlers were passed —
/// the planner addresses elements by description, never by pixel.
pub fn virtual_computer_tool() -> Value {
    json!({
        "type": "function",
        "function": {
            "name": "computer",
            "description": "Control a computer by describing the UI element to act on. \
                            Describe elements precisely and uniquely, as a person pointing \
                            at the screen would.",
            "parameters": {
                "type": "object",
                "properties": {
                    "action": {
                        "type": "string",
                        "enum": [
                            "click", "double_click", "triple_click", "move", "scroll",
                            "type", "keypress", "drag", "wait", "screenshot"
                        ],
                        "description": "The action to perform."
                    },
                    "element_description": {
                        "type": "string",
                        "description": "Description of the target element, e.g. 'blue Save button in the toolbar'."
                    },
                    "start_element_description": {
                        "type": "string",
                        "description": "Drag start element (action=drag)."
                    },
                    "end_element_description": {
                        "type": "string",
                        "description": "Drag end element (action=drag)."
                    },
                    "button": {
                        "type": "string",
                        "enum": ["left", "right", "wheel", "back", "forward"],
                        "description": "Mouse button (action=click)."
                    },
                    "text": { "type": "string", "description": "Text to type (action=type)." },
                    "keys": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Keys to press together (action=keypress)."
                    },
                    "scroll_x": { "type": "integer", "description": "Horizontal scroll delta." },
                    "scroll_y": { "type": "integer", "description": "Vertical scroll delta." }
                },
                "required": ["action"]
            }
        }
    })
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
