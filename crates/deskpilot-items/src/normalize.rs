// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Repair of malformed or aliased action JSON.
//!
//! Models hallucinate near-miss action shapes: `left_click` instead of
//! `click`, `coordinate: [x, y]` instead of `x`/`y`, a bare `ctrl+c` string
//! where a key list belongs.  Repairing them here costs nothing; spending
//! another LLM turn on a self-correction does.  The rules are fixed and
//! idempotent — anything they cannot repair is rejected by the typed
//! [`Action`](crate::Action) parse afterwards, never silently coerced.

use serde_json::{json, Map, Value};

/// Mouse buttons recognized in `<button>_click` aliases.
const MOUSE_BUTTONS: &[&str] = &["left", "right", "wheel", "back", "forward"];

/// Aliases models use for `keypress`.
const KEYPRESS_ALIASES: &[&str] = &["hotkey", "key", "press", "key_press"];

/// Keys kept per action type; everything else is stripped.
fn allowed_keys(action_type: &str) -> Option<&'static [&'static str]> {
    Some(match action_type {
        "click" => &["type", "button", "x", "y"],
        "double_click" => &["type", "x", "y"],
        "triple_click" => &["type", "button", "x", "y"],
        "move" => &["type", "x", "y"],
        "scroll" => &["type", "scroll_x", "scroll_y", "x", "y"],
        "type" => &["type", "text"],
        "keypress" => &["type", "keys"],
        "drag" => &["type", "path"],
        "wait" => &["type"],
        "screenshot" => &["type"],
        "left_mouse_down" => &["type", "x", "y"],
        "left_mouse_up" => &["type", "x", "y"],
        _ => return None,
    })
}

fn as_i64_lossy(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_f64().map(|f| f.round() as i64))
}

/// Split a combined hotkey string: `"ctrl+c"` / `"ctrl-c"` → `["ctrl","c"]`.
/// Single characters (including `"+"` itself) stay whole.
fn split_hotkey(s: &str) -> Vec<String> {
    if s.chars().count() <= 1 {
        return vec![s.to_string()];
    }
    s.replace('-', "+").split('+').map(str::to_string).collect()
}

/// Apply the repair rules to one action object.  Non-objects pass through
/// untouched.  Idempotent: `repair_action(repair_action(x)) == repair_action(x)`.
pub fn repair_action(value: Value) -> Value {
    let Value::Object(mut action) = value else {
        return value;
    };

    let type_of = |a: &Map<String, Value>| -> Option<String> {
        a.get("type").and_then(Value::as_str).map(str::to_string)
    };

    // <button>_click → click + button
    if let Some(t) = type_of(&action) {
        for btn in MOUSE_BUTTONS {
            if t == format!("{btn}_click") {
                action.insert("type".into(), json!("click"));
                action.insert("button".into(), json!(btn));
                break;
            }
        }
    }
    // hotkey/key/press/key_press → keypress
    if let Some(t) = type_of(&action) {
        if KEYPRESS_ALIASES.contains(&t.as_str()) {
            action.insert("type".into(), json!("keypress"));
        }
    }
    // Infer missing type from characteristic fields.
    if !action.contains_key("type") {
        if action.contains_key("button") || action.contains_key("click") {
            action.insert("type".into(), json!("click"));
        } else if action.contains_key("scroll_x") || action.contains_key("scroll_y") {
            action.insert("type".into(), json!("scroll"));
        } else if action.contains_key("text") {
            action.insert("type".into(), json!("type"));
        }
    }

    // coordinate: [x, y] → x, y
    if let Some(coord) = action.remove("coordinate") {
        if let Some(arr) = coord.as_array() {
            if arr.len() == 2 {
                if let (Some(x), Some(y)) = (as_i64_lossy(&arr[0]), as_i64_lossy(&arr[1])) {
                    action.insert("x".into(), json!(x));
                    action.insert("y".into(), json!(y));
                }
            }
        }
    }

    let action_type = type_of(&action).unwrap_or_default();

    if action_type == "click" {
        // click: "right" → button: "right"; default button to left.
        if !action.contains_key("button") {
            if let Some(b) = action.remove("click") {
                action.insert("button".into(), b);
            }
        }
        if !action.contains_key("button") {
            action.insert("button".into(), json!("left"));
        }
    }
    if action_type == "scroll" {
        for k in ["scroll_x", "scroll_y"] {
            if !action.contains_key(k) {
                action.insert(k.into(), json!(0));
            }
        }
    }
    if action_type == "keypress" {
        // Normalize argument aliases, then ensure keys is a list.
        for alias in ["keypress", "key", "press", "key_press", "text"] {
            if let Some(v) = action.remove(alias) {
                action.insert("keys".into(), v);
            }
        }
        if let Some(Value::String(s)) = action.get("keys").cloned() {
            action.insert("keys".into(), json!(split_hotkey(&s)));
        }
    }

    // Round float coordinates.
    for k in ["x", "y", "scroll_x", "scroll_y"] {
        let rounded = match action.get(k) {
            Some(v) if v.is_f64() => as_i64_lossy(v),
            _ => None,
        };
        if let Some(i) = rounded {
            action.insert(k.into(), json!(i));
        }
    }

    // Strip keys outside the canonical schema for this type.
    if let Some(keep) = allowed_keys(&action_type) {
        let kept: Map<String, Value> = action
            .into_iter()
            .filter(|(k, _)| keep.contains(&k.as_str()))
            .collect();
        return Value::Object(kept);
    }

    Value::Object(action)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Action, Button};

    fn parses(value: Value) -> Action {
        serde_json::from_value(repair_action(value)).expect("repaired action must parse")
    }

    #[test]
    fn left_click_with_coordinate_becomes_click() {
        let a = parses(json!({"type": "left_click", "coordinate": [50, 60]}));
        assert_eq!(a, Action::Click { x: 50, y: 60, button: Button::Left });
    }

    #[test]
    fn right_click_alias_sets_button() {
        let a = parses(json!({"type": "right_click", "x": 1, "y": 2}));
        assert_eq!(a, Action::Click { x: 1, y: 2, button: Button::Right });
    }

    #[test]
    fn hotkey_alias_becomes_keypress_with_split_keys() {
        let a = parses(json!({"type": "hotkey", "key": "ctrl+c"}));
        assert_eq!(a, Action::Keypress { keys: vec!["ctrl".into(), "c".into()] });
    }

    #[test]
    fn dash_separated_hotkey_splits() {
        let a = parses(json!({"type": "keypress", "keys": "ctrl-shift-p"}));
        assert_eq!(
            a,
            Action::Keypress { keys: vec!["ctrl".into(), "shift".into(), "p".into()] }
        );
    }

    #[test]
    fn single_char_key_stays_whole() {
        let a = parses(json!({"type": "key", "keys": "c"}));
        assert_eq!(a, Action::Keypress { keys: vec!["c".into()] });
    }

    #[test]
    fn missing_type_inferred_from_button() {
        let a = parses(json!({"button": "left", "x": 3, "y": 4}));
        assert_eq!(a, Action::Click { x: 3, y: 4, button: Button::Left });
    }

    #[test]
    fn missing_type_inferred_from_text() {
        let a = parses(json!({"text": "hello"}));
        assert_eq!(a, Action::Type { text: "hello".into() });
    }

    #[test]
    fn scroll_defaults_filled() {
        let a = parses(json!({"type": "scroll", "x": 10, "y": 20}));
        assert_eq!(a, Action::Scroll { x: 10, y: 20, scroll_x: 0, scroll_y: 0 });
    }

    #[test]
    fn stray_fields_are_stripped() {
        let repaired = repair_action(json!({
            "type": "click", "x": 1, "y": 2, "button": "left",
            "element_description": "leftover", "confidence": 0.9
        }));
        let obj = repaired.as_object().unwrap();
        assert!(!obj.contains_key("element_description"));
        assert!(!obj.contains_key("confidence"));
    }

    #[test]
    fn float_coordinates_round_to_integers() {
        let a = parses(json!({"type": "click", "x": 50.6, "y": 59.4}));
        assert_eq!(a, Action::Click { x: 51, y: 59, button: Button::Left });
    }

    #[test]
    fn repair_is_idempotent() {
        let samples = vec![
            json!({"type": "left_click", "coordinate": [50, 60]}),
            json!({"type": "hotkey", "key": "ctrl+c"}),
            json!({"type": "scroll", "x": 1, "y": 2}),
            json!({"type": "wait"}),
            json!({"text": "abc"}),
        ];
        for s in samples {
            let once = repair_action(s);
            let twice = repair_action(once.clone());
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn unknown_type_passes_through_for_downstream_rejection() {
        let repaired = repair_action(json!({"type": "teleport", "x": 1}));
        assert_eq!(repaired["type"], "teleport");
        assert!(serde_json::from_value::<Action>(repaired).is_err());
    }
}
