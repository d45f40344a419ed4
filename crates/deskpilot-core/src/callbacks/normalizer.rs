// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use deskpilot_items::{normalize::repair_action, Action, Item, COMPUTER_FUNCTION};

use super::Callback;

/// Repairs aliased or malformed computer actions in model output.
///
/// Strategies emit a `function_call` named `computer` when the provider's
/// arguments do not parse as a normalized action.  This callback applies
/// the fixed repair rules to those arguments and, when the result parses,
/// rewrites the item into a proper `computer_call` — avoiding an extra LLM
/// round just to fix `left_click` / `coordinate: [x, y]` shapes.  Already
/// well-formed calls pass through byte-identical, which makes the pass
/// idempotent.
pub struct OperatorNormalizer;

impl OperatorNormalizer {
    fn repair_item(item: Item) -> Item {
        match item {
            Item::FunctionCall { call_id, name, arguments } if name == COMPUTER_FUNCTION => {
                let parsed: Option<Action> = serde_json::from_str::<Value>(&arguments)
                    .ok()
                    .map(repair_action)
                    .and_then(|v| serde_json::from_value(v).ok());
                match parsed {
                    Some(action) => {
                        debug!(call_id, "repaired malformed computer action");
                        Item::computer_call(call_id, action)
                    }
                    None => Item::FunctionCall { call_id, name, arguments },
                }
            }
            // Typed actions are canonical by construction; re-serializing
            // through the repair rules is a no-op and stays that way.
            other => other,
        }
    }
}

#[async_trait]
impl Callback for OperatorNormalizer {
    async fn on_llm_end(&self, items: Vec<Item>) -> Vec<Item> {
        items.into_iter().map(Self::repair_item).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskpilot_items::Button;

    #[tokio::test]
    async fn left_click_coordinate_shape_becomes_computer_call() {
        let items = vec![Item::FunctionCall {
            call_id: "c1".into(),
            name: "computer".into(),
            arguments: r#"{"type":"left_click","coordinate":[50,60]}"#.into(),
        }];
        let out = OperatorNormalizer.on_llm_end(items).await;
        assert_eq!(
            out,
            vec![Item::computer_call(
                "c1",
                Action::Click { x: 50, y: 60, button: Button::Left }
            )]
        );
    }

    #[tokio::test]
    async fn unrepairable_arguments_stay_function_call() {
        let items = vec![Item::FunctionCall {
            call_id: "c1".into(),
            name: "computer".into(),
            arguments: r#"{"type":"teleport"}"#.into(),
        }];
        let out = OperatorNormalizer.on_llm_end(items.clone()).await;
        assert_eq!(out, items);
    }

    #[tokio::test]
    async fn other_function_calls_untouched() {
        let items = vec![Item::FunctionCall {
            call_id: "c1".into(),
            name: "search".into(),
            arguments: r#"{"type":"left_click","coordinate":[1,2]}"#.into(),
        }];
        let out = OperatorNormalizer.on_llm_end(items.clone()).await;
        assert_eq!(out, items);
    }

    #[tokio::test]
    async fn normalization_is_idempotent() {
        let items = vec![
            Item::FunctionCall {
                call_id: "c1".into(),
                name: "computer".into(),
                arguments: r#"{"type":"hotkey","key":"ctrl+c"}"#.into(),
            },
            Item::computer_call("c2", Action::Wait),
            Item::user("hello"),
        ];
        let once = OperatorNormalizer.on_llm_end(items).await;
        let twice = OperatorNormalizer.on_llm_end(once.clone()).await;
        assert_eq!(once, twice);
    }
}
