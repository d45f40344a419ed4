// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Composed `planner+grounder` loop.
//!
//! The planner is a capable LLM that decides *what* to do next and names
//! targets by description through the virtual computer tool; the grounder
//! is a vision model that finds *where* each description is on the current
//! screenshot.  The grounding cache bridges the two and also rewrites
//! history, so planner prompts show element semantics instead of pixel
//! coordinates the planner never produced.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use deskpilot_items::{
    items_to_chat, latest_image_url, parse_data_url, png_data_url, ChatContent, Item,
    COMPUTER_FUNCTION,
};
use deskpilot_model::{ChatRequest, CompletionClient};

use crate::{
    ground::{lower_plan, plan_args_for_action, virtual_computer_tool, GroundingCache, PlanAction},
    registry::LoopRegistry,
    strategy::{require_computer, Capability, LoopStrategy, StepRequest, StepResult},
    LoopError, Tool,
};

/// Attempts per element description before declaring a grounding failure.
const GROUNDING_ATTEMPTS: u32 = 3;

pub struct ComposedStrategy {
    client: Arc<dyn CompletionClient>,
    /// Back-reference for grounder dispatch.  Weak: the registry owns the
    /// strategies, not the other way around.
    registry: Weak<LoopRegistry>,
}

impl ComposedStrategy {
    pub fn new(client: Arc<dyn CompletionClient>, registry: Weak<LoopRegistry>) -> Self {
        Self { client, registry }
    }

    /// Split `planner+grounder`.
    fn split(model: &str) -> Result<(&str, &str), LoopError> {
        model
            .split_once('+')
            .filter(|(p, g)| !p.is_empty() && !g.is_empty())
            .ok_or_else(|| {
                LoopError::Config(format!("composed model must be 'planner+grounder', got '{model}'"))
            })
    }

    fn registry(&self) -> Result<Arc<LoopRegistry>, LoopError> {
        self.registry
            .upgrade()
            .ok_or_else(|| LoopError::Config("loop registry dropped".into()))
    }

    /// The planner's view of history: dispatched pixel actions are replaced
    /// by their cached element descriptions.
    fn plan_view(items: &[Item], cache: &GroundingCache) -> Vec<Item> {
        items
            .iter()
            .map(|item| match item {
                Item::ComputerCall { call_id, action, .. } => Item::FunctionCall {
                    call_id: call_id.clone(),
                    name: COMPUTER_FUNCTION.into(),
                    arguments: plan_args_for_action(action, cache).to_string(),
                },
                other => other.clone(),
            })
            .collect()
    }

    /// Ground one description with bounded retries.
    async fn ground(
        &self,
        grounder: &Arc<dyn LoopStrategy>,
        grounder_model: &str,
        image_b64: &str,
        description: &str,
    ) -> Option<(u32, u32)> {
        for attempt in 1..=GROUNDING_ATTEMPTS {
            match grounder.predict_click(grounder_model, image_b64, description).await {
                Ok(Some(xy)) => {
                    debug!(description, x = xy.0, y = xy.1, "grounded element");
                    return Some(xy);
                }
                Ok(None) => {
                    debug!(description, attempt, "grounder returned no coordinate");
                }
                Err(e) => {
                    warn!(description, attempt, error = %e, "grounder call failed");
                }
            }
        }
        None
    }
}

#[async_trait]
impl LoopStrategy for ComposedStrategy {
    fn name(&self) -> &'static str {
        "composed"
    }

    fn capabilities(&self) -> &[Capability] {
        &[Capability::Step, Capability::Click]
    }

    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        let (planner_model, grounder_model) = Self::split(&req.model)?;
        let registry = self.registry()?;
        let grounder = registry
            .dispatch(grounder_model)
            .ok_or_else(|| LoopError::NoMatch(grounder_model.to_string()))?;

        // Phase 1: make sure the planner sees a current screenshot.
        let mut items = req.messages.clone();
        let mut output: Vec<Item> = Vec::new();
        let needs_screenshot = !matches!(items.last(), Some(Item::ComputerCallOutput { .. }));
        if needs_screenshot {
            let handler = require_computer(&req.tools)?;
            let b64 = handler.screenshot().await?;
            let call_id = format!("sc_{}", uuid::Uuid::new_v4().simple());
            let pair = [
                Item::computer_call(call_id.clone(), deskpilot_items::Action::Screenshot),
                Item::screenshot_output(call_id, png_data_url(&b64)),
            ];
            items.extend(pair.iter().cloned());
            output.extend(pair);
        }
        let screenshot_url = latest_image_url(&items)
            .map(str::to_string)
            .ok_or_else(|| LoopError::Config("no screenshot available for grounding".into()))?;
        let screenshot_b64 = match parse_data_url(&screenshot_url) {
            Ok((_, b64)) => b64.to_string(),
            Err(_) => screenshot_url.clone(),
        };

        // Phase 2: planner call over the description-level view of history.
        let plan_items = {
            let cache = req.grounding.lock().unwrap();
            Self::plan_view(&items, &cache)
        };
        let mut tools = vec![virtual_computer_tool()];
        for tool in &req.tools {
            if let Tool::Function(f) = tool {
                tools.push(serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": f.name,
                        "description": f.description,
                        "parameters": f.parameters,
                    }
                }));
            }
        }
        let resp = self
            .client
            .chat(ChatRequest {
                model: planner_model.to_string(),
                messages: items_to_chat(&plan_items, true),
                tools,
                max_tokens: Some(4096),
                temperature: None,
            })
            .await?;

        // Phase 3: collect the plan.
        let mut plans: Vec<(String, PlanAction)> = Vec::new();
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
                match PlanAction::from_args(&args) {
                    Some(plan) if tc.function.name == COMPUTER_FUNCTION => {
                        plans.push((tc.id.clone(), plan));
                    }
                    _ => output.push(Item::FunctionCall {
                        call_id: tc.id.clone(),
                        name: tc.function.name.clone(),
                        arguments: tc.function.arguments.clone(),
                    }),
                }
            }
        }

        // Phase 4: ground every description the plan needs and is not cached.
        let needed: Vec<String> = {
            let cache = req.grounding.lock().unwrap();
            let mut needed: Vec<String> = Vec::new();
            for (_, plan) in &plans {
                for desc in plan.descriptions() {
                    if cache.get(desc).is_none() && !needed.iter().any(|d| d == desc) {
                        needed.push(desc.to_string());
                    }
                }
            }
            needed
        };
        for desc in &needed {
            if let Some((x, y)) =
                self.ground(&grounder, grounder_model, &screenshot_b64, desc).await
            {
                req.grounding.lock().unwrap().insert(desc.clone(), x as f64, y as f64);
            }
        }

        // Phase 5: lower the plan, marking unresolved actions failed.
        {
            let cache = req.grounding.lock().unwrap();
            for (call_id, plan) in &plans {
                match lower_plan(plan, &cache) {
                    Ok(action) => output.push(Item::computer_call(call_id.clone(), action)),
                    Err(desc) => {
                        // Keep the action's shape visible with a zeroed
                        // placeholder so the trace stays well-formed.
                        let mut fallback = GroundingCache::new();
                        for d in plan.descriptions() {
                            fallback.insert(d, 0.0, 0.0);
                        }
                        if let Ok(placeholder) = lower_plan(plan, &fallback) {
                            output.push(Item::ComputerCall {
                                call_id: call_id.clone(),
                                status: deskpilot_items::CallStatus::Failed,
                                action: placeholder,
                            });
                        }
                        output.push(Item::function_output(
                            call_id.clone(),
                            format!("could not locate element '{desc}' on the screen"),
                        ));
                    }
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
        let (_, grounder_model) = Self::split(model)?;
        let registry = self.registry()?;
        let grounder = registry
            .dispatch(grounder_model)
            .ok_or_else(|| LoopError::NoMatch(grounder_model.to_string()))?;
        grounder.predict_click(grounder_model, image_b64, instruction).await
    }
}
