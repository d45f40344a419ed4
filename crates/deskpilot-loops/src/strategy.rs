// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use deskpilot_computer::ComputerHandler;
use deskpilot_items::{Item, Usage};

use crate::{ground::GroundingCache, LoopError};

/// Descriptor of a plain function tool exposed to the model.  Deskpilot
/// never executes these itself — they are schema passed through to the
/// provider, answered by whatever harness drives the run.
#[derive(Debug, Clone)]
pub struct FunctionToolSpec {
    pub name: String,
    pub description: String,
    /// JSON Schema of the parameters object.
    pub parameters: Value,
}

/// A tool handed to the agent: a computer capability or a function schema.
///
/// An explicit tagged union rather than structural sniffing — the marker is
/// the variant.
#[derive(Clone)]
pub enum Tool {
    Computer(Arc<dyn ComputerHandler>),
    Function(FunctionToolSpec),
}

impl Tool {
    pub fn function(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
    ) -> Self {
        Self::Function(FunctionToolSpec {
            name: name.into(),
            description: description.into(),
            parameters,
        })
    }
}

/// The first computer handler in a tool list, or a `Config` error for
/// strategies that cannot run without one.
pub fn require_computer(tools: &[Tool]) -> Result<Arc<dyn ComputerHandler>, LoopError> {
    tools
        .iter()
        .find_map(|t| match t {
            Tool::Computer(c) => Some(Arc::clone(c)),
            Tool::Function(_) => None,
        })
        .ok_or_else(|| LoopError::Config("a computer tool is required for this loop".into()))
}

/// Everything a strategy needs for one turn.
#[derive(Clone)]
pub struct StepRequest {
    /// Full requested model identifier (for composed loops, the
    /// `planner+grounder` pair).
    pub model: String,
    /// Conversation trace after `on_llm_start` middleware.
    pub messages: Vec<Item>,
    pub tools: Vec<Tool>,
    pub max_retries: u32,
    pub use_prompt_caching: bool,
    /// Per-run element-description ↔ coordinate symbol table, shared with
    /// the composed loop's grounding pass.
    pub grounding: Arc<Mutex<GroundingCache>>,
}

impl StepRequest {
    pub fn new(model: impl Into<String>, messages: Vec<Item>, tools: Vec<Tool>) -> Self {
        Self {
            model: model.into(),
            messages,
            tools,
            max_retries: 3,
            use_prompt_caching: false,
            grounding: Arc::new(Mutex::new(GroundingCache::new())),
        }
    }
}

/// One turn's prediction.
#[derive(Debug, Clone)]
pub struct StepResult {
    pub output: Vec<Item>,
    pub usage: Usage,
}

/// What a strategy can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Full turn prediction.
    Step,
    /// `predict_click` grounding.
    Click,
}

/// A model-family agent loop.
///
/// Implementations are stateless and shared; per-run state (the grounding
/// cache) travels in the [`StepRequest`].
#[async_trait]
pub trait LoopStrategy: Send + Sync {
    /// Stable name shown in diagnostics and the CLI loop listing.
    fn name(&self) -> &'static str;

    fn capabilities(&self) -> &[Capability];

    /// Predict the next turn: call the model once and return the produced
    /// items plus this turn's usage.
    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError>;

    /// Ground an element instruction to screen coordinates on `image_b64`.
    /// `Ok(None)` means the model answered but no coordinate was found.
    async fn predict_click(
        &self,
        _model: &str,
        _image_b64: &str,
        _instruction: &str,
    ) -> Result<Option<(u32, u32)>, LoopError> {
        Ok(None)
    }

    fn supports(&self, cap: Capability) -> bool {
        self.capabilities().contains(&cap)
    }
}
