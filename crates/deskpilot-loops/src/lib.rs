// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Agent-loop strategies and their dispatch registry.
//!
//! A [`LoopStrategy`] turns one conversation trace into one model turn.
//! Four structural families ship here:
//!
//! - **native-responses** ([`openai`]) — items go over the wire verbatim;
//! - **tool-calling** ([`anthropic`], [`gemini`], [`qwen`]) — items are
//!   projected onto flat chat messages and the computer is described as a
//!   per-provider function tool;
//! - **grounded** ([`grounded`]) — vision models that answer with pixel
//!   coordinates parsed out of free-form text;
//! - **composed** ([`composed`]) — a `planner+grounder` pair that splits
//!   deciding *what* to click from finding *where* it is.
//!
//! Strategies are selected by regex over the requested model identifier
//! through [`LoopRegistry`]; the registry is open for caller extension.

mod anthropic;
mod composed;
mod error;
mod gemini;
pub mod ground;
mod grounded;
mod openai;
mod qwen;
mod registry;
pub mod resize;
mod strategy;

pub use anthropic::AnthropicStrategy;
pub use composed::ComposedStrategy;
pub use error::LoopError;
pub use gemini::GeminiStrategy;
pub use ground::{virtual_computer_tool, GroundingCache, PlanAction};
pub use grounded::{GroundedFamily, GroundedStrategy};
pub use openai::OpenAiResponsesStrategy;
pub use qwen::QwenStrategy;
pub use registry::{default_registry, LoopInfo, LoopRegistration, LoopRegistry};
pub use strategy::{
    require_computer, Capability, FunctionToolSpec, LoopStrategy, StepRequest, StepResult, Tool,
};
