// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The agent runtime: construction, the run orchestrator, and the callback
//! chain around it.
//!
//! [`Agent`] owns a conversation trace and drives the
//! screenshot → decide → act cycle: dispatch a loop strategy for the
//! requested model, call it once per turn, execute the resulting computer
//! calls sequentially, append the post-action screenshots, and yield each
//! turn's delta with cumulative usage — until the model stops calling the
//! computer or a budget/turn limit ends the run.

pub mod callbacks;

mod agent;
mod error;

pub use agent::{Agent, BudgetConfig, TrajectoryConfig, TurnResult};
pub use callbacks::{
    BudgetManager, Callback, ImageRetention, LoggingCallback, OperatorNormalizer,
    PromptInstructions, RunContext, TelemetryCallback, TrajectorySaver,
};
pub use error::AgentError;

// Re-export the surface callers wire an agent with.
pub use deskpilot_computer::{ComputerHandler, Environment, ScreenshotShim, ScriptedComputer};
pub use deskpilot_items::{Action, Item, RunInput, Usage};
pub use deskpilot_loops::{
    default_registry, FunctionToolSpec, LoopRegistry, LoopStrategy, Tool,
};
