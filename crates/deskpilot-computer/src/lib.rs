// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! The capability surface the agent loop drives.
//!
//! A [`ComputerHandler`] performs desktop actions and captures screenshots.
//! The loop never introspects an implementation; it dispatches normalized
//! actions through [`dispatch_action`] and reads the resulting screenshot.
//! Concrete desktop/VM providers live outside this workspace — what ships
//! here is the contract, the dispatch mapping, a screenshot-only shim for
//! harnesses that execute actions externally, and a scripted double for
//! tests.

mod dispatch;
mod error;
mod handler;
mod scripted;
mod shim;

pub use dispatch::dispatch_action;
pub use error::ComputerError;
pub use handler::{ComputerHandler, Environment};
pub use scripted::ScriptedComputer;
pub use shim::ScreenshotShim;
