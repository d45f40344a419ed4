// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use thiserror::Error;

use deskpilot_loops::LoopError;

/// Failure of an agent run.
///
/// Action-dispatch errors and grounding failures never appear here — both
/// are converted to failure output items in the trace so the model can
/// observe them and self-correct.  What does surface: configuration
/// mistakes, provider errors that outlived the retry budget, a budget
/// configured to raise, and cancellation.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Loop(#[from] LoopError),

    /// The cost budget was hit and the budget manager is configured to
    /// raise instead of ending the run with a terminal message.
    #[error("trajectory budget exceeded: spent ${spent:.4} of ${max:.4}")]
    BudgetExceeded { spent: f64, max: f64 },

    /// The run was cancelled.  `on_run_end` has already fired.
    #[error("run cancelled")]
    Cancelled,
}
