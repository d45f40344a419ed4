use async_trait::async_trait;
use tracing::{debug, info, Level};

use deskpilot_items::{Action, Item, Usage};

use super::{Callback, RunContext};
use crate::{error::AgentError, TurnResult};

/// Severity-filtered run observer.
///
/// Emits one log line per lifecycle event through `tracing`; `level`
/// gates the per-turn noise (LLM calls, actions, screenshots) while run
/// start/end always log at info.
pub struct LoggingCallback {
    level: Level,
}

impl LoggingCallback {
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    fn verbose(&self) -> bool {
        self.level >= Level::DEBUG
    }
}

impl Default for LoggingCallback {
    fn default() -> Self {
        Self::new(Level::INFO)
    }
}

#[async_trait]
impl Callback for LoggingCallback {
    async fn on_run_start(&self, ctx: &RunContext, items: &[Item]) {
        info!(run_id = %ctx.run_id, model = %ctx.model, items = items.len(), "run started");
    }

    async fn on_run_end(&self, ctx: &RunContext, old_items: &[Item], new_items: &[Item]) {
        info!(
            run_id = %ctx.run_id,
            produced = new_items.len().saturating_sub(old_items.len()),
            "run finished"
        );
    }

    async fn on_llm_start(&self, items: Vec<Item>) -> Vec<Item> {
        if self.verbose() {
            debug!(items = items.len(), "calling model");
        }
        items
    }

    async fn on_computer_call_start(&self, action: &Action) {
        if self.verbose() {
            debug!(action = action.kind(), "dispatching action");
        }
    }

    async fn on_screenshot(&self, b64: &str, name: &str) {
        if self.verbose() {
            debug!(name, bytes = b64.len(), "screenshot captured");
        }
    }

    async fn on_usage(&self, usage: &Usage) -> Result<(), AgentError> {
        if self.verbose() {
            debug!(
                total_tokens = usage.total_tokens,
                cost = usage.response_cost,
                "turn usage"
            );
        }
        Ok(())
    }

    async fn on_responses(&self, result: &TurnResult) {
        if self.verbose() {
            debug!(output_items = result.output.len(), "turn yielded");
        }
    }
}
