// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Ordered hooks around every phase of a run.
//!
//! Two hook kinds share the chain.  `on_llm_start` / `on_llm_end` are
//! *transforming*: their return value replaces the item list, and the chain
//! folds left — callback *i*'s output feeds *i+1*.  Everything else is
//! *observational* and sees shared state without replacing it.  Hook order
//! is the registration order, preserved across every invocation.

mod budget;
mod image_retention;
mod logging;
mod normalizer;
mod prompt_instructions;
mod telemetry;
mod trajectory;

pub use budget::BudgetManager;
pub use image_retention::ImageRetention;
pub use logging::LoggingCallback;
pub use normalizer::OperatorNormalizer;
pub use prompt_instructions::PromptInstructions;
pub use telemetry::{telemetry_enabled_from_env, TelemetryCallback, TelemetrySink};
pub use trajectory::TrajectorySaver;

use async_trait::async_trait;

use deskpilot_items::{Action, Item, Usage};

use crate::{error::AgentError, TurnResult};

/// Identity of the run the callbacks are observing.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub model: String,
}

/// One member of the callback chain.  Every hook has a no-op default;
/// implementors override the subset they care about.
#[async_trait]
pub trait Callback: Send + Sync {
    /// Once per `run()`, before the first turn.
    async fn on_run_start(&self, _ctx: &RunContext, _items: &[Item]) {}

    /// Once per `run()`, after the last turn.  Fires on every exit path,
    /// including errors and cancellation.
    async fn on_run_end(&self, _ctx: &RunContext, _old_items: &[Item], _new_items: &[Item]) {}

    /// Checked at the top of every turn, before the LLM call.  Returning
    /// `false` ends the run with a terminal assistant message.
    async fn on_run_continue(&self, _items: &[Item]) -> bool {
        true
    }

    /// Transforming: the returned list replaces `items` for this LLM call.
    async fn on_llm_start(&self, items: Vec<Item>) -> Vec<Item> {
        items
    }

    /// Transforming: the returned list replaces the model's output items.
    async fn on_llm_end(&self, items: Vec<Item>) -> Vec<Item> {
        items
    }

    /// Brackets the raw provider exchange.
    async fn on_api_start(&self, _ctx: &RunContext) {}

    async fn on_api_end(&self, _ctx: &RunContext) {}

    /// One turn's usage was recorded.  May fail the run (budget raise mode).
    async fn on_usage(&self, _usage: &Usage) -> Result<(), AgentError> {
        Ok(())
    }

    /// An action is about to be dispatched to the computer handler.
    async fn on_computer_call_start(&self, _action: &Action) {}

    /// A screenshot was captured (`name` labels the artifact).
    async fn on_screenshot(&self, _b64: &str, _name: &str) {}

    /// A turn's result is about to be yielded to the caller.
    async fn on_responses(&self, _result: &TurnResult) {}
}

/// Fold `items` through every callback's `on_llm_start`.
pub(crate) async fn fold_llm_start(callbacks: &[std::sync::Arc<dyn Callback>], mut items: Vec<Item>) -> Vec<Item> {
    for cb in callbacks {
        items = cb.on_llm_start(items).await;
    }
    items
}

/// Fold `items` through every callback's `on_llm_end`.
pub(crate) async fn fold_llm_end(callbacks: &[std::sync::Arc<dyn Callback>], mut items: Vec<Item>) -> Vec<Item> {
    for cb in callbacks {
        items = cb.on_llm_end(items).await;
    }
    items
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Tagger(&'static str);

    #[async_trait]
    impl Callback for Tagger {
        async fn on_llm_start(&self, mut items: Vec<Item>) -> Vec<Item> {
            items.push(Item::user(self.0));
            items
        }
    }

    #[tokio::test]
    async fn transforming_hooks_fold_left_in_order() {
        let chain: Vec<Arc<dyn Callback>> = vec![Arc::new(Tagger("a")), Arc::new(Tagger("b"))];
        let out = fold_llm_start(&chain, vec![]).await;
        assert_eq!(out, vec![Item::user("a"), Item::user("b")]);
    }

    struct Noop;

    #[async_trait]
    impl Callback for Noop {}

    #[tokio::test]
    async fn default_hooks_are_identity() {
        let noop = Noop;
        let items = vec![Item::user("x")];
        assert_eq!(noop.on_llm_start(items.clone()).await, items);
        assert_eq!(noop.on_llm_end(items.clone()).await, items);
        assert!(noop.on_run_continue(&items).await);
        assert!(noop.on_usage(&Usage::default()).await.is_ok());
    }
}
