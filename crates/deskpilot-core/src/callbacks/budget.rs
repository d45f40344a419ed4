// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::warn;

use deskpilot_items::{Item, Usage};

use super::{Callback, RunContext};
use crate::error::AgentError;

/// Enforces a cumulative USD cost cap across a run.
///
/// Costs accumulate from each turn's `response_cost`.  Once the cap is hit,
/// either the next `on_run_continue` check stops the run cleanly (the
/// orchestrator injects a terminal assistant message), or — with
/// `raise_error` — `on_usage` fails the run with
/// [`AgentError::BudgetExceeded`].
pub struct BudgetManager {
    max_budget: f64,
    raise_error: bool,
    reset_after_each_run: bool,
    spent: Mutex<f64>,
}

impl BudgetManager {
    pub fn new(max_budget: f64) -> Self {
        Self {
            max_budget,
            raise_error: false,
            reset_after_each_run: false,
            spent: Mutex::new(0.0),
        }
    }

    pub fn raise_error(mut self) -> Self {
        self.raise_error = true;
        self
    }

    pub fn reset_after_each_run(mut self) -> Self {
        self.reset_after_each_run = true;
        self
    }

    pub fn spent(&self) -> f64 {
        *self.spent.lock().unwrap()
    }

    fn exceeded(&self) -> bool {
        self.spent() >= self.max_budget
    }
}

#[async_trait]
impl Callback for BudgetManager {
    async fn on_run_start(&self, _ctx: &RunContext, _items: &[Item]) {
        if self.reset_after_each_run {
            *self.spent.lock().unwrap() = 0.0;
        }
    }

    async fn on_run_continue(&self, _items: &[Item]) -> bool {
        if self.exceeded() {
            warn!(spent = self.spent(), max = self.max_budget, "trajectory budget exhausted");
            return false;
        }
        true
    }

    async fn on_usage(&self, usage: &Usage) -> Result<(), AgentError> {
        let spent = {
            let mut spent = self.spent.lock().unwrap();
            *spent += usage.response_cost;
            *spent
        };
        if self.raise_error && spent >= self.max_budget {
            return Err(AgentError::BudgetExceeded { spent, max: self.max_budget });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage_costing(cost: f64) -> Usage {
        Usage { response_cost: cost, ..Default::default() }
    }

    fn ctx() -> RunContext {
        RunContext { run_id: "r".into(), model: "m".into() }
    }

    #[tokio::test]
    async fn continues_until_budget_is_hit() {
        let b = BudgetManager::new(0.01);
        assert!(b.on_run_continue(&[]).await);
        b.on_usage(&usage_costing(0.008)).await.unwrap();
        assert!(b.on_run_continue(&[]).await);
        b.on_usage(&usage_costing(0.008)).await.unwrap();
        assert!(!b.on_run_continue(&[]).await);
    }

    #[tokio::test]
    async fn raise_mode_errors_on_usage() {
        let b = BudgetManager::new(0.01).raise_error();
        b.on_usage(&usage_costing(0.005)).await.unwrap();
        let err = b.on_usage(&usage_costing(0.006)).await.unwrap_err();
        assert!(matches!(err, AgentError::BudgetExceeded { .. }));
    }

    #[tokio::test]
    async fn reset_mode_clears_spend_on_run_start() {
        let b = BudgetManager::new(0.01).reset_after_each_run();
        b.on_usage(&usage_costing(0.02)).await.unwrap();
        assert!(!b.on_run_continue(&[]).await);
        b.on_run_start(&ctx(), &[]).await;
        assert!(b.on_run_continue(&[]).await);
    }

    #[tokio::test]
    async fn zero_cost_turns_never_trip_budget() {
        let b = BudgetManager::new(0.01);
        for _ in 0..100 {
            b.on_usage(&usage_costing(0.0)).await.unwrap();
        }
        assert!(b.on_run_continue(&[]).await);
    }
}
