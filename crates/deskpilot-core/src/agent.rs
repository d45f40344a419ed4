// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn, Level};
use uuid::Uuid;

use deskpilot_computer::{dispatch_action, ComputerHandler};
use deskpilot_items::{
    pending_computer_calls, png_data_url, Item, RunInput, Usage,
};
use deskpilot_loops::{
    default_registry, GroundingCache, LoopRegistry, LoopStrategy, StepRequest, StepResult, Tool,
};
use deskpilot_model::{retry::backoff_delay, CompletionClient};

use crate::callbacks::{
    fold_llm_end, fold_llm_start, telemetry_enabled_from_env, BudgetManager, Callback,
    ImageRetention, LoggingCallback, OperatorNormalizer, PromptInstructions, RunContext,
    TelemetryCallback, TrajectorySaver,
};
use crate::error::AgentError;

/// Terminal note injected when the cost budget ends a run.
const BUDGET_STOP_MESSAGE: &str = "Budget exceeded. Stopping the run here.";

/// Cost budget configuration for a run.
#[derive(Debug, Clone)]
pub struct BudgetConfig {
    pub max_budget: f64,
    /// Fail the run with [`AgentError::BudgetExceeded`] instead of ending
    /// it with a terminal assistant message.
    pub raise_error: bool,
    pub reset_after_each_run: bool,
}

impl From<f64> for BudgetConfig {
    fn from(max_budget: f64) -> Self {
        Self { max_budget, raise_error: false, reset_after_each_run: false }
    }
}

/// Trajectory persistence configuration.
#[derive(Debug, Clone)]
pub struct TrajectoryConfig {
    pub trajectory_dir: PathBuf,
    pub reset_on_run: bool,
}

impl<P: Into<PathBuf>> From<P> for TrajectoryConfig {
    fn from(dir: P) -> Self {
        Self { trajectory_dir: dir.into(), reset_on_run: false }
    }
}

/// One yielded turn: the items produced in that turn (a delta, including
/// the post-action screenshots) and the cumulative usage so far.
#[derive(Debug, Clone)]
pub struct TurnResult {
    pub output: Vec<Item>,
    pub usage: Usage,
}

/// The computer-use agent: a model identifier, a tool set, and the callback
/// chain wrapped around the run loop.
pub struct Agent {
    model: String,
    registry: Arc<LoopRegistry>,
    tools: Vec<Tool>,
    user_callbacks: Vec<Arc<dyn Callback>>,
    custom_loop: Option<Arc<dyn LoopStrategy>>,
    only_n_most_recent_images: Option<usize>,
    instructions: Option<String>,
    max_retries: u32,
    screenshot_delay: Duration,
    use_prompt_caching: bool,
    max_trajectory_budget: Option<BudgetConfig>,
    trajectory: Option<TrajectoryConfig>,
    verbosity: Level,
    telemetry_enabled: bool,
    max_turns: Option<u32>,
    grounding: Arc<Mutex<GroundingCache>>,
    /// Assembled on first run; bundled callbacks keep state across turns.
    chain: Option<Vec<Arc<dyn Callback>>>,
}

impl Agent {
    /// Construct an agent for `model`, talking to providers through
    /// `client`.  All other knobs start at their defaults and are set with
    /// the `with_*` builders.
    pub fn new(model: impl Into<String>, client: Arc<dyn CompletionClient>) -> Self {
        Self::with_registry(model, default_registry(client))
    }

    /// Construct against a caller-built registry (custom loops registered).
    pub fn with_registry(model: impl Into<String>, registry: Arc<LoopRegistry>) -> Self {
        Self {
            model: model.into(),
            registry,
            tools: Vec::new(),
            user_callbacks: Vec::new(),
            custom_loop: None,
            only_n_most_recent_images: None,
            instructions: None,
            max_retries: 3,
            screenshot_delay: Duration::from_millis(500),
            use_prompt_caching: false,
            max_trajectory_budget: None,
            trajectory: None,
            verbosity: Level::INFO,
            telemetry_enabled: telemetry_enabled_from_env(),
            max_turns: None,
            grounding: Arc::new(Mutex::new(GroundingCache::new())),
            chain: None,
        }
    }

    pub fn with_tool(mut self, tool: Tool) -> Self {
        self.tools.push(tool);
        self
    }

    pub fn with_computer(self, computer: Arc<dyn ComputerHandler>) -> Self {
        self.with_tool(Tool::Computer(computer))
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.user_callbacks.push(callback);
        self
    }

    /// Bypass registry dispatch with an explicit strategy.
    pub fn with_custom_loop(mut self, strategy: Arc<dyn LoopStrategy>) -> Self {
        self.custom_loop = Some(strategy);
        self
    }

    pub fn with_only_n_most_recent_images(mut self, n: usize) -> Self {
        self.only_n_most_recent_images = Some(n);
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_screenshot_delay(mut self, delay: Duration) -> Self {
        self.screenshot_delay = delay;
        self
    }

    pub fn with_prompt_caching(mut self, enabled: bool) -> Self {
        self.use_prompt_caching = enabled;
        self
    }

    pub fn with_max_trajectory_budget(mut self, budget: impl Into<BudgetConfig>) -> Self {
        self.max_trajectory_budget = Some(budget.into());
        self
    }

    pub fn with_trajectory_dir(mut self, config: impl Into<TrajectoryConfig>) -> Self {
        self.trajectory = Some(config.into());
        self
    }

    pub fn with_verbosity(mut self, level: Level) -> Self {
        self.verbosity = level;
        self
    }

    pub fn with_telemetry(mut self, enabled: bool) -> Self {
        self.telemetry_enabled = enabled;
        self
    }

    pub fn with_max_turns(mut self, max_turns: u32) -> Self {
        self.max_turns = Some(max_turns);
        self
    }

    /// The per-run grounding cache (element description ↔ coordinates).
    pub fn grounding_cache(&self) -> Arc<Mutex<GroundingCache>> {
        Arc::clone(&self.grounding)
    }

    /// Bundled callbacks wrap user callbacks in a fixed order: prompt
    /// shaping first, then history pruning, budget, action repair, and the
    /// pure observers.  User callbacks run last so they see the final view.
    fn ensure_chain(&mut self) -> Vec<Arc<dyn Callback>> {
        if let Some(chain) = &self.chain {
            return chain.clone();
        }
        let mut chain: Vec<Arc<dyn Callback>> = Vec::new();
        if let Some(instructions) = &self.instructions {
            chain.push(Arc::new(PromptInstructions::new(instructions.clone())));
        }
        if let Some(n) = self.only_n_most_recent_images {
            chain.push(Arc::new(ImageRetention::new(n)));
        }
        if let Some(budget) = &self.max_trajectory_budget {
            let mut manager = BudgetManager::new(budget.max_budget);
            if budget.raise_error {
                manager = manager.raise_error();
            }
            if budget.reset_after_each_run {
                manager = manager.reset_after_each_run();
            }
            chain.push(Arc::new(manager));
        }
        chain.push(Arc::new(OperatorNormalizer));
        if let Some(trajectory) = &self.trajectory {
            let mut saver = TrajectorySaver::new(&trajectory.trajectory_dir);
            if trajectory.reset_on_run {
                saver = saver.reset_on_run();
            }
            chain.push(Arc::new(saver));
        }
        chain.push(Arc::new(TelemetryCallback::new(self.telemetry_enabled)));
        chain.push(Arc::new(LoggingCallback::new(self.verbosity)));
        chain.extend(self.user_callbacks.iter().cloned());
        self.chain = Some(chain.clone());
        chain
    }

    fn computer_handler(&self) -> Option<Arc<dyn ComputerHandler>> {
        self.tools.iter().find_map(|t| match t {
            Tool::Computer(c) => Some(Arc::clone(c)),
            Tool::Function(_) => None,
        })
    }

    /// Run the agent on `input`, sending each turn's result through `tx`.
    /// Returns the final item trace.
    pub async fn run(
        &mut self,
        input: impl Into<RunInput>,
        tx: mpsc::Sender<TurnResult>,
    ) -> Result<Vec<Item>, AgentError> {
        self.run_impl(input.into(), tx, None).await
    }

    /// Like [`run`](Self::run), with a cancellation channel.  Cancellation
    /// aborts at the next suspension point; `on_run_end` still fires and
    /// [`AgentError::Cancelled`] is returned.
    pub async fn run_with_cancel(
        &mut self,
        input: impl Into<RunInput>,
        tx: mpsc::Sender<TurnResult>,
        cancel: oneshot::Receiver<()>,
    ) -> Result<Vec<Item>, AgentError> {
        self.run_impl(input.into(), tx, Some(cancel)).await
    }

    /// Convenience: run to completion and collect every yielded turn.
    pub async fn run_collect(
        &mut self,
        input: impl Into<RunInput>,
    ) -> Result<(Vec<TurnResult>, Vec<Item>), AgentError> {
        let (tx, mut rx) = mpsc::channel(8);
        let collect = async move {
            let mut turns = Vec::new();
            while let Some(turn) = rx.recv().await {
                turns.push(turn);
            }
            turns
        };
        let (result, turns) = tokio::join!(self.run_impl(input.into(), tx, None), collect);
        Ok((turns, result?))
    }

    async fn run_impl(
        &mut self,
        input: RunInput,
        tx: mpsc::Sender<TurnResult>,
        mut cancel: Option<oneshot::Receiver<()>>,
    ) -> Result<Vec<Item>, AgentError> {
        let chain = self.ensure_chain();
        let ctx = RunContext {
            run_id: Uuid::new_v4().to_string(),
            model: self.model.clone(),
        };
        let initial_items = input.into_items();
        let mut items = initial_items.clone();

        for cb in &chain {
            cb.on_run_start(&ctx, &items).await;
        }
        let result = self.drive(&ctx, &chain, &mut items, &tx, &mut cancel).await;
        // on_run_end fires on every exit path, error and cancellation included.
        for cb in &chain {
            cb.on_run_end(&ctx, &initial_items, &items).await;
        }
        result.map(|_| items)
    }

    async fn drive(
        &self,
        ctx: &RunContext,
        chain: &[Arc<dyn Callback>],
        items: &mut Vec<Item>,
        tx: &mpsc::Sender<TurnResult>,
        cancel: &mut Option<oneshot::Receiver<()>>,
    ) -> Result<(), AgentError> {
        let (strategy, effective_model) = match &self.custom_loop {
            Some(custom) => (Arc::clone(custom), self.model.clone()),
            None => self.registry.resolve_step(&self.model)?,
        };
        let handler = self.computer_handler();
        let mut total_usage = Usage::default();
        let mut turns = 0u32;

        loop {
            if cancelled(cancel) {
                return Err(AgentError::Cancelled);
            }

            // Termination gate 1: cost budget, checked before the LLM call.
            let mut continue_run = true;
            for cb in chain {
                if !cb.on_run_continue(items).await {
                    continue_run = false;
                    break;
                }
            }
            if !continue_run {
                let note = Item::assistant(BUDGET_STOP_MESSAGE);
                items.push(note.clone());
                let turn = TurnResult { output: vec![note], usage: total_usage.clone() };
                for cb in chain {
                    cb.on_responses(&turn).await;
                }
                let _ = tx.send(turn).await;
                return Ok(());
            }

            // Termination gate 2: turn cap.
            turns += 1;
            if let Some(max) = self.max_turns {
                if turns > max {
                    debug!(max, "max turns reached");
                    return Ok(());
                }
            }

            // Middleware view of the trace, then one strategy turn.
            let messages = fold_llm_start(chain, items.clone()).await;
            let request = StepRequest {
                model: effective_model.clone(),
                messages,
                tools: self.tools.clone(),
                max_retries: self.max_retries,
                use_prompt_caching: self.use_prompt_caching,
                grounding: Arc::clone(&self.grounding),
            };
            for cb in chain {
                cb.on_api_start(ctx).await;
            }
            let step = self
                .predict_with_retries(strategy.as_ref(), request, cancel)
                .await?;
            for cb in chain {
                cb.on_api_end(ctx).await;
            }

            let output = fold_llm_end(chain, step.output).await;
            items.extend(output.iter().cloned());
            total_usage.add(&step.usage);
            for cb in chain {
                cb.on_usage(&step.usage).await?;
            }

            // Dispatch this turn's unanswered computer calls, sequentially
            // and in emission order.
            let mut turn_delta = output.clone();
            let pending: Vec<String> = pending_computer_calls(items)
                .into_iter()
                .map(str::to_string)
                .collect();
            for item in &output {
                let Item::ComputerCall { call_id, action, .. } = item else { continue };
                if !pending.iter().any(|p| p == call_id) {
                    continue;
                }
                if cancelled(cancel) {
                    return Err(AgentError::Cancelled);
                }
                for cb in chain {
                    cb.on_computer_call_start(action).await;
                }
                let appended = match &handler {
                    None => Item::function_output(
                        call_id.clone(),
                        "no computer tool is configured to execute this action",
                    ),
                    Some(handler) => match dispatch_action(handler.as_ref(), action).await {
                        Ok(()) => {
                            tokio::time::sleep(self.screenshot_delay).await;
                            match handler.screenshot().await {
                                Ok(b64) => {
                                    for cb in chain {
                                        cb.on_screenshot(&b64, "screenshot_after").await;
                                    }
                                    Item::screenshot_output(call_id.clone(), png_data_url(&b64))
                                }
                                // No partial output: a failed capture becomes
                                // an observable error, not a half-appended item.
                                Err(e) => Item::function_output(
                                    call_id.clone(),
                                    format!("screenshot failed after {}: {e}", action.kind()),
                                ),
                            }
                        }
                        // Action errors are never retried; the model observes
                        // them in context and self-corrects next turn.
                        Err(e) => {
                            warn!(action = action.kind(), error = %e, "action dispatch failed");
                            Item::function_output(
                                call_id.clone(),
                                format!("error executing {}: {e}", action.kind()),
                            )
                        }
                    },
                };
                items.push(appended.clone());
                turn_delta.push(appended);
            }

            let had_calls = output
                .iter()
                .any(|i| matches!(i, Item::ComputerCall { .. }));
            let turn = TurnResult { output: turn_delta, usage: total_usage.clone() };
            for cb in chain {
                cb.on_responses(&turn).await;
            }
            let _ = tx.send(turn).await;

            // Termination gate 3: the model stopped acting.
            if !had_calls {
                return Ok(());
            }
        }
    }

    async fn predict_with_retries(
        &self,
        strategy: &dyn LoopStrategy,
        request: StepRequest,
        cancel: &mut Option<oneshot::Receiver<()>>,
    ) -> Result<StepResult, AgentError> {
        let mut attempt = 0u32;
        loop {
            let prediction = match cancel.as_mut() {
                Some(rx) => {
                    tokio::select! {
                        biased;
                        _ = &mut *rx => return Err(AgentError::Cancelled),
                        result = strategy.predict_step(request.clone()) => result,
                    }
                }
                None => strategy.predict_step(request.clone()).await,
            };
            match prediction {
                Ok(step) => return Ok(step),
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    let retry_after = match &e {
                        deskpilot_loops::LoopError::Model(m) => m.retry_after(),
                        _ => None,
                    };
                    let delay = backoff_delay(attempt, retry_after);
                    warn!(attempt, error = %e, "transient step error, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

/// True when the cancel channel fired or its sender was dropped.
fn cancelled(cancel: &mut Option<oneshot::Receiver<()>>) -> bool {
    match cancel {
        None => false,
        Some(rx) => !matches!(rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)),
    }
}
