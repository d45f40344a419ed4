// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end runs against the scripted completion client and computer.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use deskpilot_core::{
    callbacks::{Callback, RunContext},
    Agent, AgentError,
};
use deskpilot_computer::ScriptedComputer;
use deskpilot_items::{Action, Button, ChatContent, ChatPart, Item, Usage};
use deskpilot_loops::{
    default_registry, Capability, LoopError, LoopStrategy, StepRequest, StepResult,
};
use deskpilot_model::ScriptedClient;

// ─── Test doubles ─────────────────────────────────────────────────────────────

/// A step-capable loop that pops pre-scripted results.
struct ScriptedLoop {
    steps: Mutex<Vec<StepResult>>,
}

impl ScriptedLoop {
    fn new(steps: Vec<StepResult>) -> Arc<Self> {
        Arc::new(Self { steps: Mutex::new(steps) })
    }

    fn step(output: Vec<Item>, cost: f64) -> StepResult {
        StepResult {
            output,
            usage: Usage {
                prompt_tokens: 10,
                completion_tokens: 10,
                total_tokens: 20,
                response_cost: cost,
                ..Default::default()
            },
        }
    }
}

#[async_trait]
impl LoopStrategy for ScriptedLoop {
    fn name(&self) -> &'static str {
        "scripted-loop"
    }
    fn capabilities(&self) -> &[Capability] {
        &[Capability::Step]
    }
    async fn predict_step(&self, _req: StepRequest) -> Result<StepResult, LoopError> {
        let mut steps = self.steps.lock().unwrap();
        if steps.is_empty() {
            return Ok(ScriptedLoop::step(vec![Item::assistant("done")], 0.0));
        }
        Ok(steps.remove(0))
    }
}

/// Grounder stub answering a fixed point.
struct StubGrounder(Option<(u32, u32)>);

#[async_trait]
impl LoopStrategy for StubGrounder {
    fn name(&self) -> &'static str {
        "stub-grounder"
    }
    fn capabilities(&self) -> &[Capability] {
        &[Capability::Click]
    }
    async fn predict_step(&self, req: StepRequest) -> Result<StepResult, LoopError> {
        Err(LoopError::StepUnsupported(req.model))
    }
    async fn predict_click(
        &self,
        _model: &str,
        _image: &str,
        _instruction: &str,
    ) -> Result<Option<(u32, u32)>, LoopError> {
        Ok(self.0)
    }
}

#[derive(Default)]
struct RunCounter {
    started: AtomicU32,
    ended: AtomicU32,
}

#[async_trait]
impl Callback for RunCounter {
    async fn on_run_start(&self, _ctx: &RunContext, _items: &[Item]) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }
    async fn on_run_end(&self, _ctx: &RunContext, _old: &[Item], _new: &[Item]) {
        self.ended.fetch_add(1, Ordering::SeqCst);
    }
}

fn computer_call_click(id: &str, x: i64, y: i64) -> Item {
    Item::computer_call(id, Action::Click { x, y, button: Button::Left })
}

fn assert_all_calls_answered(items: &[Item]) {
    assert!(
        deskpilot_items::pending_computer_calls(items).is_empty(),
        "every computer_call must be answered by an output or failure item"
    );
}

// ─── S1: single-action completion ─────────────────────────────────────────────

#[tokio::test]
async fn s1_single_action_completion() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::tool_call_response(
        "call_1",
        "computer",
        r#"{"action":"left_click","coordinate":[100,200]}"#,
    ));
    client.push_chat(ScriptedClient::text_response("Clicked Submit."));

    let computer = Arc::new(ScriptedComputer::new());
    let mut agent = Agent::new("anthropic/claude-sonnet-4", client)
        .with_computer(Arc::clone(&computer) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (turns, items) = agent.run_collect("click Submit").await.unwrap();

    let calls = computer.calls();
    assert_eq!(
        calls.iter().filter(|c| c.starts_with("click(")).count(),
        1,
        "exactly one click dispatched: {calls:?}"
    );
    assert!(calls.contains(&"click(100,200,left)".to_string()));
    assert!(items.len() >= 4, "user msg, call, output, terminal msg: {items:?}");
    assert!(turns.last().unwrap().usage.total_tokens > 0);
    assert_all_calls_answered(&items);
}

// ─── S2: image retention ──────────────────────────────────────────────────────

#[tokio::test]
async fn s2_seventh_call_sees_only_two_screenshots() {
    let client = Arc::new(ScriptedClient::new());
    for i in 0..6 {
        client.push_chat(ScriptedClient::tool_call_response(
            format!("call_{i}"),
            "computer",
            r#"{"action":"left_click","coordinate":[10,10]}"#,
        ));
    }
    client.push_chat(ScriptedClient::text_response("finished"));

    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::clone(&client) as _)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_only_n_most_recent_images(2)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    agent.run_collect("keep clicking").await.unwrap();

    let requests = client.chat_requests.lock().unwrap();
    assert_eq!(requests.len(), 7);
    let seventh = &requests[6];
    let image_results = seventh
        .messages
        .iter()
        .filter(|m| match &m.content {
            ChatContent::Parts(parts) => {
                parts.iter().any(|p| matches!(p, ChatPart::ImageUrl { .. }))
            }
            _ => false,
        })
        .count();
    assert_eq!(image_results, 2, "exactly 2 screenshots in the seventh call");
    let computer_calls = seventh
        .messages
        .iter()
        .filter(|m| m.tool_calls.iter().any(|tc| tc.function.name == "computer"))
        .count();
    assert_eq!(computer_calls, 2, "exactly 2 paired computer calls remain");
}

// ─── S3: composed grounding ───────────────────────────────────────────────────

fn composed_agent(
    client: Arc<ScriptedClient>,
    grounds_to: Option<(u32, u32)>,
    computer: Arc<ScriptedComputer>,
) -> Agent {
    let registry = default_registry(client);
    registry
        .register(r"stub-grounder", 5, Arc::new(StubGrounder(grounds_to)))
        .unwrap();
    Agent::with_registry("openai/gpt-5+stub-grounder", registry)
        .with_computer(computer)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false)
}

#[tokio::test]
async fn s3_composed_grounding_caches_and_rewrites() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::tool_call_response(
        "p1",
        "computer",
        r#"{"action":"click","element_description":"Save button"}"#,
    ));
    client.push_chat(ScriptedClient::text_response("Saved."));

    let computer = Arc::new(ScriptedComputer::new());
    let mut agent = composed_agent(Arc::clone(&client), Some((412, 77)), Arc::clone(&computer));
    let cache = agent.grounding_cache();

    let (_, items) = agent.run_collect("save the file").await.unwrap();

    assert!(computer.calls().contains(&"click(412,77,left)".to_string()));
    assert_eq!(cache.lock().unwrap().get("Save button"), Some((412.0, 77.0)));
    assert_all_calls_answered(&items);

    // The second planner call sees the element description, not pixels.
    let requests = client.chat_requests.lock().unwrap();
    let second = serde_json::to_string(&requests[1].messages).unwrap();
    assert!(second.contains("Save button"));
    assert!(!second.contains("\"x\":412"));
}

#[tokio::test]
async fn s3b_unresolved_grounding_continues_run() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::tool_call_response(
        "p1",
        "computer",
        r#"{"action":"click","element_description":"ghost button"}"#,
    ));
    client.push_chat(ScriptedClient::text_response("Giving up."));

    let computer = Arc::new(ScriptedComputer::new());
    let mut agent = composed_agent(Arc::clone(&client), None, Arc::clone(&computer));

    let (turns, items) = agent.run_collect("click the ghost").await.unwrap();

    assert!(
        items.iter().any(|i| matches!(
            i,
            Item::FunctionCallOutput { output, .. } if output.contains("ghost button")
        )),
        "failure output item present"
    );
    assert!(turns.len() >= 2, "run continued after the grounding failure");
    assert!(!computer.calls().iter().any(|c| c.starts_with("click(")));
    assert_all_calls_answered(&items);
}

#[tokio::test]
async fn boundary_empty_tool_list_still_yields_virtual_tool() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::text_response("nothing to do"));
    let registry = default_registry(Arc::clone(&client) as _);
    registry
        .register(r"stub-grounder", 5, Arc::new(StubGrounder(None)))
        .unwrap();
    let mut agent = Agent::with_registry("openai/gpt-5+stub-grounder", registry)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    // History already ends in a screenshot, so no computer handler is needed.
    let input = vec![
        Item::user("look"),
        Item::computer_call("c0", Action::Screenshot),
        Item::screenshot_output("c0", "data:image/png;base64,QUJD"),
    ];
    agent.run_collect(input).await.unwrap();

    let requests = client.chat_requests.lock().unwrap();
    assert_eq!(requests[0].tools.len(), 1, "exactly the virtual computer tool");
    assert_eq!(requests[0].tools[0]["function"]["name"], "computer");
}

// ─── S4: malformed action normalization ───────────────────────────────────────

#[tokio::test]
async fn s4_malformed_action_is_repaired_and_dispatched() {
    let strategy = ScriptedLoop::new(vec![
        ScriptedLoop::step(
            vec![Item::FunctionCall {
                call_id: "call_1".into(),
                name: "computer".into(),
                arguments: r#"{"type":"left_click","coordinate":[50,60]}"#.into(),
            }],
            0.0,
        ),
        ScriptedLoop::step(vec![Item::assistant("done")], 0.0),
    ]);

    let computer = Arc::new(ScriptedComputer::new());
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::clone(&computer) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (_, items) = agent.run_collect("click it").await.unwrap();

    assert!(
        items.iter().any(|i| matches!(
            i,
            Item::ComputerCall { action: Action::Click { x: 50, y: 60, button: Button::Left }, .. }
        )),
        "repaired into a normalized click: {items:?}"
    );
    assert!(computer.calls().contains(&"click(50,60,left)".to_string()));
    assert_all_calls_answered(&items);
}

// ─── S5: budget stop ──────────────────────────────────────────────────────────

#[tokio::test]
async fn s5_budget_stops_before_third_llm_call() {
    let strategy = ScriptedLoop::new(vec![
        ScriptedLoop::step(vec![computer_call_click("c1", 1, 1)], 0.008),
        ScriptedLoop::step(vec![computer_call_click("c2", 2, 2)], 0.008),
        // Never reached: the budget gate fires before the third LLM call.
        ScriptedLoop::step(vec![computer_call_click("c3", 3, 3)], 0.008),
    ]);

    let counter = Arc::new(RunCounter::default());
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_max_trajectory_budget(0.01)
        .with_callback(Arc::clone(&counter) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (turns, items) = agent.run_collect("spend money").await.unwrap();

    let llm_turns = turns
        .iter()
        .filter(|t| t.output.iter().any(|i| matches!(i, Item::ComputerCall { .. })))
        .count();
    assert_eq!(llm_turns, 2, "two model turns before the budget trips");
    let terminal = items.last().unwrap();
    assert!(
        matches!(terminal, Item::Message { .. })
            && serde_json::to_string(terminal).unwrap().contains("Budget exceeded"),
        "terminal assistant note present: {terminal:?}"
    );
    assert_eq!(counter.ended.load(Ordering::SeqCst), 1, "on_run_end exactly once");
    assert_all_calls_answered(&items);
}

#[tokio::test]
async fn s5b_budget_raise_mode_errors_but_still_ends_run() {
    let strategy = ScriptedLoop::new(vec![ScriptedLoop::step(
        vec![computer_call_click("c1", 1, 1)],
        0.05,
    )]);
    let counter = Arc::new(RunCounter::default());
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_max_trajectory_budget(deskpilot_core::BudgetConfig {
            max_budget: 0.01,
            raise_error: true,
            reset_after_each_run: false,
        })
        .with_callback(Arc::clone(&counter) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let err = agent.run_collect("spend").await.unwrap_err();
    assert!(matches!(err, AgentError::BudgetExceeded { .. }));
    assert_eq!(counter.ended.load(Ordering::SeqCst), 1, "on_run_end still fires");
}

// ─── S6: handler failure ──────────────────────────────────────────────────────

#[tokio::test]
async fn s6_handler_failure_becomes_observable_output() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::tool_call_response(
        "call_1",
        "computer",
        r#"{"action":"left_click","coordinate":[5,5]}"#,
    ));
    client.push_chat(ScriptedClient::text_response("I see the error, stopping."));

    let computer = Arc::new(ScriptedComputer::new());
    computer.fail_next("click", "element not found");

    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::clone(&client) as _)
        .with_computer(Arc::clone(&computer) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (_, items) = agent.run_collect("click it").await.unwrap();

    // The action ran once and was not retried.
    assert_eq!(
        computer.calls().iter().filter(|c| c.starts_with("click(")).count(),
        1
    );
    assert!(items.iter().any(|i| matches!(
        i,
        Item::FunctionCallOutput { output, .. } if output.contains("element not found")
    )));
    // The next LLM turn observes the error in context.
    let requests = client.chat_requests.lock().unwrap();
    let second = serde_json::to_string(&requests[1].messages).unwrap();
    assert!(second.contains("element not found"));
    assert_all_calls_answered(&items);
}

// ─── Cross-cutting invariants ─────────────────────────────────────────────────

#[tokio::test]
async fn cumulative_usage_is_non_decreasing() {
    let strategy = ScriptedLoop::new(vec![
        ScriptedLoop::step(vec![computer_call_click("c1", 1, 1)], 0.0),
        ScriptedLoop::step(vec![computer_call_click("c2", 2, 2)], 0.0),
        ScriptedLoop::step(vec![Item::assistant("done")], 0.0),
    ]);
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (turns, _) = agent.run_collect("go").await.unwrap();
    assert!(turns.len() >= 3);
    for pair in turns.windows(2) {
        assert!(pair[1].usage.total_tokens >= pair[0].usage.total_tokens);
        assert!(pair[1].usage.response_cost >= pair[0].usage.response_cost);
    }
}

#[tokio::test]
async fn max_turns_caps_the_run() {
    // An endless clicker: without the cap this would never stop.
    let strategy = ScriptedLoop::new(
        (0..50)
            .map(|i| ScriptedLoop::step(vec![computer_call_click(&format!("c{i}"), 1, 1)], 0.0))
            .collect(),
    );
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_max_turns(3)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (turns, _) = agent.run_collect("loop forever").await.unwrap();
    assert_eq!(turns.len(), 3);
}

#[tokio::test]
async fn cancellation_fires_run_end_and_returns_cancelled() {
    let strategy = ScriptedLoop::new(vec![]);
    let counter = Arc::new(RunCounter::default());
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::new(ScriptedClient::new()))
        .with_custom_loop(strategy)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_callback(Arc::clone(&counter) as _)
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let (tx, _rx) = tokio::sync::mpsc::channel(8);
    let (cancel_tx, cancel_rx) = tokio::sync::oneshot::channel();
    cancel_tx.send(()).unwrap();

    let err = agent.run_with_cancel("task", tx, cancel_rx).await.unwrap_err();
    assert!(matches!(err, AgentError::Cancelled));
    assert_eq!(counter.started.load(Ordering::SeqCst), 1);
    assert_eq!(counter.ended.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn resumption_accepts_prior_item_trace() {
    let client = Arc::new(ScriptedClient::new());
    client.push_chat(ScriptedClient::text_response("Continuing from history."));
    let mut agent = Agent::new("anthropic/claude-sonnet-4", Arc::clone(&client) as _)
        .with_computer(Arc::new(ScriptedComputer::new()))
        .with_screenshot_delay(Duration::ZERO)
        .with_telemetry(false);

    let history = vec![
        Item::user("click Submit"),
        Item::computer_call("c1", Action::Click { x: 1, y: 2, button: Button::Left }),
        Item::screenshot_output("c1", "data:image/png;base64,QUJD"),
    ];
    let (_, items) = agent.run_collect(history.clone()).await.unwrap();
    assert!(items.len() > history.len());
    assert_eq!(&items[..history.len()], &history[..]);
}
