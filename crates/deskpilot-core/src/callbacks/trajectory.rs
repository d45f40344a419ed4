// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::warn;

use deskpilot_items::{parse_data_url, Item, Usage};

use super::{Callback, RunContext};
use crate::TurnResult;

/// Persists per-turn artifacts under `dir/run-<id>/turn-NNNN/`.
///
/// Three files per turn: `input.json` (items sent to the LLM),
/// `output.json` (items received plus that turn's cumulative usage), and
/// `screenshot_after.png`.  Turn indices are zero-padded so directory
/// listings sort lexicographically; `metadata.json` at the run root carries
/// the run id, model, timestamps, and final usage.
pub struct TrajectorySaver {
    base_dir: PathBuf,
    reset_on_run: bool,
    state: Mutex<SaverState>,
}

#[derive(Default)]
struct SaverState {
    run_dir: Option<PathBuf>,
    run_id: String,
    model: String,
    turn: u32,
    started_at: Option<DateTime<Utc>>,
    usage: Usage,
}

impl TrajectorySaver {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            reset_on_run: false,
            state: Mutex::new(SaverState::default()),
        }
    }

    /// Remove previous runs under the base dir when a new run starts.
    pub fn reset_on_run(mut self) -> Self {
        self.reset_on_run = true;
        self
    }

    fn turn_dir(&self) -> Option<PathBuf> {
        let state = self.state.lock().unwrap();
        state
            .run_dir
            .as_ref()
            .map(|d| d.join(format!("turn-{:04}", state.turn)))
    }

    async fn write_json(path: &Path, value: &serde_json::Value) {
        if let Some(parent) = path.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                warn!(error = %e, "trajectory dir creation failed");
                return;
            }
        }
        let pretty = serde_json::to_vec_pretty(value).unwrap_or_default();
        if let Err(e) = tokio::fs::write(path, pretty).await {
            warn!(error = %e, path = %path.display(), "trajectory write failed");
        }
    }
}

#[async_trait]
impl Callback for TrajectorySaver {
    async fn on_run_start(&self, ctx: &RunContext, _items: &[Item]) {
        if self.reset_on_run {
            let _ = tokio::fs::remove_dir_all(&self.base_dir).await;
        }
        let run_dir = self.base_dir.join(format!("run-{}", ctx.run_id));
        if let Err(e) = tokio::fs::create_dir_all(&run_dir).await {
            warn!(error = %e, "trajectory run dir creation failed");
            return;
        }
        let mut state = self.state.lock().unwrap();
        state.run_dir = Some(run_dir);
        state.run_id = ctx.run_id.clone();
        state.model = ctx.model.clone();
        state.turn = 0;
        state.started_at = Some(Utc::now());
        state.usage = Usage::default();
    }

    async fn on_llm_start(&self, items: Vec<Item>) -> Vec<Item> {
        {
            let mut state = self.state.lock().unwrap();
            state.turn += 1;
        }
        if let Some(dir) = self.turn_dir() {
            Self::write_json(&dir.join("input.json"), &json!(items)).await;
        }
        items
    }

    async fn on_responses(&self, result: &TurnResult) {
        {
            let mut state = self.state.lock().unwrap();
            state.usage = result.usage.clone();
        }
        if let Some(dir) = self.turn_dir() {
            Self::write_json(
                &dir.join("output.json"),
                &json!({ "output": result.output, "usage": result.usage }),
            )
            .await;
        }
    }

    async fn on_screenshot(&self, b64: &str, name: &str) {
        let Some(dir) = self.turn_dir() else { return };
        let bare = parse_data_url(b64).map(|(_, b)| b).unwrap_or(b64);
        let Ok(bytes) = B64.decode(bare) else {
            warn!("screenshot was not valid base64; skipping artifact");
            return;
        };
        if tokio::fs::create_dir_all(&dir).await.is_ok() {
            let file = dir.join(format!("{name}.png"));
            if let Err(e) = tokio::fs::write(&file, bytes).await {
                warn!(error = %e, "screenshot write failed");
            }
        }
    }

    async fn on_run_end(&self, _ctx: &RunContext, _old_items: &[Item], _new_items: &[Item]) {
        let (run_dir, meta) = {
            let state = self.state.lock().unwrap();
            let Some(run_dir) = state.run_dir.clone() else { return };
            let meta = json!({
                "run_id": state.run_id,
                "model": state.model,
                "started_at": state.started_at,
                "ended_at": Utc::now(),
                "turns": state.turn,
                "usage": state.usage,
            });
            (run_dir, meta)
        };
        Self::write_json(&run_dir.join("metadata.json"), &meta).await;
    }
}
