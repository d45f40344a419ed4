// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Strategy dispatch: ordered `(pattern, priority, strategy)` registrations
//! evaluated against the requested model identifier.
//!
//! Dispatch is a linear scan — the table is small and the scan preserves
//! the tie-break contract: highest priority wins, ties go to the earliest
//! registration.  The list stays open so embedders can register their own
//! loops next to the built-ins.

use std::sync::{Arc, RwLock, Weak};

use regex::Regex;
use tracing::debug;

use deskpilot_model::CompletionClient;

use crate::{
    anthropic::AnthropicStrategy,
    composed::ComposedStrategy,
    gemini::GeminiStrategy,
    grounded::{GroundedFamily, GroundedStrategy},
    openai::OpenAiResponsesStrategy,
    qwen::QwenStrategy,
    Capability, LoopError, LoopStrategy,
};

/// One registered strategy.
pub struct LoopRegistration {
    pub pattern: Regex,
    pub priority: i32,
    pub strategy: Arc<dyn LoopStrategy>,
}

/// Summary row for diagnostics and the CLI loop listing.
#[derive(Debug, Clone)]
pub struct LoopInfo {
    pub pattern: String,
    pub priority: i32,
    pub name: &'static str,
    pub capabilities: Vec<Capability>,
}

#[derive(Default)]
pub struct LoopRegistry {
    entries: RwLock<Vec<LoopRegistration>>,
}

impl LoopRegistry {
    /// An empty registry.  Use [`default_registry`] for the built-in set.
    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a strategy for models matching `pattern`.
    pub fn register(
        &self,
        pattern: &str,
        priority: i32,
        strategy: Arc<dyn LoopStrategy>,
    ) -> Result<(), LoopError> {
        let pattern = Regex::new(pattern)
            .map_err(|e| LoopError::Config(format!("invalid loop pattern '{pattern}': {e}")))?;
        self.entries
            .write()
            .unwrap()
            .push(LoopRegistration { pattern, priority, strategy });
        Ok(())
    }

    /// The highest-priority strategy matching `model`; ties break toward
    /// the earliest registration.
    pub fn dispatch(&self, model: &str) -> Option<Arc<dyn LoopStrategy>> {
        let entries = self.entries.read().unwrap();
        let mut best: Option<&LoopRegistration> = None;
        for reg in entries.iter() {
            if !reg.pattern.is_match(model) {
                continue;
            }
            match best {
                Some(b) if reg.priority <= b.priority => {}
                _ => best = Some(reg),
            }
        }
        let found = best.map(|r| Arc::clone(&r.strategy));
        if let Some(s) = &found {
            debug!(model, strategy = s.name(), "dispatched agent loop");
        }
        found
    }

    /// Resolve a strategy for full step prediction.
    ///
    /// A grounder-only match is self-composed: the model string becomes
    /// `model+model` and the composed loop plans and grounds with the same
    /// backend.  Returns the strategy plus the effective model string.
    pub fn resolve_step(
        &self,
        model: &str,
    ) -> Result<(Arc<dyn LoopStrategy>, String), LoopError> {
        let strategy = self
            .dispatch(model)
            .ok_or_else(|| LoopError::NoMatch(model.to_string()))?;
        if strategy.supports(Capability::Step) {
            return Ok((strategy, model.to_string()));
        }
        if strategy.supports(Capability::Click) {
            let composed_model = format!("{model}+{model}");
            let composed = self
                .dispatch(&composed_model)
                .ok_or_else(|| LoopError::NoMatch(composed_model.clone()))?;
            return Ok((composed, composed_model));
        }
        Err(LoopError::StepUnsupported(model.to_string()))
    }

    pub fn list(&self) -> Vec<LoopInfo> {
        self.entries
            .read()
            .unwrap()
            .iter()
            .map(|r| LoopInfo {
                pattern: r.pattern.as_str().to_string(),
                priority: r.priority,
                name: r.strategy.name(),
                capabilities: r.strategy.capabilities().to_vec(),
            })
            .collect()
    }
}

/// Build the registry with every built-in loop strategy.
pub fn default_registry(client: Arc<dyn CompletionClient>) -> Arc<LoopRegistry> {
    let registry = LoopRegistry::empty();
    let weak: Weak<LoopRegistry> = Arc::downgrade(&registry);

    // Composed `planner+grounder` pairs outrank everything: a model string
    // with a '+' must never fall through to a single-model family.
    registry
        .register(
            r"^[^+\s]+\+[^+\s]+$",
            10,
            Arc::new(ComposedStrategy::new(Arc::clone(&client), weak)),
        )
        .expect("static pattern");

    let openai = Arc::new(OpenAiResponsesStrategy::new(Arc::clone(&client)));
    registry.register(r".*computer-use-preview.*", 0, openai).expect("static pattern");

    let anthropic = Arc::new(AnthropicStrategy::new(Arc::clone(&client)));
    registry.register(r"(?i).*claude.*", 0, anthropic).expect("static pattern");

    let gemini = Arc::new(GeminiStrategy::new(Arc::clone(&client)));
    registry.register(r"(?i).*gemini.*", 0, gemini).expect("static pattern");

    let qwen = Arc::new(QwenStrategy::new(Arc::clone(&client)));
    registry.register(r"(?i).*qwen.*", 0, qwen).expect("static pattern");

    for (pattern, family) in [
        (r"(?i).*ui-?tars.*", GroundedFamily::UiTars),
        (r"(?i).*holo.*", GroundedFamily::Holo),
        (r"(?i).*internvl.*", GroundedFamily::InternVl),
        (r"(?i).*opencua.*", GroundedFamily::OpenCua),
        (r"(?i).*moondream.*", GroundedFamily::Moondream),
    ] {
        let strategy = Arc::new(GroundedStrategy::new(Arc::clone(&client), family));
        registry.register(pattern, 0, strategy).expect("static pattern");
    }

    registry
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
