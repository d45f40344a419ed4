// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;
use std::time::Instant;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::info;

use deskpilot_items::Item;

use super::{Callback, RunContext};

/// Destination for anonymous usage events.  The network transport lives
/// outside this workspace; the default sink emits structured `tracing`
/// events that a subscriber can forward.
pub trait TelemetrySink: Send + Sync {
    fn record_event(&self, name: &str, properties: Value);
}

/// Default sink: structured log events.
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_event(&self, name: &str, properties: Value) {
        info!(target: "deskpilot::telemetry", event = name, %properties, "telemetry event");
    }
}

/// Whether telemetry is enabled by the environment.
///
/// `CUA_TELEMETRY_ENABLED` (default true) is authoritative; the legacy
/// `CUA_TELEMETRY=off` switch still disables.
pub fn telemetry_enabled_from_env() -> bool {
    if std::env::var("CUA_TELEMETRY")
        .map(|v| v.eq_ignore_ascii_case("off"))
        .unwrap_or(false)
    {
        return false;
    }
    match std::env::var("CUA_TELEMETRY_ENABLED") {
        Ok(v) => !matches!(v.to_ascii_lowercase().as_str(), "false" | "0" | "off" | "no"),
        Err(_) => true,
    }
}

/// Records anonymous run lifecycle events: model, item counts, duration,
/// and coarse host info.  Never records conversation content.
pub struct TelemetryCallback {
    sink: Box<dyn TelemetrySink>,
    enabled: bool,
    started: Mutex<Option<Instant>>,
}

impl TelemetryCallback {
    pub fn new(enabled: bool) -> Self {
        Self::with_sink(enabled, Box::new(TracingSink))
    }

    pub fn with_sink(enabled: bool, sink: Box<dyn TelemetrySink>) -> Self {
        Self { sink, enabled, started: Mutex::new(None) }
    }

    fn system_info() -> Value {
        json!({
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
            "version": env!("CARGO_PKG_VERSION"),
        })
    }
}

#[async_trait]
impl Callback for TelemetryCallback {
    async fn on_run_start(&self, ctx: &RunContext, items: &[Item]) {
        if !self.enabled {
            return;
        }
        *self.started.lock().unwrap() = Some(Instant::now());
        let mut props = Self::system_info();
        props["model"] = json!(ctx.model);
        props["input_items"] = json!(items.len());
        self.sink.record_event("run_start", props);
    }

    async fn on_run_end(&self, ctx: &RunContext, old_items: &[Item], new_items: &[Item]) {
        if !self.enabled {
            return;
        }
        let duration_ms = self
            .started
            .lock()
            .unwrap()
            .take()
            .map(|t| t.elapsed().as_millis() as u64);
        self.sink.record_event(
            "run_end",
            json!({
                "model": ctx.model,
                "new_items": new_items.len().saturating_sub(old_items.len()),
                "duration_ms": duration_ms,
            }),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex as StdMutex};

    struct CapturingSink(Arc<StdMutex<Vec<String>>>);

    impl TelemetrySink for CapturingSink {
        fn record_event(&self, name: &str, _properties: Value) {
            self.0.lock().unwrap().push(name.to_string());
        }
    }

    fn ctx() -> RunContext {
        RunContext { run_id: "r".into(), model: "m".into() }
    }

    #[tokio::test]
    async fn records_run_lifecycle_when_enabled() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let cb = TelemetryCallback::with_sink(true, Box::new(CapturingSink(Arc::clone(&events))));
        cb.on_run_start(&ctx(), &[]).await;
        cb.on_run_end(&ctx(), &[], &[]).await;
        assert_eq!(*events.lock().unwrap(), vec!["run_start", "run_end"]);
    }

    #[tokio::test]
    async fn silent_when_disabled() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let cb = TelemetryCallback::with_sink(false, Box::new(CapturingSink(Arc::clone(&events))));
        cb.on_run_start(&ctx(), &[]).await;
        cb.on_run_end(&ctx(), &[], &[]).await;
        assert!(events.lock().unwrap().is_empty());
    }
}
