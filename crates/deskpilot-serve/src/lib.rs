// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! HTTP proxy surface: one agent turn per request.
//!
//! `POST /responses` takes `{model, input, agent_kwargs?}` and returns the
//! turn's output items plus usage; `GET /health` answers liveness probes.
//! Requests run against a screenshot-only shim — callers that need real
//! action execution drive their own computer and resubmit the grown item
//! trace each turn.  Authentication is an optional `X-API-Key` header.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use deskpilot_computer::ScreenshotShim;
use deskpilot_core::{Agent, AgentError};
use deskpilot_items::{Item, RunInput};
use deskpilot_model::CompletionClient;

/// Shared server state.
pub struct AppState {
    pub client: Arc<dyn CompletionClient>,
    /// When set, requests must present it in `X-API-Key`.
    pub api_key: Option<String>,
}

/// Per-request agent options accepted from callers.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AgentKwargs {
    #[serde(default)]
    pub only_n_most_recent_images: Option<usize>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub screenshot_delay: Option<f32>,
}

#[derive(Debug, Deserialize)]
pub struct ResponsesBody {
    pub model: String,
    /// A task string or a full prior item trace.
    pub input: Value,
    #[serde(default)]
    pub agent_kwargs: Option<AgentKwargs>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("missing or invalid API key")]
    Unauthorized,
    #[error("invalid input: {0}")]
    BadInput(String),
    #[error("agent run failed: {0}")]
    Upstream(#[from] AgentError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::BadInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}

fn check_api_key(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.api_key else { return Ok(()) };
    let presented = headers
        .get("x-api-key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if presented == expected {
        Ok(())
    } else {
        Err(ApiError::Unauthorized)
    }
}

fn parse_input(input: Value) -> Result<RunInput, ApiError> {
    if let Some(text) = input.as_str() {
        return Ok(RunInput::Text(text.to_string()));
    }
    let items: Vec<Item> = serde_json::from_value(input)
        .map_err(|e| ApiError::BadInput(format!("input must be a string or items array: {e}")))?;
    Ok(RunInput::Items(items))
}

/// `POST /responses` — run exactly one agent turn.
pub async fn responses_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ResponsesBody>,
) -> Result<Json<Value>, ApiError> {
    check_api_key(&state, &headers)?;
    let input = parse_input(body.input)?;
    let kwargs = body.agent_kwargs.unwrap_or_default();

    let mut agent = Agent::new(body.model, Arc::clone(&state.client))
        .with_computer(Arc::new(ScreenshotShim::default()))
        .with_max_turns(1)
        .with_telemetry(false);
    if let Some(n) = kwargs.only_n_most_recent_images {
        agent = agent.with_only_n_most_recent_images(n);
    }
    if let Some(instructions) = kwargs.instructions {
        agent = agent.with_instructions(instructions);
    }
    if let Some(max_retries) = kwargs.max_retries {
        agent = agent.with_max_retries(max_retries);
    }
    if let Some(delay) = kwargs.screenshot_delay {
        agent = agent.with_screenshot_delay(std::time::Duration::from_secs_f32(delay));
    }

    let (turns, _items) = agent.run_collect(input).await?;
    let turn = turns.into_iter().next();
    let (output, usage) = match turn {
        Some(t) => (t.output, t.usage),
        None => (vec![], Default::default()),
    };
    Ok(Json(json!({ "output": output, "usage": usage })))
}

/// `GET /health`.
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Assemble the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/responses", post(responses_handler))
        .route("/health", get(health_handler))
        .layer(tower_http::cors::CorsLayer::permissive())
        .with_state(state)
}

/// Bind and serve until the process exits.
pub async fn serve(addr: SocketAddr, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "proxy listening");
    axum::serve(listener, app).await?;
    Ok(())
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
