// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use deskpilot_items::{ChatContent, ChatMessage, ChatRole, Item, ToolCallPayload, Usage};

use crate::{
    client::{ChatChoice, ChatRequest, ChatResponse, ResponsesRequest, ResponsesResponse},
    routes::split_model,
    CompletionClient, ModelError,
};

/// HTTP implementation of the unified completion surface.
///
/// Routes `provider/model` identifiers through the static routing table,
/// resolves credentials from the environment, and speaks the
/// OpenAI-compatible JSON wire format.  No streaming: the agent loop is
/// turn-based and consumes whole responses.
pub struct HttpCompletionClient {
    client: reqwest::Client,
    /// When set, overrides every route's base URL (gateways, tests).
    base_url: Option<String>,
    /// When set, overrides environment key resolution.
    api_key: Option<String>,
}

impl HttpCompletionClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(180))
            .build()
            .expect("reqwest client");
        Self { client, base_url: None, api_key: None }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Resolve `(url_base, bare_model, api_key)` for a model identifier.
    fn resolve(&self, model: &str) -> Result<(String, String, Option<String>), ModelError> {
        let (route, bare) = split_model(model);
        let base = self
            .base_url
            .clone()
            .unwrap_or_else(|| route.base_url.to_string());
        let key = self.api_key.clone().or_else(|| {
            route
                .api_key_env
                .and_then(|env| std::env::var(env).ok().filter(|v| !v.is_empty()))
        });
        if key.is_none() && route.requires_api_key && self.base_url.is_none() {
            return Err(ModelError::MissingApiKey {
                provider: route.id.to_string(),
                env: route.api_key_env.unwrap_or("API_KEY").to_string(),
            });
        }
        Ok((base.trim_end_matches('/').to_string(), bare.to_string(), key))
    }

    async fn post_json(
        &self,
        url: &str,
        api_key: Option<&str>,
        body: &Value,
    ) -> Result<Value, ModelError> {
        debug!(%url, "completion request");
        let mut req = self.client.post(url).json(body);
        if let Some(key) = api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| {
            if e.is_timeout() || e.is_connect() {
                ModelError::Transient { status: None, message: e.to_string(), retry_after: None }
            } else {
                ModelError::Fatal { status: None, message: e.to_string() }
            }
        })?;

        let status = resp.status();
        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            let message = resp.text().await.unwrap_or_default();
            let code = status.as_u16();
            return if code == 408 || code == 429 || code >= 500 {
                Err(ModelError::Transient { status: Some(code), message, retry_after })
            } else {
                Err(ModelError::Fatal { status: Some(code), message })
            };
        }

        resp.json::<Value>()
            .await
            .map_err(|e| ModelError::Malformed(e.to_string()))
    }
}

impl Default for HttpCompletionClient {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize, Default)]
struct WireTokenDetails {
    #[serde(default)]
    cached_tokens: u64,
    #[serde(default)]
    reasoning_tokens: u64,
}

/// Usage as reported by either wire surface.  Chat completions use
/// `prompt_tokens`/`completion_tokens`; the responses surface uses
/// `input_tokens`/`output_tokens`.  Gateways that price requests report
/// `cost`.
#[derive(Deserialize, Default)]
struct WireUsage {
    #[serde(default, alias = "input_tokens")]
    prompt_tokens: u64,
    #[serde(default, alias = "output_tokens")]
    completion_tokens: u64,
    #[serde(default)]
    total_tokens: u64,
    #[serde(default, alias = "response_cost")]
    cost: f64,
    #[serde(default, alias = "input_tokens_details")]
    prompt_tokens_details: WireTokenDetails,
    #[serde(default, alias = "output_tokens_details")]
    completion_tokens_details: WireTokenDetails,
}

impl WireUsage {
    fn into_usage(self) -> Usage {
        let total = if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens + self.completion_tokens
        };
        Usage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens: total,
            response_cost: self.cost,
            input_tokens_details: deskpilot_items::InputTokensDetails {
                cached_tokens: self.prompt_tokens_details.cached_tokens,
            },
            output_tokens_details: deskpilot_items::OutputTokensDetails {
                reasoning_tokens: self.completion_tokens_details.reasoning_tokens,
            },
        }
    }
}

#[derive(Deserialize)]
struct WireChatMessage {
    role: ChatRole,
    #[serde(default)]
    content: Option<ChatContent>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: WireChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct WireChatResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: WireUsage,
}

fn parse_chat_response(value: Value) -> Result<ChatResponse, ModelError> {
    let wire: WireChatResponse =
        serde_json::from_value(value).map_err(|e| ModelError::Malformed(e.to_string()))?;
    Ok(ChatResponse {
        choices: wire
            .choices
            .into_iter()
            .map(|c| ChatChoice {
                message: ChatMessage {
                    role: c.message.role,
                    content: c.message.content.unwrap_or(ChatContent::Text(String::new())),
                    tool_calls: c.message.tool_calls,
                    tool_call_id: None,
                },
                finish_reason: c.finish_reason,
            })
            .collect(),
        usage: wire.usage.into_usage(),
    })
}

fn parse_responses_response(value: Value) -> Result<ResponsesResponse, ModelError> {
    let usage = value
        .get("usage")
        .cloned()
        .map(|u| serde_json::from_value::<WireUsage>(u).unwrap_or_default())
        .unwrap_or_default()
        .into_usage();
    let raw_items = value
        .get("output")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();
    // Tolerate item types this runtime does not model (e.g. provider-side
    // search calls): skip them rather than failing the whole turn.
    let output = raw_items
        .into_iter()
        .filter_map(|v| match serde_json::from_value::<Item>(v) {
            Ok(item) => Some(item),
            Err(e) => {
                warn!(error = %e, "skipping unrecognized response item");
                None
            }
        })
        .collect();
    Ok(ResponsesResponse { output, usage })
}

// ─── Client impl ──────────────────────────────────────────────────────────────

#[async_trait]
impl CompletionClient for HttpCompletionClient {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ModelError> {
        let (base, model, key) = self.resolve(&req.model)?;
        let mut body = json!({
            "model": model,
            "messages": req.messages,
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.clone());
        }
        if let Some(mt) = req.max_tokens {
            body["max_tokens"] = json!(mt);
        }
        if let Some(t) = req.temperature {
            body["temperature"] = json!(t);
        }
        let url = format!("{base}/chat/completions");
        let value = self.post_json(&url, key.as_deref(), &body).await?;
        parse_chat_response(value)
    }

    async fn responses(&self, req: ResponsesRequest) -> Result<ResponsesResponse, ModelError> {
        let (base, model, key) = self.resolve(&req.model)?;
        let mut body = json!({
            "model": model,
            "input": req.input,
            "reasoning": { "summary": "concise" },
            "truncation": "auto",
        });
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.clone());
        }
        if let Some(mt) = req.max_tokens {
            body["max_output_tokens"] = json!(mt);
        }
        let url = format!("{base}/responses");
        let value = self.post_json(&url, key.as_deref(), &body).await?;
        parse_responses_response(value)
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
