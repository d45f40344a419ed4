// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Unified completion client used by every loop strategy.
//!
//! Strategies decide *what* to send (tool schemas, message shape, action
//! vocabulary); this crate decides *where* and *how*: it routes a
//! `provider/model` identifier to the provider's OpenAI-compatible endpoint,
//! attaches credentials from the environment, performs the HTTP exchange,
//! and classifies failures as transient (retryable) or fatal.
//!
//! Two wire surfaces are exposed: the flat `/chat/completions` shape that
//! most providers speak, and the item-shaped `/responses` surface for models
//! served behind a responses API.

mod client;
mod error;
mod http;
mod mock;
pub mod retry;
mod routes;

pub use client::{
    ChatChoice, ChatRequest, ChatResponse, CompletionClient, ResponsesRequest, ResponsesResponse,
};
pub use error::ModelError;
pub use http::HttpCompletionClient;
pub use mock::ScriptedClient;
pub use routes::{lookup_route, split_model, ProviderRoute, ROUTES};
