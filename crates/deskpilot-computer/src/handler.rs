// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use deskpilot_items::{Button, Point};

use crate::error::ComputerError;

/// Desktop environment a handler is driving.  Forwarded to providers whose
/// computer-use tools take an environment hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Mac,
    Windows,
    #[default]
    Linux,
    Browser,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mac => "mac",
            Self::Windows => "windows",
            Self::Linux => "linux",
            Self::Browser => "browser",
        }
    }
}

/// Abstract computer capability invoked by the agent loop.
///
/// All methods are async and may suspend for arbitrary durations — the
/// handler typically fronts a remote desktop or VM.  `screenshot` returns a
/// PNG as a bare base64 string (no data-URL prefix).
///
/// A handler that implements only `screenshot` / `get_dimensions` /
/// `get_environment` and rejects the rest is valid: benchmark harnesses use
/// such shims when action execution happens outside the loop.
#[async_trait]
pub trait ComputerHandler: Send + Sync {
    async fn screenshot(&self) -> Result<String, ComputerError>;

    /// Screen size in pixels, `(width, height)`.
    async fn get_dimensions(&self) -> Result<(u32, u32), ComputerError>;

    async fn get_environment(&self) -> Result<Environment, ComputerError>;

    async fn click(&self, x: i64, y: i64, button: Button) -> Result<(), ComputerError>;

    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError>;

    async fn move_cursor(&self, x: i64, y: i64) -> Result<(), ComputerError>;

    async fn scroll(
        &self,
        x: i64,
        y: i64,
        scroll_x: i64,
        scroll_y: i64,
    ) -> Result<(), ComputerError>;

    async fn type_text(&self, text: &str) -> Result<(), ComputerError>;

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError>;

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError>;

    /// Sleep for `ms` milliseconds on the computer side.
    async fn wait(&self, ms: u64) -> Result<(), ComputerError>;

    async fn left_mouse_down(&self, x: i64, y: i64) -> Result<(), ComputerError>;

    async fn left_mouse_up(&self, x: i64, y: i64) -> Result<(), ComputerError>;

    /// Current browser URL, for browser environments.  `None` elsewhere.
    async fn get_current_url(&self) -> Result<Option<String>, ComputerError> {
        Ok(None)
    }
}
