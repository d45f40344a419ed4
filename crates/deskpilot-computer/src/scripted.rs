// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

use deskpilot_items::{Button, Point};

use crate::{ComputerError, ComputerHandler, Environment};

/// Deterministic computer double for tests.
///
/// Records every received call as a readable string, serves screenshots from
/// a queue (falling back to a generated PNG when the queue is empty), and
/// can be armed to fail a named method exactly once — the shape handler
/// failures take in the error-conversion scenarios.
pub struct ScriptedComputer {
    width: u32,
    height: u32,
    environment: Environment,
    calls: Mutex<Vec<String>>,
    screenshots: Mutex<Vec<String>>,
    fail_next: Mutex<Option<(String, String)>>,
}

impl ScriptedComputer {
    pub fn new() -> Self {
        Self::with_dimensions(1280, 800)
    }

    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            environment: Environment::Linux,
            calls: Mutex::new(Vec::new()),
            screenshots: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// Queue a screenshot to be served by the next `screenshot()` call.
    pub fn push_screenshot(&self, b64: impl Into<String>) {
        self.screenshots.lock().unwrap().push(b64.into());
    }

    /// Arm a one-shot failure for the named method (`"click"`, `"type"`, …).
    pub fn fail_next(&self, method: impl Into<String>, msg: impl Into<String>) {
        *self.fail_next.lock().unwrap() = Some((method.into(), msg.into()));
    }

    /// All calls received so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_fail(&self, method: &str) -> Result<(), ComputerError> {
        let mut slot = self.fail_next.lock().unwrap();
        if let Some((m, msg)) = slot.as_ref() {
            if m == method {
                let msg = msg.clone();
                *slot = None;
                return Err(ComputerError::ActionFailed(msg));
            }
        }
        Ok(())
    }

    fn generated_png(&self) -> String {
        let img = image::RgbImage::from_pixel(self.width, self.height, image::Rgb([0, 0, 0]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .expect("png encode");
        B64.encode(buf.into_inner())
    }
}

impl Default for ScriptedComputer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ComputerHandler for ScriptedComputer {
    async fn screenshot(&self) -> Result<String, ComputerError> {
        self.record("screenshot".into());
        self.check_fail("screenshot")?;
        let queued = {
            let mut q = self.screenshots.lock().unwrap();
            if q.is_empty() {
                None
            } else {
                Some(q.remove(0))
            }
        };
        Ok(queued.unwrap_or_else(|| self.generated_png()))
    }

    async fn get_dimensions(&self) -> Result<(u32, u32), ComputerError> {
        Ok((self.width, self.height))
    }

    async fn get_environment(&self) -> Result<Environment, ComputerError> {
        Ok(self.environment)
    }

    async fn click(&self, x: i64, y: i64, button: Button) -> Result<(), ComputerError> {
        self.record(format!("click({x},{y},{})", button.as_str()));
        self.check_fail("click")
    }

    async fn double_click(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("double_click({x},{y})"));
        self.check_fail("double_click")
    }

    async fn move_cursor(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("move({x},{y})"));
        self.check_fail("move")
    }

    async fn scroll(&self, x: i64, y: i64, sx: i64, sy: i64) -> Result<(), ComputerError> {
        self.record(format!("scroll({x},{y},{sx},{sy})"));
        self.check_fail("scroll")
    }

    async fn type_text(&self, text: &str) -> Result<(), ComputerError> {
        self.record(format!("type({text})"));
        self.check_fail("type")
    }

    async fn keypress(&self, keys: &[String]) -> Result<(), ComputerError> {
        self.record(format!("keypress({})", keys.join("+")));
        self.check_fail("keypress")
    }

    async fn drag(&self, path: &[Point]) -> Result<(), ComputerError> {
        self.record(format!("drag({} points)", path.len()));
        self.check_fail("drag")
    }

    async fn wait(&self, ms: u64) -> Result<(), ComputerError> {
        self.record(format!("wait({ms})"));
        Ok(())
    }

    async fn left_mouse_down(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("left_mouse_down({x},{y})"));
        self.check_fail("left_mouse_down")
    }

    async fn left_mouse_up(&self, x: i64, y: i64) -> Result<(), ComputerError> {
        self.record(format!("left_mouse_up({x},{y})"));
        self.check_fail("left_mouse_up")
    }
}
