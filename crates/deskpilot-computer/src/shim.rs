// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::io::Cursor;
use std::sync::Mutex;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

use deskpilot_items::{Button, Point};

use crate::{ComputerError, ComputerHandler, Environment};

/// Screenshot-only computer handler.
///
/// Benchmark frameworks and the HTTP proxy execute actions through their own
/// transport; the loop still needs dimensions, an environment, and a valid
/// screenshot to negotiate tool schemas and seed grounding.  The shim serves
/// a solid-gray PNG of the configured size and rejects every action method
/// with [`ComputerError::Unsupported`].
pub struct ScreenshotShim {
    width: u32,
    height: u32,
    environment: Environment,
    /// Encoded screenshot, built on first use.
    cached: Mutex<Option<String>>,
}

impl ScreenshotShim {
    pub fn new(width: u32, height: u32, environment: Environment) -> Self {
        Self { width, height, environment, cached: Mutex::new(None) }
    }

    fn render_png(&self) -> Result<String, ComputerError> {
        let img = image::RgbImage::from_pixel(self.width, self.height, image::Rgb([64, 64, 64]));
        let mut buf = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .map_err(|e| ComputerError::Screenshot(e.to_string()))?;
        Ok(B64.encode(buf.into_inner()))
    }
}

impl Default for ScreenshotShim {
    fn default() -> Self {
        Self::new(1024, 768, Environment::Linux)
    }
}

#[async_trait]
impl ComputerHandler for ScreenshotShim {
    async fn screenshot(&self) -> Result<String, ComputerError> {
        if let Some(b64) = self.cached.lock().unwrap().clone() {
            return Ok(b64);
        }
        let b64 = self.render_png()?;
        *self.cached.lock().unwrap() = Some(b64.clone());
        Ok(b64)
    }

    async fn get_dimensions(&self) -> Result<(u32, u32), ComputerError> {
        Ok((self.width, self.height))
    }

    async fn get_environment(&self) -> Result<Environment, ComputerError> {
        Ok(self.environment)
    }

    async fn click(&self, _x: i64, _y: i64, _button: Button) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("click"))
    }

    async fn double_click(&self, _x: i64, _y: i64) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("double_click"))
    }

    async fn move_cursor(&self, _x: i64, _y: i64) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("move"))
    }

    async fn scroll(&self, _x: i64, _y: i64, _sx: i64, _sy: i64) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("scroll"))
    }

    async fn type_text(&self, _text: &str) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("type"))
    }

    async fn keypress(&self, _keys: &[String]) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("keypress"))
    }

    async fn drag(&self, _path: &[Point]) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("drag"))
    }

    async fn wait(&self, _ms: u64) -> Result<(), ComputerError> {
        Ok(())
    }

    async fn left_mouse_down(&self, _x: i64, _y: i64) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("left_mouse_down"))
    }

    async fn left_mouse_up(&self, _x: i64, _y: i64) -> Result<(), ComputerError> {
        Err(ComputerError::Unsupported("left_mouse_up"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shim_serves_decodable_png_of_configured_size() {
        let shim = ScreenshotShim::new(320, 200, Environment::Browser);
        let b64 = shim.screenshot().await.unwrap();
        let bytes = B64.decode(b64).unwrap();
        let img = image::load_from_memory(&bytes).unwrap();
        assert_eq!((img.width(), img.height()), (320, 200));
    }

    #[tokio::test]
    async fn shim_screenshot_is_cached() {
        let shim = ScreenshotShim::default();
        let a = shim.screenshot().await.unwrap();
        let b = shim.screenshot().await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn shim_rejects_actions() {
        let shim = ScreenshotShim::default();
        let err = shim.click(1, 2, Button::Left).await.unwrap_err();
        assert!(matches!(err, ComputerError::Unsupported("click")));
    }

    #[tokio::test]
    async fn shim_reports_dimensions_and_environment() {
        let shim = ScreenshotShim::new(800, 600, Environment::Windows);
        assert_eq!(shim.get_dimensions().await.unwrap(), (800, 600));
        assert_eq!(shim.get_environment().await.unwrap(), Environment::Windows);
    }
}
