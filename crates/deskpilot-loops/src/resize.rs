// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Coordinate-space mapping between the screen and what the model saw.
//!
//! Vision backends do not consume screenshots at native resolution: the
//! preprocessor snaps both sides to a patch-size multiple and clamps total
//! area.  [`smart_resize`] reproduces that computation so coordinates can be
//! mapped model-space → screen-space (consuming actions) and back (drawing
//! into prompts).

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

use deskpilot_items::parse_data_url;

/// Patch multiple used by Qwen-family processors.
pub const QWEN_FACTOR: u32 = 32;
/// Minimum pixel area accepted by Qwen-family processors.
pub const QWEN_MIN_PIXELS: u32 = 3136;
/// Maximum pixel area accepted by Qwen-family processors.
pub const QWEN_MAX_PIXELS: u32 = 12_845_056;

/// Dimensions the model actually consumed for an `height`×`width` input.
///
/// Both sides are rounded to the nearest `factor` multiple, then scaled so
/// the area lands inside `[min_pixels, max_pixels]` while preserving aspect
/// ratio.  Mirrors the reference processor arithmetic exactly — floor when
/// shrinking, ceil when growing.
pub fn smart_resize(
    height: u32,
    width: u32,
    factor: u32,
    min_pixels: u32,
    max_pixels: u32,
) -> (u32, u32) {
    let round_by = |v: f64| -> u32 { ((v / factor as f64).round() as u32).max(1) * factor };
    let floor_by = |v: f64| -> u32 { ((v / factor as f64).floor() as u32).max(1) * factor };
    let ceil_by = |v: f64| -> u32 { ((v / factor as f64).ceil() as u32).max(1) * factor };

    let (h, w) = (height as f64, width as f64);
    let mut h_bar = round_by(h);
    let mut w_bar = round_by(w);

    if (h_bar as u64) * (w_bar as u64) > max_pixels as u64 {
        let beta = ((h * w) / max_pixels as f64).sqrt();
        h_bar = floor_by(h / beta);
        w_bar = floor_by(w / beta);
    } else if h_bar * w_bar < min_pixels {
        let beta = (min_pixels as f64 / (h * w)).sqrt();
        h_bar = ceil_by(h * beta);
        w_bar = ceil_by(w * beta);
    }
    (h_bar, w_bar)
}

/// Map a model-space coordinate back to screen space.
pub fn model_to_screen(
    x: f64,
    y: f64,
    model_dims: (u32, u32),
    screen_dims: (u32, u32),
) -> (i64, i64) {
    let (mw, mh) = model_dims;
    let (sw, sh) = screen_dims;
    let sx = x * sw as f64 / mw.max(1) as f64;
    let sy = y * sh as f64 / mh.max(1) as f64;
    (sx.round() as i64, sy.round() as i64)
}

/// Map a 0–1000 normalized coordinate to screen pixels.
pub fn norm1000_to_screen(x: f64, y: f64, screen_dims: (u32, u32)) -> (i64, i64) {
    model_to_screen(x, y, (1000, 1000), screen_dims)
}

/// Pixel dimensions `(width, height)` of a base64 PNG (bare or data URL).
pub fn image_dimensions_b64(image: &str) -> Option<(u32, u32)> {
    let b64 = parse_data_url(image).map(|(_, b)| b).unwrap_or(image);
    let bytes = B64.decode(b64).ok()?;
    let img = image::load_from_memory(&bytes).ok()?;
    Some((img.width(), img.height()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn smart_resize_snaps_to_factor_multiples() {
        let (h, w) = smart_resize(768, 1024, 32, QWEN_MIN_PIXELS, QWEN_MAX_PIXELS);
        assert_eq!(h % 32, 0);
        assert_eq!(w % 32, 0);
        // Already inside the area budget: only rounding applies.
        assert_eq!((h, w), (768, 1024));
    }

    #[test]
    fn smart_resize_shrinks_oversized_input() {
        let (h, w) = smart_resize(4320, 7680, 32, QWEN_MIN_PIXELS, QWEN_MAX_PIXELS);
        assert!((h as u64) * (w as u64) <= QWEN_MAX_PIXELS as u64);
        assert_eq!(h % 32, 0);
        assert_eq!(w % 32, 0);
        // Aspect ratio is approximately preserved.
        let ratio_in = 7680.0 / 4320.0;
        let ratio_out = w as f64 / h as f64;
        assert!((ratio_in - ratio_out).abs() < 0.1);
    }

    #[test]
    fn smart_resize_grows_undersized_input() {
        let (h, w) = smart_resize(20, 20, 32, QWEN_MIN_PIXELS, QWEN_MAX_PIXELS);
        assert!(h * w >= QWEN_MIN_PIXELS);
    }

    #[test]
    fn model_to_screen_scales_linearly() {
        // Model saw 512×512, screen is 1024×768.
        assert_eq!(model_to_screen(256.0, 256.0, (512, 512), (1024, 768)), (512, 384));
    }

    #[test]
    fn norm1000_maps_full_range() {
        assert_eq!(norm1000_to_screen(0.0, 0.0, (1920, 1080)), (0, 0));
        assert_eq!(norm1000_to_screen(1000.0, 1000.0, (1920, 1080)), (1920, 1080));
        assert_eq!(norm1000_to_screen(500.0, 500.0, (1920, 1080)), (960, 540));
    }

    #[test]
    fn image_dimensions_parse_generated_png() {
        let img = image::RgbImage::from_pixel(17, 9, image::Rgb([1, 2, 3]));
        let mut buf = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut buf, image::ImageFormat::Png)
            .unwrap();
        let b64 = B64.encode(buf.into_inner());
        assert_eq!(image_dimensions_b64(&b64), Some((17, 9)));
        let data_url = format!("data:image/png;base64,{b64}");
        assert_eq!(image_dimensions_b64(&data_url), Some((17, 9)));
    }
}
