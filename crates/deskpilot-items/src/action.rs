// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

// ─── Mouse buttons ────────────────────────────────────────────────────────────

/// Mouse button for click actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Button {
    #[default]
    Left,
    Right,
    Wheel,
    Back,
    Forward,
}

impl Button {
    /// Parse a button name as emitted by model output (`"left"`, `"right"`, …).
    /// Unknown names fall back to `Left`.
    pub fn from_str_lossy(s: &str) -> Self {
        match s {
            "right" => Self::Right,
            "wheel" | "middle" => Self::Wheel,
            "back" => Self::Back,
            "forward" => Self::Forward,
            _ => Self::Left,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
            Self::Wheel => "wheel",
            Self::Back => "back",
            Self::Forward => "forward",
        }
    }
}

/// A point on a drag path, absolute screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

// ─── Normalized actions ───────────────────────────────────────────────────────

/// The frozen action vocabulary dispatched to a computer handler.
///
/// Coordinates are absolute pixel integers in screen space.  Model output
/// that uses a different vocabulary (aliased action names, `coordinate`
/// arrays, normalized 0–1000 spaces) is repaired by the operator normalizer
/// or rescaled by the emitting loop strategy *before* an `Action` is built;
/// parsing rejects unknown action types and stray fields outright rather
/// than coercing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
pub enum Action {
    Click {
        x: i64,
        y: i64,
        #[serde(default)]
        button: Button,
    },
    DoubleClick {
        x: i64,
        y: i64,
    },
    TripleClick {
        #[serde(default)]
        button: Button,
        x: i64,
        y: i64,
    },
    Move {
        x: i64,
        y: i64,
    },
    Scroll {
        x: i64,
        y: i64,
        #[serde(default)]
        scroll_x: i64,
        #[serde(default)]
        scroll_y: i64,
    },
    Type {
        text: String,
    },
    Keypress {
        keys: Vec<String>,
    },
    Drag {
        path: Vec<Point>,
    },
    Wait,
    Screenshot,
    LeftMouseDown {
        x: i64,
        y: i64,
    },
    LeftMouseUp {
        x: i64,
        y: i64,
    },
}

impl Action {
    /// Short action name matching the wire `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Click { .. } => "click",
            Self::DoubleClick { .. } => "double_click",
            Self::TripleClick { .. } => "triple_click",
            Self::Move { .. } => "move",
            Self::Scroll { .. } => "scroll",
            Self::Type { .. } => "type",
            Self::Keypress { .. } => "keypress",
            Self::Drag { .. } => "drag",
            Self::Wait => "wait",
            Self::Screenshot => "screenshot",
            Self::LeftMouseDown { .. } => "left_mouse_down",
            Self::LeftMouseUp { .. } => "left_mouse_up",
        }
    }

    /// Primary coordinate of this action, when it has one.
    pub fn coordinate(&self) -> Option<(i64, i64)> {
        match self {
            Self::Click { x, y, .. }
            | Self::DoubleClick { x, y }
            | Self::TripleClick { x, y, .. }
            | Self::Move { x, y }
            | Self::Scroll { x, y, .. }
            | Self::LeftMouseDown { x, y }
            | Self::LeftMouseUp { x, y } => Some((*x, *y)),
            Self::Drag { path } => path.first().map(|p| (p.x, p.y)),
            _ => None,
        }
    }

    /// Replace the primary coordinate, leaving other fields intact.
    /// No-op for actions without one.
    pub fn with_coordinate(mut self, nx: i64, ny: i64) -> Self {
        match &mut self {
            Self::Click { x, y, .. }
            | Self::DoubleClick { x, y }
            | Self::TripleClick { x, y, .. }
            | Self::Move { x, y }
            | Self::Scroll { x, y, .. }
            | Self::LeftMouseDown { x, y }
            | Self::LeftMouseUp { x, y } => {
                *x = nx;
                *y = ny;
            }
            Self::Drag { path } => {
                if let Some(p) = path.first_mut() {
                    p.x = nx;
                    p.y = ny;
                }
            }
            _ => {}
        }
        self
    }
}

// ─── Unit tests ──────────────────────────────────────────────────────────────
