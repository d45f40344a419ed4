// Copyright (c) 2025-2026 Deskpilot Contributors
//
// SPDX-License-Identifier: Apache-2.0
use tracing::debug;

use deskpilot_items::{Action, Button};

use crate::{ComputerError, ComputerHandler};

/// Milliseconds slept for a `wait` action.
const WAIT_MS: u64 = 1000;

/// Dispatch one normalized action to the handler.
///
/// The mapping is fixed:
/// - a `click` with the wheel button has no first-class handler call and is
///   synthesized as a zero-delta scroll at the same position;
/// - `triple_click` is three sequential clicks;
/// - `screenshot` invokes the handler but discards the result — the
///   orchestrator's implicit post-action screenshot is the one that lands
///   in the trace.
pub async fn dispatch_action(
    handler: &dyn ComputerHandler,
    action: &Action,
) -> Result<(), ComputerError> {
    debug!(action = action.kind(), "dispatching computer action");
    match action {
        Action::Click { x, y, button: Button::Wheel } => handler.scroll(*x, *y, 0, 0).await,
        Action::Click { x, y, button } => handler.click(*x, *y, *button).await,
        Action::DoubleClick { x, y } => handler.double_click(*x, *y).await,
        Action::TripleClick { button, x, y } => {
            for _ in 0..3 {
                handler.click(*x, *y, *button).await?;
            }
            Ok(())
        }
        Action::Move { x, y } => handler.move_cursor(*x, *y).await,
        Action::Scroll { x, y, scroll_x, scroll_y } => {
            handler.scroll(*x, *y, *scroll_x, *scroll_y).await
        }
        Action::Type { text } => handler.type_text(text).await,
        Action::Keypress { keys } => handler.keypress(keys).await,
        Action::Drag { path } => handler.drag(path).await,
        Action::Wait => handler.wait(WAIT_MS).await,
        Action::Screenshot => handler.screenshot().await.map(|_| ()),
        Action::LeftMouseDown { x, y } => handler.left_mouse_down(*x, *y).await,
        Action::LeftMouseUp { x, y } => handler.left_mouse_up(*x, *y).await,
    }
}
