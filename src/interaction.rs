//! Touch gestures: pinch to zoom, tap release to refocus.

use crate::errors::BestEffort;
use crate::session::Session;
use crate::types::SessionState;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GestureAction {
    /// First pointer pressed.
    Down,
    /// An additional pointer pressed.
    PointerDown,
    Move,
    /// Last pointer released.
    Up,
    /// A pointer released while others remain.
    PointerUp,
    Cancel,
}

/// One gesture event with every active pointer position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GestureEvent {
    pub action: GestureAction,
    pub pointers: Vec<(f32, f32)>,
}

impl GestureEvent {
    pub fn new(action: GestureAction, pointers: Vec<(f32, f32)>) -> Self {
        Self { action, pointers }
    }

    /// Distance between the first two pointers.
    pub fn spread(&self) -> Option<f32> {
        match self.pointers.as_slice() {
            [(x0, y0), (x1, y1), ..] => Some((x1 - x0).hypot(y1 - y0)),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
pub struct InteractionController {
    last_spread: f32,
}

impl InteractionController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one gesture to the session. Returns `false` while the session
    /// is closed, `true` once the event was consumed.
    pub fn handle(&mut self, session: &Session, event: &GestureEvent) -> bool {
        if session.state() == SessionState::Closed {
            return false;
        }

        if event.pointers.len() > 1 {
            if !session.can_zoom() {
                return true;
            }
            session.cancel_autofocus().or_log("cancel autofocus");

            let Some(spread) = event.spread() else {
                return true;
            };
            match event.action {
                GestureAction::PointerDown => self.last_spread = spread,
                GestureAction::Move => {
                    let step = if spread > self.last_spread {
                        1
                    } else if spread < self.last_spread {
                        -1
                    } else {
                        0
                    };
                    if step != 0 {
                        session.step_zoom(step).map(|_| ()).or_log("pinch zoom");
                    }
                    self.last_spread = spread;
                }
                _ => {}
            }
        } else if event.action == GestureAction::Up
            && session.can_autofocus()
            && session.is_capturable()
        {
            session.trigger_autofocus().or_log("tap autofocus");
        }
        true
    }
}
