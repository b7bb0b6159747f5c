// src/selection_logic.rs
// Pure drag state machine; no display connection in here.

use crate::error::{CaptureError, Result};
use crate::geometry::Rect;

/// Core protocol button number of the primary (left) button.
pub const PRIMARY_BUTTON: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrow {
    Left,
    Right,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Arrow(Arrow),
    /// Any other keysym.
    Other(u32),
}

/// Input delivered while the pointer and keyboard are grabbed.
/// Positions are root (desktop) coordinates of the pointer. A release
/// carries none since the span comes from the last motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorEvent {
    Press { x: i32, y: i32, button: u8 },
    Motion { x: i32, y: i32 },
    Release,
    Key { key: Key, x: i32, y: i32 },
}

/// Which way the drag points, used to pick the pointer glyph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quadrant {
    UpLeft = 0,
    UpRight = 1,
    DownLeft = 2,
    DownRight = 3,
}

impl Quadrant {
    pub fn from_delta(dx: i32, dy: i32) -> Self {
        match (dx >= 0, dy >= 0) {
            (false, false) => Quadrant::UpLeft,
            (true, false) => Quadrant::UpRight,
            (false, true) => Quadrant::DownLeft,
            (true, true) => Quadrant::DownRight,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DragState {
    pub anchor: (i32, i32),
    pub current: (i32, i32),
    /// A button is held; key nudges also re-render while this is set.
    pub active: bool,
    pub primary: bool,
}

/// What the overlay should show after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Feedback {
    pub glyph: Quadrant,
    /// Left, right, top and bottom strips of the outline.
    pub outline: [Rect; 4],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionResult {
    /// Normalized drag span, corners exclusive.
    pub rect: Rect,
    pub ended_by_primary: bool,
}

impl SelectionResult {
    /// The region to capture, or `None` when the drag covered no area
    /// and the caller has to pick a fallback.
    pub fn region(&self) -> Option<Rect> {
        (!self.rect.is_empty()).then(|| self.rect.inclusive())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue(Option<Feedback>),
    Done(SelectionResult),
}

/// 矩形选区状态机
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    drag: DragState,
    screen: (i32, i32),
}

impl Selection {
    pub fn new(screen_width: i32, screen_height: i32) -> Self {
        Selection {
            drag: DragState { primary: true, ..DragState::default() },
            screen: (screen_width, screen_height),
        }
    }

    pub fn drag(&self) -> &DragState {
        &self.drag
    }

    pub fn handle(&mut self, event: SelectorEvent) -> Result<Step> {
        match event {
            SelectorEvent::Press { x, y, button } => {
                self.drag.anchor = (x, y);
                self.drag.current = (x, y);
                self.drag.primary = button == PRIMARY_BUTTON;
                self.drag.active = true;
                Ok(Step::Continue(None))
            }
            SelectorEvent::Key { key: Key::Arrow(arrow), x, y } => {
                self.nudge(arrow);
                if !self.drag.active {
                    self.drag.current = self.drag.anchor;
                    return Ok(Step::Continue(None));
                }
                self.drag.current = (x, y);
                Ok(Step::Continue(Some(self.feedback())))
            }
            SelectorEvent::Key { key: Key::Other(sym), .. } => {
                Err(CaptureError::UnexpectedInput(sym))
            }
            SelectorEvent::Motion { x, y } => {
                if !self.drag.active {
                    return Ok(Step::Continue(None));
                }
                self.drag.current = (x, y);
                Ok(Step::Continue(Some(self.feedback())))
            }
            // The span comes from the last motion, not the release position.
            SelectorEvent::Release => Ok(Step::Done(self.finish())),
        }
    }

    fn nudge(&mut self, arrow: Arrow) {
        let (x, y) = &mut self.drag.anchor;
        match arrow {
            Arrow::Left => *x = (*x - 1).max(0),
            Arrow::Right => *x = (*x + 1).min(self.screen.0),
            Arrow::Up => *y = (*y - 1).max(0),
            Arrow::Down => *y = (*y + 1).min(self.screen.1),
        }
    }

    fn feedback(&self) -> Feedback {
        let span = Rect::from_drag(self.drag.anchor, self.drag.current);
        let r = span.normalized();
        Feedback {
            glyph: Quadrant::from_delta(span.w, span.h),
            outline: [
                Rect::new(r.x, r.y, 1, r.h),
                Rect::new(r.x + r.w, r.y, 1, r.h),
                Rect::new(r.x, r.y, r.w, 1),
                Rect::new(r.x, r.y + r.h, r.w, 1),
            ],
        }
    }

    fn finish(&self) -> SelectionResult {
        let rect = if self.drag.active {
            Rect::from_drag(self.drag.anchor, self.drag.current).normalized()
        } else {
            Rect::new(self.drag.anchor.0, self.drag.anchor.1, 0, 0)
        };
        SelectionResult { rect, ended_by_primary: self.drag.primary }
    }
}
