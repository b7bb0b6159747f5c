// src/geometry.rs

use crate::error::{CaptureError, Result};

/// Rectangle in desktop pixel coordinates, origin at the top-left corner.
///
/// Width and height stay signed so a drag can run up or left of its anchor;
/// call [`Rect::normalized`] before handing one to anything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Rect { x, y, w, h }
    }

    /// Span from `anchor` to `current`, negative when the drag runs backwards.
    pub fn from_drag(anchor: (i32, i32), current: (i32, i32)) -> Self {
        Rect {
            x: anchor.0,
            y: anchor.1,
            w: current.0 - anchor.0,
            h: current.1 - anchor.1,
        }
    }

    /// Moves the origin past any negative extent so `w` and `h` are non-negative.
    pub fn normalized(self) -> Self {
        let mut r = self;
        if r.w < 0 {
            r.x += r.w;
            r.w = -r.w;
        }
        if r.h < 0 {
            r.y += r.h;
            r.h = -r.h;
        }
        r
    }

    /// Grows a normalized drag span by one pixel on each axis; both corner
    /// pixels of the drag belong to the selection.
    pub fn inclusive(self) -> Self {
        Rect { w: self.w + 1, h: self.h + 1, ..self }
    }

    pub fn is_empty(&self) -> bool {
        self.w == 0 || self.h == 0
    }

    /// Edge-inclusive containment, so a point on the shared border of two
    /// monitors belongs to the first one enumerated.
    pub fn contains_inclusive(&self, px: i32, py: i32) -> bool {
        px >= self.x && py >= self.y && px <= self.x + self.w && py <= self.y + self.h
    }
}

/// Parses a fixed capture rectangle.
///
/// `xyw` holds `X,Y,W` and `h` holds `H`; when `h` is absent the packed
/// `X,Y,W,H` form is expected in `xyw`. Every token is a plain non-negative
/// decimal number.
pub fn parse_coordinates(xyw: &str, h: Option<&str>) -> Result<Rect> {
    let invalid = || CaptureError::InvalidArgument(match h {
        Some(h) => format!("{xyw} {h}"),
        None => xyw.to_string(),
    });

    let mut tokens: Vec<&str> = xyw.split(',').collect();
    match h {
        Some(h) if tokens.len() == 3 => tokens.push(h),
        None if tokens.len() == 4 => {}
        _ => return Err(invalid()),
    }

    let mut values = [0i32; 4];
    for (slot, token) in values.iter_mut().zip(&tokens) {
        *slot = parse_decimal(token).ok_or_else(invalid)?;
    }
    let [x, y, w, h] = values;
    Ok(Rect::new(x, y, w, h))
}

/// Digits only, and within what an X11 coordinate can address.
fn parse_decimal(token: &str) -> Option<i32> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse::<u16>().ok().map(i32::from)
}

/// First monitor (in enumeration order) containing the point, or the whole
/// desktop when none does.
pub fn monitor_at(point: (i32, i32), monitors: &[Rect], desktop: Rect) -> Rect {
    monitors
        .iter()
        .copied()
        .find(|m| m.contains_inclusive(point.0, point.1))
        .filter(|m| !m.is_empty())
        .unwrap_or(desktop)
}

/// Geometry of a window as reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowGeometry {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
    pub border_width: i32,
}

impl WindowGeometry {
    /// Outer rectangle: the border is counted on both sides.
    pub fn outer(&self) -> Rect {
        Rect::new(
            self.x,
            self.y,
            self.width + 2 * self.border_width,
            self.height + 2 * self.border_width,
        )
    }
}
