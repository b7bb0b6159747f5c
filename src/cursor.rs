// src/cursor.rs

use crate::capture::PixelBuffer;
use crate::geometry::Rect;

/// Cursor bitmap as reported by the server, ARGB with alpha in the top byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorImage {
    pub width: i32,
    pub height: i32,
    pub hotspot_x: i32,
    pub hotspot_y: i32,
    pub origin_x: i32,
    pub origin_y: i32,
    pub pixels: Vec<u32>,
}

/// Source-over blend of one ARGB pixel onto another; the result is opaque.
pub fn blend(dest: u32, source: u32) -> u32 {
    let alpha = (source >> 24 & 0xff) as f32 / 255.0;
    let channel = |shift: u32| {
        let d = (dest >> shift & 0xff) as f32;
        let s = (source >> shift & 0xff) as f32;
        (d * (1.0 - alpha) + s * alpha) as u32 & 0xff
    };
    0xff << 24 | channel(16) << 16 | channel(8) << 8 | channel(0)
}

/// Blends `cursor` into `buffer`, whose top-left sits at `area.x, area.y`.
///
/// The clip test compares the lower bounds against the raw origin and the
/// upper bounds against the hotspot-adjusted origin, while the destination
/// index always uses the hotspot-adjusted origin. Pixels whose index lands
/// outside the buffer are skipped. Fully transparent source pixels leave the
/// destination untouched.
pub fn composite(buffer: &mut PixelBuffer, area: Rect, cursor: &CursorImage) {
    let (w, h) = (area.w, area.h);
    let left = cursor.origin_x - cursor.hotspot_x - area.x;
    let top = cursor.origin_y - cursor.hotspot_y - area.y;

    for i in 0..cursor.height {
        for j in 0..cursor.width {
            let visible = cursor.origin_x + j >= area.x
                && cursor.origin_y + i >= area.y
                && left + j < w
                && top + i < h;
            if !visible {
                continue;
            }
            let Some(&source) = cursor.pixels.get((i * cursor.width + j) as usize) else {
                continue;
            };
            if source >> 24 == 0 {
                continue;
            }
            let index = i64::from(top + i) * i64::from(w) + i64::from(left + j);
            if let Some(dest) = usize::try_from(index).ok().and_then(|k| buffer.pixels.get_mut(k)) {
                *dest = blend(*dest, source);
            }
        }
    }
}
