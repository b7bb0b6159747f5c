// src/capture.rs

use tracing::{debug, info};

use crate::cli::Mode;
use crate::cursor;
use crate::display::{DisplayServer, WindowTarget};
use crate::error::Result;
use crate::geometry::{self, Rect};

/// Captured pixels, row-major, one `u32` per pixel holding B, G, R, A in
/// memory order (ARGB when read as a little-endian word).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u32>,
}

/// Turns a capture mode into the rectangle to read.
pub fn resolve<D: DisplayServer + ?Sized>(display: &D, mode: &Mode) -> Result<Rect> {
    let rect = match mode {
        Mode::All => display.desktop(),
        Mode::Coordinates(rect) => *rect,
        Mode::Monitor => monitor_at(display, display.pointer_position()?)?,
        Mode::Window => display.window_geometry(WindowTarget::Focused)?.outer(),
        Mode::Select => {
            let selection = display.select_region()?;
            match selection.region() {
                Some(region) => region,
                // A click without a drag captures what is under the pointer.
                None if selection.ended_by_primary => {
                    display.window_geometry(WindowTarget::UnderPointer)?.outer()
                }
                None => monitor_at(display, (selection.rect.x, selection.rect.y))?,
            }
        }
    };
    debug!(?mode, ?rect, "resolved capture area");
    Ok(rect)
}

fn monitor_at<D: DisplayServer + ?Sized>(display: &D, point: (i32, i32)) -> Result<Rect> {
    let monitors = display.monitors()?;
    Ok(geometry::monitor_at(point, &monitors, display.desktop()))
}

/// Reads the pixels of `area`, with the cursor blended in when asked.
pub fn grab<D: DisplayServer + ?Sized>(
    display: &D,
    area: Rect,
    with_cursor: bool,
) -> Result<PixelBuffer> {
    let mut buffer = display.capture(area)?;
    if with_cursor {
        let image = display.cursor_image()?;
        cursor::composite(&mut buffer, area, &image);
    }
    info!(width = buffer.width, height = buffer.height, "captured");
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::CursorImage;
    use crate::error::CaptureError;
    use crate::geometry::WindowGeometry;
    use crate::selection::{self, SelectionSurface};
    use crate::selection_logic::{Feedback, SelectionResult, SelectorEvent};
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct Script(VecDeque<SelectorEvent>);

    impl SelectionSurface for Script {
        fn next_event(&mut self) -> Result<SelectorEvent> {
            Ok(self.0.pop_front().expect("script ran out of events"))
        }

        fn show(&mut self, _: &Feedback) -> Result<()> {
            Ok(())
        }

        fn screen_size(&self) -> (i32, i32) {
            (3840, 1080)
        }
    }

    struct FakeDisplay {
        pointer: (i32, i32),
        monitors: Vec<Rect>,
        focused: WindowGeometry,
        under_pointer: WindowGeometry,
        events: RefCell<Script>,
        cursor: Option<CursorImage>,
        captured: RefCell<Vec<Rect>>,
    }

    impl FakeDisplay {
        fn new(events: &[SelectorEvent]) -> Self {
            FakeDisplay {
                pointer: (2000, 500),
                monitors: vec![Rect::new(0, 0, 1920, 1080), Rect::new(1920, 0, 1920, 1080)],
                focused: WindowGeometry { x: 10, y: 20, width: 300, height: 200, border_width: 1 },
                under_pointer: WindowGeometry {
                    x: 50,
                    y: 60,
                    width: 640,
                    height: 480,
                    border_width: 0,
                },
                events: RefCell::new(Script(events.iter().copied().collect())),
                cursor: None,
                captured: RefCell::new(Vec::new()),
            }
        }
    }

    impl DisplayServer for FakeDisplay {
        fn desktop(&self) -> Rect {
            Rect::new(0, 0, 3840, 1080)
        }

        fn pointer_position(&self) -> Result<(i32, i32)> {
            Ok(self.pointer)
        }

        fn monitors(&self) -> Result<Vec<Rect>> {
            Ok(self.monitors.clone())
        }

        fn window_geometry(&self, target: WindowTarget) -> Result<WindowGeometry> {
            Ok(match target {
                WindowTarget::Focused => self.focused,
                WindowTarget::UnderPointer => self.under_pointer,
            })
        }

        fn select_region(&self) -> Result<SelectionResult> {
            selection::drive(&mut *self.events.borrow_mut())
        }

        fn capture(&self, area: Rect) -> Result<PixelBuffer> {
            self.captured.borrow_mut().push(area);
            Ok(PixelBuffer {
                width: area.w as u32,
                height: area.h as u32,
                pixels: vec![0xff00_0000; (area.w * area.h) as usize],
            })
        }

        fn cursor_image(&self) -> Result<CursorImage> {
            self.cursor.clone().ok_or(CaptureError::QueryFailed {
                what: "get cursor image",
                source: None,
            })
        }
    }

    fn press(x: i32, y: i32, button: u8) -> SelectorEvent {
        SelectorEvent::Press { x, y, button }
    }

    #[test]
    fn interactive_drag_end_to_end() {
        let display = FakeDisplay::new(&[
            press(100, 100, 1),
            SelectorEvent::Motion { x: 300, y: 50 },
            SelectorEvent::Release,
        ]);
        let area = resolve(&display, &Mode::Select).unwrap();
        assert_eq!(area, Rect::new(100, 50, 201, 51));
        let buffer = grab(&display, area, false).unwrap();
        assert_eq!((buffer.width, buffer.height), (201, 51));
        assert_eq!(display.captured.borrow().as_slice(), &[area]);
    }

    #[test]
    fn primary_click_falls_back_to_window_under_pointer() {
        let display = FakeDisplay::new(&[press(70, 80, 1), SelectorEvent::Release]);
        assert_eq!(resolve(&display, &Mode::Select).unwrap(), Rect::new(50, 60, 640, 480));
    }

    #[test]
    fn other_click_falls_back_to_monitor_at_click() {
        let display = FakeDisplay::new(&[press(2500, 80, 3), SelectorEvent::Release]);
        assert_eq!(resolve(&display, &Mode::Select).unwrap(), Rect::new(1920, 0, 1920, 1080));
    }

    #[test]
    fn line_drag_counts_as_click() {
        let display = FakeDisplay::new(&[
            press(10, 10, 3),
            SelectorEvent::Motion { x: 40, y: 10 },
            SelectorEvent::Release,
        ]);
        assert_eq!(resolve(&display, &Mode::Select).unwrap(), Rect::new(0, 0, 1920, 1080));
    }

    #[test]
    fn fallback_never_yields_empty_area() {
        for button in [1, 2, 3] {
            let display = FakeDisplay::new(&[press(5, 5, button), SelectorEvent::Release]);
            assert!(!resolve(&display, &Mode::Select).unwrap().is_empty());
        }
    }

    #[test]
    fn monitor_mode_uses_pointer() {
        let display = FakeDisplay::new(&[]);
        assert_eq!(resolve(&display, &Mode::Monitor).unwrap(), Rect::new(1920, 0, 1920, 1080));
    }

    #[test]
    fn monitor_mode_without_monitors_uses_desktop() {
        let mut display = FakeDisplay::new(&[]);
        display.monitors.clear();
        assert_eq!(resolve(&display, &Mode::Monitor).unwrap(), display.desktop());
    }

    #[test]
    fn window_mode_adds_border() {
        let display = FakeDisplay::new(&[]);
        assert_eq!(resolve(&display, &Mode::Window).unwrap(), Rect::new(10, 20, 302, 202));
    }

    #[test]
    fn fixed_and_all_modes() {
        let display = FakeDisplay::new(&[]);
        let fixed = Rect::new(1, 2, 3, 4);
        assert_eq!(resolve(&display, &Mode::Coordinates(fixed)).unwrap(), fixed);
        assert_eq!(resolve(&display, &Mode::All).unwrap(), Rect::new(0, 0, 3840, 1080));
    }

    #[test]
    fn cursor_is_blended_when_requested() {
        let mut display = FakeDisplay::new(&[]);
        display.cursor = Some(CursorImage {
            width: 1,
            height: 1,
            hotspot_x: 0,
            hotspot_y: 0,
            origin_x: 11,
            origin_y: 12,
            pixels: vec![0xff12_3456],
        });
        let area = Rect::new(10, 10, 4, 4);
        let plain = grab(&display, area, false).unwrap();
        assert!(plain.pixels.iter().all(|&p| p == 0xff00_0000));
        let with_cursor = grab(&display, area, true).unwrap();
        assert_eq!(with_cursor.pixels[2 * 4 + 1], 0xff12_3456);
    }

    #[test]
    fn cursor_failure_is_fatal() {
        let display = FakeDisplay::new(&[]);
        let err = grab(&display, Rect::new(0, 0, 2, 2), true).unwrap_err();
        assert!(matches!(err, CaptureError::QueryFailed { .. }));
    }
}
