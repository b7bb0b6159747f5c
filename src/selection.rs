// src/selection.rs

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};
use x11rb::connection::Connection;
use x11rb::errors::{ReplyError, ReplyOrIdError};
use x11rb::protocol::Event;
use x11rb::protocol::shape::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{
    AtomEnum, ClipOrdering, ConnectionExt as _, CreateWindowAux, Cursor, EventMask, GrabMode,
    GrabStatus, Keycode, Keysym, PropMode, Rectangle, Window, WindowClass,
};
use x11rb::rust_connection::RustConnection;
use x11rb::wrapper::ConnectionExt as _;
use x11rb::{CURRENT_TIME, NONE};

use crate::display::Session;
use crate::error::{CaptureError, Result};
use crate::geometry::Rect;
use crate::selection_logic::{
    Arrow, Feedback, Key, Selection, SelectionResult, SelectorEvent, Step,
};

/// Pause after the overlay is torn down so it is gone from the framebuffer.
pub const SETTLE_DELAY: Duration = Duration::from_millis(200);

/// Cursor font glyphs: ul_angle, ur_angle, ll_angle, lr_angle (indexed by
/// drag quadrant) and cross for the pointer before the drag starts.
const GLYPHS: [u16; 5] = [144, 148, 76, 78, 30];
const IDLE_GLYPH: usize = 4;

const XK_LEFT: Keysym = 0xff51;
const XK_UP: Keysym = 0xff52;
const XK_RIGHT: Keysym = 0xff53;
const XK_DOWN: Keysym = 0xff54;

/// Where selection input comes from and where its feedback goes.
pub trait SelectionSurface {
    /// Blocks until the next relevant input event.
    fn next_event(&mut self) -> Result<SelectorEvent>;

    /// Shows the drag glyph and the rectangle outline.
    fn show(&mut self, feedback: &Feedback) -> Result<()>;

    fn screen_size(&self) -> (i32, i32);
}

/// Feeds events into the drag state machine until a button is released.
pub fn drive<S: SelectionSurface>(surface: &mut S) -> Result<SelectionResult> {
    let (width, height) = surface.screen_size();
    let mut selection = Selection::new(width, height);
    loop {
        let event = surface.next_event()?;
        trace!(?event, drag = ?selection.drag(), "selection event");
        match selection.handle(event)? {
            Step::Continue(Some(feedback)) => surface.show(&feedback)?,
            Step::Continue(None) => {}
            Step::Done(result) => return Ok(result),
        }
    }
}

/// Grabs input, lets the user drag out a rectangle and returns it once the
/// overlay is gone and the screen has settled.
pub fn select_region(session: &Session) -> Result<SelectionResult> {
    let result = {
        let mut overlay = Overlay::open(session)?;
        drive(&mut overlay)?
    };
    debug!(?result, "selection finished");
    thread::sleep(SETTLE_DELAY);
    Ok(result)
}

fn grab_events() -> EventMask {
    EventMask::BUTTON_PRESS | EventMask::BUTTON_RELEASE | EventMask::BUTTON_MOTION
}

/// Keycode to unshifted keysym, from the core keyboard mapping.
struct Keymap {
    min_keycode: Keycode,
    per_keycode: usize,
    keysyms: Vec<Keysym>,
}

impl Keymap {
    fn load(conn: &RustConnection) -> Result<Self> {
        let setup = conn.setup();
        let (min_keycode, max_keycode) = (setup.min_keycode, setup.max_keycode);
        let reply = conn
            .get_keyboard_mapping(min_keycode, max_keycode - min_keycode + 1)
            .map_err(CaptureError::query("make keymap"))?
            .reply()
            .map_err(CaptureError::query("make keymap"))?;
        Ok(Keymap {
            min_keycode,
            per_keycode: usize::from(reply.keysyms_per_keycode),
            keysyms: reply.keysyms,
        })
    }

    fn lookup(&self, keycode: Keycode) -> Key {
        let sym = keycode
            .checked_sub(self.min_keycode)
            .and_then(|k| self.keysyms.get(usize::from(k) * self.per_keycode))
            .copied()
            .unwrap_or(0);
        match sym {
            XK_LEFT => Key::Arrow(Arrow::Left),
            XK_RIGHT => Key::Arrow(Arrow::Right),
            XK_UP => Key::Arrow(Arrow::Up),
            XK_DOWN => Key::Arrow(Arrow::Down),
            other => Key::Other(other),
        }
    }
}

/// Exclusive claim on pointer and keyboard input.
pub trait InputGrab {
    fn grab_pointer(&mut self) -> Result<()>;
    fn grab_keyboard(&mut self) -> Result<()>;
    fn ungrab_pointer(&mut self);
    fn ungrab_keyboard(&mut self);
}

/// Holds whatever grabs were acquired and releases each of them exactly
/// once when dropped, including when acquisition fails halfway.
pub struct GrabGuard<G: InputGrab> {
    input: G,
    pointer: bool,
    keyboard: bool,
}

impl<G: InputGrab> GrabGuard<G> {
    pub fn acquire(input: G) -> Result<Self> {
        let mut guard = GrabGuard { input, pointer: false, keyboard: false };
        guard.input.grab_pointer()?;
        guard.pointer = true;
        guard.input.grab_keyboard()?;
        guard.keyboard = true;
        Ok(guard)
    }
}

impl<G: InputGrab> Drop for GrabGuard<G> {
    fn drop(&mut self) {
        if std::mem::take(&mut self.pointer) {
            self.input.ungrab_pointer();
        }
        if std::mem::take(&mut self.keyboard) {
            self.input.ungrab_keyboard();
        }
    }
}

/// Core protocol grabs on the root window.
struct X11Input<'a> {
    conn: &'a RustConnection,
    root: Window,
    cursor: Cursor,
}

impl InputGrab for X11Input<'_> {
    fn grab_pointer(&mut self) -> Result<()> {
        let status = self
            .conn
            .grab_pointer(
                false,
                self.root,
                grab_events(),
                GrabMode::ASYNC,
                GrabMode::ASYNC,
                NONE,
                self.cursor,
                CURRENT_TIME,
            )
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .map_err(|e| CaptureError::GrabFailed { what: "pointer", source: Some(e) })?
            .status;
        if status != GrabStatus::SUCCESS {
            return Err(CaptureError::GrabFailed { what: "pointer", source: None });
        }
        Ok(())
    }

    fn grab_keyboard(&mut self) -> Result<()> {
        let status = self
            .conn
            .grab_keyboard(false, self.root, CURRENT_TIME, GrabMode::ASYNC, GrabMode::ASYNC)
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .map_err(|e| CaptureError::GrabFailed { what: "keyboard", source: Some(e) })?
            .status;
        if status != GrabStatus::SUCCESS {
            return Err(CaptureError::GrabFailed { what: "keyboard", source: None });
        }
        Ok(())
    }

    fn ungrab_pointer(&mut self) {
        let _ = self.conn.ungrab_pointer(CURRENT_TIME);
    }

    fn ungrab_keyboard(&mut self) {
        let _ = self.conn.ungrab_keyboard(CURRENT_TIME);
        let _ = self.conn.flush();
    }
}

/// Full-screen, input-transparent window shaped down to the outline strips.
///
/// Owns the input grab; dropping it releases the grab before the window is
/// unmapped and destroyed.
struct Overlay<'a> {
    conn: &'a RustConnection,
    window: Window,
    cursors: [Cursor; 5],
    keymap: Keymap,
    screen: (i32, i32),
    grab: Option<GrabGuard<X11Input<'a>>>,
}

impl<'a> Overlay<'a> {
    fn open(session: &'a Session) -> Result<Self> {
        let conn = session.conn();
        let screen = session.screen();
        let keymap = Keymap::load(conn)?;

        let window = conn.generate_id().map_err(CaptureError::query("create overlay"))?;
        conn.create_window(
            screen.root_depth,
            window,
            screen.root,
            0,
            0,
            screen.width_in_pixels,
            screen.height_in_pixels,
            0,
            WindowClass::INPUT_OUTPUT,
            screen.root_visual,
            &CreateWindowAux::new()
                .background_pixel(screen.white_pixel)
                .override_redirect(1),
        )
        .map_err(CaptureError::query("create overlay"))?;

        let mut overlay = Overlay {
            conn,
            window,
            cursors: [NONE; 5],
            keymap,
            screen: (
                i32::from(screen.width_in_pixels),
                i32::from(screen.height_in_pixels),
            ),
            grab: None,
        };
        overlay.load_cursors()?;
        overlay.mark_as_dock()?;
        overlay.grab = Some(GrabGuard::acquire(X11Input {
            conn,
            root: screen.root,
            cursor: overlay.cursors[IDLE_GLYPH],
        })?);
        Ok(overlay)
    }

    fn load_cursors(&mut self) -> Result<()> {
        let font = self.conn.generate_id().map_err(CaptureError::query("open cursor font"))?;
        self.conn
            .open_font(font, b"cursor")
            .map_err(CaptureError::query("open cursor font"))?;
        for (slot, &glyph) in self.cursors.iter_mut().zip(&GLYPHS) {
            let cursor = self.conn.generate_id().map_err(CaptureError::query("create cursor"))?;
            let (fore, back) = ((0, 0, 0), (u16::MAX, u16::MAX, u16::MAX));
            self.conn
                .create_glyph_cursor(
                    cursor, font, font, glyph, glyph + 1, fore.0, fore.1, fore.2, back.0, back.1,
                    back.2,
                )
                .map_err(CaptureError::query("create cursor"))?;
            *slot = cursor;
        }
        self.conn.close_font(font).map_err(CaptureError::query("close cursor font"))?;
        Ok(())
    }

    /// Dock windows get no decoration and are left alone by compositors.
    fn mark_as_dock(&self) -> Result<()> {
        let intern = |name: &[u8]| -> Result<u32> {
            Ok(self
                .conn
                .intern_atom(false, name)
                .map_err(CaptureError::query("get atom"))?
                .reply()
                .map_err(CaptureError::query("get atom"))?
                .atom)
        };
        let window_type = intern(b"_NET_WM_WINDOW_TYPE")?;
        let dock = intern(b"_NET_WM_WINDOW_TYPE_DOCK")?;
        self.conn
            .change_property32(PropMode::REPLACE, self.window, window_type, AtomEnum::ATOM, &[dock])
            .map_err(CaptureError::query("set window type"))?;
        Ok(())
    }
}

impl SelectionSurface for Overlay<'_> {
    fn next_event(&mut self) -> Result<SelectorEvent> {
        loop {
            let event = self
                .conn
                .wait_for_event()
                .map_err(CaptureError::query("wait for input"))?;
            let event = match event {
                Event::ButtonPress(e) => SelectorEvent::Press {
                    x: i32::from(e.root_x),
                    y: i32::from(e.root_y),
                    button: e.detail,
                },
                Event::MotionNotify(e) => SelectorEvent::Motion {
                    x: i32::from(e.root_x),
                    y: i32::from(e.root_y),
                },
                Event::ButtonRelease(_) => SelectorEvent::Release,
                Event::KeyPress(e) => SelectorEvent::Key {
                    key: self.keymap.lookup(e.detail),
                    x: i32::from(e.root_x),
                    y: i32::from(e.root_y),
                },
                Event::Error(e) => {
                    return Err(CaptureError::QueryFailed {
                        what: "draw selection",
                        source: Some(ReplyOrIdError::X11Error(e)),
                    });
                }
                _ => continue,
            };
            return Ok(event);
        }
    }

    fn show(&mut self, feedback: &Feedback) -> Result<()> {
        let fail = CaptureError::query::<x11rb::errors::ConnectionError>;
        self.conn
            .change_active_pointer_grab(
                self.cursors[feedback.glyph.index()],
                CURRENT_TIME,
                grab_events(),
            )
            .map_err(fail("change cursor"))?;
        let strips = feedback.outline.map(to_x_rectangle);
        self.conn
            .shape_rectangles(
                shape::SO::SET,
                shape::SK::BOUNDING,
                ClipOrdering::UNSORTED,
                self.window,
                0,
                0,
                &strips,
            )
            .map_err(fail("draw selection"))?;
        self.conn.map_window(self.window).map_err(fail("draw selection"))?;
        self.conn.flush().map_err(fail("draw selection"))?;
        Ok(())
    }

    fn screen_size(&self) -> (i32, i32) {
        self.screen
    }
}

impl Drop for Overlay<'_> {
    fn drop(&mut self) {
        drop(self.grab.take());
        let _ = self.conn.unmap_window(self.window);
        let _ = self.conn.flush();
        for &cursor in self.cursors.iter().filter(|&&c| c != NONE) {
            let _ = self.conn.free_cursor(cursor);
        }
        let _ = self.conn.destroy_window(self.window);
        let _ = self.conn.flush();
    }
}

fn to_x_rectangle(r: Rect) -> Rectangle {
    let coord = |v: i32| v.clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
    let extent = |v: i32| v.clamp(0, i32::from(u16::MAX)) as u16;
    Rectangle { x: coord(r.x), y: coord(r.y), width: extent(r.w), height: extent(r.h) }
}
