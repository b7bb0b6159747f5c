// src/display.rs

use tracing::{debug, warn};
use x11rb::connection::{Connection, RequestConnection};
use x11rb::errors::ReplyError;
use x11rb::protocol::xfixes::ConnectionExt as _;
use x11rb::protocol::xinerama::{self, ConnectionExt as _};
use x11rb::protocol::xproto::{ConnectionExt as _, ImageFormat, Screen, Window};
use x11rb::rust_connection::RustConnection;

use crate::capture::PixelBuffer;
use crate::cursor::CursorImage;
use crate::error::{CaptureError, Result};
use crate::geometry::{Rect, WindowGeometry};
use crate::selection;
use crate::selection_logic::SelectionResult;

/// Focus reply values that do not name a real window.
const FOCUS_NONE: Window = 0;
const FOCUS_POINTER_ROOT: Window = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTarget {
    /// The window holding keyboard focus.
    Focused,
    /// The innermost window under the pointer.
    UnderPointer,
}

/// Queries the capture pipeline needs from the display server.
pub trait DisplayServer {
    /// The whole virtual desktop.
    fn desktop(&self) -> Rect;

    fn pointer_position(&self) -> Result<(i32, i32)>;

    /// Monitor rectangles in enumeration order; empty when the server has
    /// no monitor extension.
    fn monitors(&self) -> Result<Vec<Rect>>;

    fn window_geometry(&self, target: WindowTarget) -> Result<WindowGeometry>;

    /// Runs the interactive rubber-band selection.
    fn select_region(&self) -> Result<SelectionResult>;

    fn capture(&self, area: Rect) -> Result<PixelBuffer>;

    fn cursor_image(&self) -> Result<CursorImage>;
}

/// One connection to the X server for the lifetime of a capture.
///
/// Dropping the session releases a server freeze and flushes; the
/// connection itself closes when `conn` is dropped.
pub struct Session {
    conn: RustConnection,
    screen: Screen,
    frozen: bool,
}

impl Session {
    pub fn connect() -> Result<Self> {
        let (conn, screen_num) = x11rb::connect(None)?;
        let screen = conn.setup().roots[screen_num].clone();
        debug!(
            screen = screen_num,
            width = screen.width_in_pixels,
            height = screen.height_in_pixels,
            depth = screen.root_depth,
            "connected to display"
        );
        Ok(Session { conn, screen, frozen: false })
    }

    pub fn conn(&self) -> &RustConnection {
        &self.conn
    }

    pub fn screen(&self) -> &Screen {
        &self.screen
    }

    /// Stops every other client from drawing until [`Session::thaw`].
    pub fn freeze(&mut self) -> Result<()> {
        self.conn.grab_server().map_err(CaptureError::query("grab server"))?;
        self.conn.flush().map_err(CaptureError::query("grab server"))?;
        self.frozen = true;
        Ok(())
    }

    pub fn thaw(&mut self) -> Result<()> {
        if self.frozen {
            self.frozen = false;
            self.conn.ungrab_server().map_err(CaptureError::query("ungrab server"))?;
            self.conn.flush().map_err(CaptureError::query("ungrab server"))?;
        }
        Ok(())
    }

    fn query_pointer(&self, window: Window) -> Result<x11rb::protocol::xproto::QueryPointerReply> {
        self.conn
            .query_pointer(window)
            .map_err(CaptureError::query("query pointer"))?
            .reply()
            .map_err(CaptureError::query("query pointer"))
    }

    fn focused_window(&self) -> Window {
        let focus = self
            .conn
            .get_input_focus()
            .ok()
            .and_then(|cookie| cookie.reply().ok())
            .map(|reply| reply.focus);
        match focus {
            Some(FOCUS_NONE | FOCUS_POINTER_ROOT) | None => self.screen.root,
            Some(window) => window,
        }
    }

    fn window_under_pointer(&self) -> Result<Window> {
        let mut window = self.screen.root;
        loop {
            let child = self.query_pointer(window)?.child;
            if child == x11rb::NONE {
                return Ok(window);
            }
            window = child;
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.frozen {
            let _ = self.conn.ungrab_server();
        }
        let _ = self.conn.flush();
    }
}

impl DisplayServer for Session {
    fn desktop(&self) -> Rect {
        Rect::new(
            0,
            0,
            i32::from(self.screen.width_in_pixels),
            i32::from(self.screen.height_in_pixels),
        )
    }

    fn pointer_position(&self) -> Result<(i32, i32)> {
        let reply = self.query_pointer(self.screen.root)?;
        Ok((i32::from(reply.root_x), i32::from(reply.root_y)))
    }

    fn monitors(&self) -> Result<Vec<Rect>> {
        let present = self
            .conn
            .extension_information(xinerama::X11_EXTENSION_NAME)
            .map_err(CaptureError::query("use xinerama"))?
            .is_some();
        if !present {
            warn!("xinerama unavailable, using the whole desktop");
            return Ok(Vec::new());
        }
        let screens = self
            .conn
            .xinerama_query_version(1, 1)
            .map_err(ReplyError::from)
            .and_then(|cookie| cookie.reply())
            .and_then(|_| self.conn.xinerama_query_screens().map_err(ReplyError::from))
            .and_then(|cookie| cookie.reply())
            .map(|reply| {
                reply
                    .screen_info
                    .iter()
                    .map(|s| {
                        Rect::new(
                            i32::from(s.x_org),
                            i32::from(s.y_org),
                            i32::from(s.width),
                            i32::from(s.height),
                        )
                    })
                    .collect()
            });
        screens_or_none(screens)
    }

    fn window_geometry(&self, target: WindowTarget) -> Result<WindowGeometry> {
        let window = match target {
            WindowTarget::Focused => self.focused_window(),
            WindowTarget::UnderPointer => self.window_under_pointer()?,
        };
        let geom = self
            .conn
            .get_geometry(window)
            .map_err(CaptureError::query("get geometry"))?
            .reply()
            .map_err(CaptureError::query("get geometry"))?;
        let border = i32::from(geom.border_width);
        // Geometry is parent-relative; report the outer corner in root coordinates.
        let (x, y) = if window == self.screen.root {
            (i32::from(geom.x), i32::from(geom.y))
        } else {
            let origin = self
                .conn
                .translate_coordinates(window, self.screen.root, 0, 0)
                .map_err(CaptureError::query("get geometry"))?
                .reply()
                .map_err(CaptureError::query("get geometry"))?;
            (i32::from(origin.dst_x) - border, i32::from(origin.dst_y) - border)
        };
        debug!(window, x, y, width = geom.width, height = geom.height, border, "window geometry");
        Ok(WindowGeometry {
            x,
            y,
            width: i32::from(geom.width),
            height: i32::from(geom.height),
            border_width: border,
        })
    }

    fn select_region(&self) -> Result<SelectionResult> {
        selection::select_region(self)
    }

    fn capture(&self, area: Rect) -> Result<PixelBuffer> {
        let out_of_range =
            || CaptureError::InvalidArgument(format!("capture area {area:?} out of range"));
        let x = i16::try_from(area.x).map_err(|_| out_of_range())?;
        let y = i16::try_from(area.y).map_err(|_| out_of_range())?;
        let w = u16::try_from(area.w).map_err(|_| out_of_range())?;
        let h = u16::try_from(area.h).map_err(|_| out_of_range())?;

        let reply = self
            .conn
            .get_image(ImageFormat::Z_PIXMAP, self.screen.root, x, y, w, h, u32::MAX)
            .map_err(CaptureError::query("get image"))?
            .reply()
            .map_err(CaptureError::query("get image"))?;

        let count = usize::from(w) * usize::from(h);
        if reply.data.len() < count * 4 {
            return Err(CaptureError::QueryFailed {
                what: "read 32-bit pixels from the screen",
                source: None,
            });
        }
        // Depth-24 visuals leave the padding byte undefined.
        let opaque = if reply.depth == 32 { 0 } else { 0xff00_0000 };
        let pixels = reply
            .data
            .chunks_exact(4)
            .take(count)
            .map(|px| u32::from_le_bytes([px[0], px[1], px[2], px[3]]) | opaque)
            .collect();
        Ok(PixelBuffer { width: u32::from(w), height: u32::from(h), pixels })
    }

    fn cursor_image(&self) -> Result<CursorImage> {
        self.conn
            .xfixes_query_version(5, 0)
            .map_err(CaptureError::query("use xfixes"))?
            .reply()
            .map_err(CaptureError::query("use xfixes"))?;
        let reply = self
            .conn
            .xfixes_get_cursor_image()
            .map_err(CaptureError::query("get cursor image"))?
            .reply()
            .map_err(CaptureError::query("get cursor image"))?;
        Ok(CursorImage {
            width: i32::from(reply.width),
            height: i32::from(reply.height),
            hotspot_x: i32::from(reply.xhot),
            hotspot_y: i32::from(reply.yhot),
            origin_x: i32::from(reply.x),
            origin_y: i32::from(reply.y),
            pixels: reply.cursor_image,
        })
    }
}

/// A server that rejects the Xinerama queries is treated like one without
/// the extension. A broken connection is still fatal.
fn screens_or_none(screens: std::result::Result<Vec<Rect>, ReplyError>) -> Result<Vec<Rect>> {
    match screens {
        Ok(screens) => Ok(screens),
        Err(ReplyError::X11Error(e)) => {
            warn!(error = ?e, "xinerama query failed, using the whole desktop");
            Ok(Vec::new())
        }
        Err(e) => Err(CaptureError::query("query monitors")(e)),
    }
}
