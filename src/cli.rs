// src/cli.rs

use clap::{ArgAction, ArgGroup, Parser};

use crate::error::{CaptureError, Result};
use crate::geometry::{self, Rect};

/// Capture the X11 screen as PNG.
///
/// The image goes to standard output, or to the clipboard when standard
/// output is a terminal.
#[derive(Parser, Debug)]
#[command(name = "xsnip", version, about, long_about = None)]
#[command(group(ArgGroup::new("mode").args(["all", "select", "monitor", "window", "coords"])))]
pub struct Cli {
    /// Capture the whole desktop
    #[arg(short, long)]
    all: bool,

    /// Drag out a region with the pointer (default); a click captures the
    /// window under it, a non-primary click the monitor under it
    #[arg(short, long)]
    select: bool,

    /// Capture the monitor under the pointer
    #[arg(short, long)]
    monitor: bool,

    /// Capture the focused window
    #[arg(short, long)]
    window: bool,

    /// Capture a fixed rectangle, as `X,Y,W H` or `X,Y,W,H`
    #[arg(short = 'i', long, value_names = ["X,Y,W", "H"], num_args = 1..=2)]
    coords: Option<Vec<String>>,

    /// Blend the pointer into the capture
    #[arg(short, long)]
    cursor: bool,

    /// Freeze the display while selecting and capturing
    #[arg(short, long)]
    freeze: bool,

    /// More log output on stderr (repeatable)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    All,
    #[default]
    Select,
    Monitor,
    Window,
    Coordinates(Rect),
}

/// Everything a capture needs to know, fixed before the display is touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: Mode,
    pub cursor: bool,
    pub freeze: bool,
}

impl Cli {
    pub fn into_config(self) -> Result<Config> {
        let mode = if let Some(values) = &self.coords {
            let rect = match values.as_slice() {
                [packed] => geometry::parse_coordinates(packed, None)?,
                [xyw, h] => geometry::parse_coordinates(xyw, Some(h))?,
                _ => return Err(CaptureError::InvalidArgument(values.join(" "))),
            };
            Mode::Coordinates(rect)
        } else if self.all {
            Mode::All
        } else if self.monitor {
            Mode::Monitor
        } else if self.window {
            Mode::Window
        } else {
            Mode::Select
        };
        Ok(Config { mode, cursor: self.cursor, freeze: self.freeze })
    }
}
