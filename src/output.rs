// src/output.rs

use std::fs;
use std::io::{self, BufWriter, Write};
use std::os::unix::fs::FileTypeExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use arboard::{Clipboard, ImageData};
use image::codecs::png::PngEncoder;
use image::error::{ParameterError, ParameterErrorKind};
use image::{ColorType, ImageBuffer, ImageEncoder, ImageError, Rgba};
use tracing::{debug, warn};

use crate::capture::PixelBuffer;
use crate::error::{CaptureError, Result};

const STDOUT: &str = "/dev/stdout";
const CLIPBOARD_TOOL: &str = "xclip";
/// Same bound the kernel applies before giving up with ELOOP.
const MAX_LINK_HOPS: usize = 40;

pub type RgbaImage = ImageBuffer<Rgba<u8>, Vec<u8>>;

/// Where the finished image goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    /// PNG bytes on standard output.
    Stdout,
    /// Standard output is a terminal or other character device.
    Clipboard,
}

impl Target {
    pub fn detect() -> Result<Self> {
        let resolved = resolve_target(Path::new(STDOUT))?;
        let meta = fs::metadata(&resolved)
            .map_err(CaptureError::io(format!("stat file: {}", resolved.display())))?;
        let target = if meta.file_type().is_char_device() {
            Target::Clipboard
        } else {
            Target::Stdout
        };
        debug!(path = %resolved.display(), ?target, "standard output");
        Ok(target)
    }
}

/// The file behind `link`, or `link` itself when the chain ends in a name
/// that is not a path. Pipes and sockets resolve to names like
/// `pipe:[1234]`; the kernel's own link still stats them.
fn resolve_target(link: &Path) -> Result<PathBuf> {
    match resolve_links(link) {
        Ok(path) => Ok(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(link = %link.display(), "link target is not a path: {e}");
            Ok(link.to_path_buf())
        }
        Err(e) => Err(CaptureError::io(format!("read symlink: {}", link.display()))(e)),
    }
}

/// Follows a chain of symbolic links to the first path that is not one.
pub fn resolve_links(start: &Path) -> io::Result<PathBuf> {
    let mut path = start.to_path_buf();
    for _ in 0..MAX_LINK_HOPS {
        match fs::read_link(&path) {
            Ok(next) => {
                path = match path.parent() {
                    Some(parent) if next.is_relative() => parent.join(next),
                    _ => next,
                };
            }
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => return Ok(path),
            Err(e) => return Err(e),
        }
    }
    Err(io::Error::other(format!(
        "too many levels of symbolic links: {}",
        start.display()
    )))
}

/// Swizzles the B, G, R, A pixel words into an RGBA image.
pub fn to_rgba(buffer: &PixelBuffer) -> Result<RgbaImage> {
    let bytes = buffer
        .pixels
        .iter()
        .flat_map(|&p| [(p >> 16) as u8, (p >> 8) as u8, p as u8, (p >> 24) as u8])
        .collect();
    ImageBuffer::from_raw(buffer.width, buffer.height, bytes).ok_or_else(|| {
        CaptureError::EncodeFailed(ImageError::Parameter(ParameterError::from_kind(
            ParameterErrorKind::DimensionMismatch,
        )))
    })
}

pub fn encode_png<W: Write>(image: &RgbaImage, writer: W) -> Result<()> {
    PngEncoder::new(writer).write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        ColorType::Rgba8,
    )?;
    Ok(())
}

fn write_png<W: Write>(image: &RgbaImage, writer: W, what: &str) -> Result<()> {
    let mut writer = BufWriter::new(writer);
    encode_png(image, &mut writer)?;
    writer.flush().map_err(CaptureError::io(what))
}

pub fn deliver(buffer: &PixelBuffer, target: Target) -> Result<()> {
    let image = to_rgba(buffer)?;
    match target {
        Target::Stdout => write_png(&image, io::stdout().lock(), "write file: /dev/stdout"),
        Target::Clipboard => match which::which(CLIPBOARD_TOOL) {
            Ok(program) => pipe_to(&program, &image),
            Err(e) => {
                warn!("{CLIPBOARD_TOOL} not found ({e}), holding the clipboard until it is taken");
                hold_clipboard(&image)
            }
        },
    }
}

fn pipe_to(program: &Path, image: &RgbaImage) -> Result<()> {
    debug!(program = %program.display(), "piping png to clipboard tool");
    let mut child = Command::new(program)
        .args(["-selection", "clipboard", "-t", "image/png"])
        .stdin(Stdio::piped())
        .spawn()
        .map_err(CaptureError::io(format!("open pipe: {}", program.display())))?;

    // The pipe closes when `stdin` drops, before the child is reaped.
    let written = match child.stdin.take() {
        Some(stdin) => write_png(image, stdin, "write pipe"),
        None => Err(CaptureError::io("open pipe")(io::Error::from(io::ErrorKind::BrokenPipe))),
    };
    let status = child.wait().map_err(CaptureError::io("close pipe"))?;
    written?;
    if !status.success() {
        return Err(CaptureError::io(format!("run {CLIPBOARD_TOOL}"))(io::Error::other(
            status.to_string(),
        )));
    }
    Ok(())
}

fn hold_clipboard(image: &RgbaImage) -> Result<()> {
    let clipboard_error =
        |e: arboard::Error| CaptureError::io("set clipboard")(io::Error::other(e));
    let mut clipboard = Clipboard::new().map_err(clipboard_error)?;
    let data = ImageData {
        width: image.width() as usize,
        height: image.height() as usize,
        bytes: image.as_raw().into(),
    };
    #[cfg(target_os = "linux")]
    {
        use arboard::SetExtLinux;
        clipboard.set().wait().image(data).map_err(clipboard_error)
    }
    #[cfg(not(target_os = "linux"))]
    {
        clipboard.set_image(data).map_err(clipboard_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("xsnip-{}-{name}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn swizzles_bgra_words_to_rgba() {
        let buffer = PixelBuffer { width: 2, height: 1, pixels: vec![0xff11_2233, 0x80aa_bbcc] };
        let image = to_rgba(&buffer).unwrap();
        assert_eq!(image.as_raw(), &[0x11, 0x22, 0x33, 0xff, 0xaa, 0xbb, 0xcc, 0x80]);
    }

    #[test]
    fn size_mismatch_is_encode_error() {
        let buffer = PixelBuffer { width: 3, height: 3, pixels: vec![0; 4] };
        assert!(matches!(to_rgba(&buffer), Err(CaptureError::EncodeFailed(_))));
    }

    #[test]
    fn encodes_png() {
        let buffer = PixelBuffer { width: 4, height: 3, pixels: vec![0xff00_ff00; 12] };
        let mut bytes = Vec::new();
        encode_png(&to_rgba(&buffer).unwrap(), &mut bytes).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded.dimensions(), (4, 3));
        assert_eq!(decoded.get_pixel(2, 1).0, [0x00, 0xff, 0x00, 0xff]);
    }

    #[test]
    fn resolves_relative_link_chain() {
        let dir = scratch_dir("chain");
        let file = dir.join("shot.png");
        fs::write(&file, b"").unwrap();
        symlink("shot.png", dir.join("b")).unwrap();
        symlink(dir.join("b"), dir.join("a")).unwrap();
        assert_eq!(resolve_links(&dir.join("a")).unwrap(), file);
        assert_eq!(resolve_links(&file).unwrap(), file);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn link_cycle_is_an_error() {
        let dir = scratch_dir("cycle");
        symlink(dir.join("b"), dir.join("a")).unwrap();
        symlink(dir.join("a"), dir.join("b")).unwrap();
        assert!(resolve_links(&dir.join("a")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn dangling_link_is_an_error() {
        let dir = scratch_dir("dangling");
        symlink(dir.join("missing"), dir.join("a")).unwrap();
        assert!(resolve_links(&dir.join("a")).is_err());
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn unnamed_link_target_falls_back_to_the_link() {
        let dir = scratch_dir("unnamed");
        symlink("pipe:[4242]", dir.join("fd")).unwrap();
        assert_eq!(resolve_target(&dir.join("fd")).unwrap(), dir.join("fd"));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn link_cycle_stops_detection() {
        let dir = scratch_dir("target-cycle");
        symlink(dir.join("b"), dir.join("a")).unwrap();
        symlink(dir.join("a"), dir.join("b")).unwrap();
        let err = resolve_target(&dir.join("a")).unwrap_err();
        assert!(err.to_string().starts_with("unable to read symlink: "), "{err}");
        fs::remove_dir_all(&dir).unwrap();
    }
}
