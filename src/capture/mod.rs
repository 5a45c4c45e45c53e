// # Capture Module
//
// Frame sources: the OS-level collaborators that find the reader window,
// bring it to the front, grab its pixels and turn the page.

#[cfg(target_os = "macos")]
pub mod macos;
#[cfg(all(target_os = "linux", feature = "x11"))]
pub mod x11;

use async_trait::async_trait;
use image::DynamicImage;
use serde::Deserialize;

use crate::error::{CaptureError, CaptureResult};

/// Windows narrower or shorter than this are toolbars, popups or hidden panes.
pub const MIN_WINDOW_EDGE: u32 = 100;

/// Opaque handle to the window being captured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowHandle {
    pub id: u64,
    pub owner: String,
    pub width: u32,
    pub height: u32,
}

/// One on-screen window as reported by the platform's window list.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WindowInfo {
    pub id: u64,
    pub owner: String,
    pub width: f64,
    pub height: f64,
}

/// Abstract interface for the paginated source being captured.
///
/// A session holds the source by `&mut` for its whole run, so two sessions can
/// never drive the same source at once.
#[async_trait]
pub trait FrameSource: Send {
    /// Find the reader window. Errors are reported as `SourceUnavailable`.
    async fn locate_window(&mut self) -> CaptureResult<WindowHandle>;

    /// Bring the reader application to the front.
    async fn activate(&mut self) -> CaptureResult<()>;

    /// Grab the current content of `handle`.
    async fn capture(&mut self, handle: &WindowHandle) -> CaptureResult<DynamicImage>;

    /// Turn to the next page.
    async fn advance_page(&mut self) -> CaptureResult<()>;
}

/// Pick the main window of `owner`: the largest one whose edges both exceed
/// [`MIN_WINDOW_EDGE`].
pub fn select_window(windows: &[WindowInfo], owner: &str) -> Option<WindowHandle> {
    windows
        .iter()
        .filter(|w| w.owner == owner)
        .filter(|w| w.width > MIN_WINDOW_EDGE as f64 && w.height > MIN_WINDOW_EDGE as f64)
        .max_by(|a, b| (a.width * a.height).total_cmp(&(b.width * b.height)))
        .map(|w| WindowHandle {
            id: w.id,
            owner: w.owner.clone(),
            width: w.width as u32,
            height: w.height as u32,
        })
}

/// Frame source for the current platform.
pub fn platform_source(app_name: &str) -> CaptureResult<Box<dyn FrameSource>> {
    #[cfg(target_os = "macos")]
    return Ok(Box::new(macos::QuartzSource::new(app_name)));

    #[cfg(all(target_os = "linux", feature = "x11"))]
    return Ok(Box::new(x11::X11Source::connect(app_name)?));

    #[allow(unreachable_code)]
    Err(CaptureError::source_unavailable(format!(
        "no window capture backend for this platform (looking for '{app_name}')"
    )))
}
