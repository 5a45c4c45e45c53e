// # X11 Capture Source
//
// Linux frame source over the X protocol (`x11rb`):
// - discovery walks the window tree and matches WM_CLASS
// - capture is a ZPixmap GetImage of the window
// - activation sends _NET_ACTIVE_WINDOW to the window manager
// - page turn is an XTEST Right-arrow press and release

use std::fmt::Display;

use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use tracing::{debug, info};
use x11rb::connection::Connection;
use x11rb::protocol::xproto::{
    AtomEnum, ClientMessageEvent, ConnectionExt as _, EventMask, ImageFormat, ImageOrder,
    KEY_PRESS_EVENT, KEY_RELEASE_EVENT, MapState, Window,
};
use x11rb::protocol::xtest::ConnectionExt as _;
use x11rb::rust_connection::RustConnection;

use super::{FrameSource, WindowHandle, WindowInfo, select_window};
use crate::error::{CaptureError, CaptureResult};

/// Keysym of the Right arrow key.
const XK_RIGHT: u32 = 0xff53;

pub struct X11Source {
    conn: RustConnection,
    root: Window,
    app_name: String,
    window: Option<WindowHandle>,
}

fn reason(what: &str, e: impl Display) -> String {
    format!("{what}: {e}")
}

impl X11Source {
    /// Connect to the display named by `$DISPLAY`.
    pub fn connect(app_name: &str) -> CaptureResult<Self> {
        let (conn, screen_num) = x11rb::connect(None)
            .map_err(|e| CaptureError::source_unavailable(reason("cannot open X display", e)))?;
        let root = conn.setup().roots[screen_num].root;
        Ok(Self {
            conn,
            root,
            app_name: app_name.to_string(),
            window: None,
        })
    }

    /// Viewable top-level and child windows whose WM_CLASS matches the app name.
    fn list_windows(&self) -> Result<Vec<WindowInfo>, String> {
        let mut found = Vec::new();
        let mut pending = vec![self.root];
        while let Some(parent) = pending.pop() {
            let tree = self
                .conn
                .query_tree(parent)
                .map_err(|e| reason("query_tree", e))?
                .reply()
                .map_err(|e| reason("query_tree", e))?;
            for child in tree.children {
                pending.push(child);
                if let Some(info) = self.describe(child)? {
                    found.push(info);
                }
            }
        }
        Ok(found)
    }

    fn describe(&self, window: Window) -> Result<Option<WindowInfo>, String> {
        // windows can disappear between query_tree and these requests
        let Ok(attrs) = self
            .conn
            .get_window_attributes(window)
            .map_err(|e| reason("attributes", e))?
            .reply()
        else {
            return Ok(None);
        };
        if attrs.map_state != MapState::VIEWABLE {
            return Ok(None);
        }
        let Ok(class) = self
            .conn
            .get_property(false, window, AtomEnum::WM_CLASS, AtomEnum::STRING, 0, 1024)
            .map_err(|e| reason("WM_CLASS", e))?
            .reply()
        else {
            return Ok(None);
        };
        let matches = class
            .value
            .split(|b| *b == 0)
            .any(|part| String::from_utf8_lossy(part).eq_ignore_ascii_case(&self.app_name));
        if !matches {
            return Ok(None);
        }
        let Ok(geometry) = self
            .conn
            .get_geometry(window)
            .map_err(|e| reason("get_geometry", e))?
            .reply()
        else {
            return Ok(None);
        };
        Ok(Some(WindowInfo {
            id: window as u64,
            owner: self.app_name.clone(),
            width: geometry.width as f64,
            height: geometry.height as f64,
        }))
    }

    fn right_arrow_keycode(&self) -> Result<u8, String> {
        let setup = self.conn.setup();
        let count = setup.max_keycode - setup.min_keycode + 1;
        let mapping = self
            .conn
            .get_keyboard_mapping(setup.min_keycode, count)
            .map_err(|e| reason("keyboard mapping", e))?
            .reply()
            .map_err(|e| reason("keyboard mapping", e))?;
        let per = mapping.keysyms_per_keycode.max(1) as usize;
        mapping
            .keysyms
            .chunks(per)
            .position(|syms| syms.contains(&XK_RIGHT))
            .map(|i| setup.min_keycode + i as u8)
            .ok_or_else(|| "no keycode is mapped to Right".to_string())
    }

    async fn ensure_window(&mut self) -> CaptureResult<WindowHandle> {
        match &self.window {
            Some(handle) => Ok(handle.clone()),
            None => self.locate_window().await,
        }
    }
}

/// Convert a 32 bits-per-pixel LSB-first ZPixmap (BGRX) into RGBA.
fn bgrx_to_rgba(width: u32, height: u32, data: &[u8]) -> Option<RgbaImage> {
    let expected = width as usize * height as usize * 4;
    if data.len() < expected {
        return None;
    }
    let mut rgba = Vec::with_capacity(expected);
    for px in data[..expected].chunks_exact(4) {
        rgba.extend_from_slice(&[px[2], px[1], px[0], 255]);
    }
    RgbaImage::from_raw(width, height, rgba)
}

#[async_trait]
impl FrameSource for X11Source {
    async fn locate_window(&mut self) -> CaptureResult<WindowHandle> {
        let windows = self.list_windows().map_err(CaptureError::source_unavailable)?;
        debug!(count = windows.len(), app = %self.app_name, "matching X11 windows");
        let handle = select_window(&windows, &self.app_name).ok_or_else(|| {
            CaptureError::source_unavailable(format!(
                "no {} window found; start the app and open a book",
                self.app_name
            ))
        })?;
        self.window = Some(handle.clone());
        Ok(handle)
    }

    async fn activate(&mut self) -> CaptureResult<()> {
        let handle = self.ensure_window().await?;
        let active = self
            .conn
            .intern_atom(false, b"_NET_ACTIVE_WINDOW")
            .map_err(|e| CaptureError::source_unavailable(reason("intern_atom", e)))?
            .reply()
            .map_err(|e| CaptureError::source_unavailable(reason("intern_atom", e)))?
            .atom;
        // source indication 1 = normal application
        let event = ClientMessageEvent::new(
            32,
            handle.id as Window,
            active,
            [1, x11rb::CURRENT_TIME, 0, 0, 0],
        );
        self.conn
            .send_event(
                false,
                self.root,
                EventMask::SUBSTRUCTURE_REDIRECT | EventMask::SUBSTRUCTURE_NOTIFY,
                event,
            )
            .map_err(|e| CaptureError::source_unavailable(reason("send_event", e)))?;
        self.conn
            .flush()
            .map_err(|e| CaptureError::source_unavailable(reason("flush", e)))?;
        info!(window = handle.id, "activated reader");
        Ok(())
    }

    async fn capture(&mut self, handle: &WindowHandle) -> CaptureResult<DynamicImage> {
        let window = handle.id as Window;
        let fail = |what: &str, e: &dyn Display| CaptureError::capture_failure(0, reason(what, e));

        let geometry = self
            .conn
            .get_geometry(window)
            .map_err(|e| fail("get_geometry", &e))?
            .reply()
            .map_err(|e| fail("get_geometry", &e))?;
        let image = self
            .conn
            .get_image(
                ImageFormat::Z_PIXMAP,
                window,
                0,
                0,
                geometry.width,
                geometry.height,
                !0,
            )
            .map_err(|e| fail("get_image", &e))?
            .reply()
            .map_err(|e| fail("get_image", &e))?;

        let setup = self.conn.setup();
        let bpp = setup
            .pixmap_formats
            .iter()
            .find(|f| f.depth == image.depth)
            .map(|f| f.bits_per_pixel)
            .unwrap_or(0);
        if bpp != 32 || setup.image_byte_order != ImageOrder::LSB_FIRST {
            return Err(CaptureError::capture_failure(
                0,
                format!("unsupported pixel layout: depth {} at {bpp} bpp", image.depth),
            ));
        }

        bgrx_to_rgba(geometry.width as u32, geometry.height as u32, &image.data)
            .map(DynamicImage::ImageRgba8)
            .ok_or_else(|| CaptureError::capture_failure(0, "short image reply from X server"))
    }

    async fn advance_page(&mut self) -> CaptureResult<()> {
        let fail = |what: &str, e: &dyn Display| CaptureError::advance_failure(0, reason(what, e));
        let keycode = self
            .right_arrow_keycode()
            .map_err(|e| CaptureError::advance_failure(0, e))?;

        for event_type in [KEY_PRESS_EVENT, KEY_RELEASE_EVENT] {
            self.conn
                .xtest_fake_input(event_type, keycode, x11rb::CURRENT_TIME, self.root, 0, 0, 0)
                .map_err(|e| fail("xtest_fake_input", &e))?;
        }
        self.conn
            .get_input_focus()
            .map_err(|e| fail("sync", &e))?
            .reply()
            .map_err(|e| fail("sync", &e))?;
        Ok(())
    }
}
