//! Shared helpers for the integration tests
//!
//! [`ScriptedSource`] stands in for a reader window: it serves solid-color
//! frames from a script and can be told to fail or cancel at a given step.

#![allow(dead_code)]

use async_trait::async_trait;
use image::{DynamicImage, Rgb, RgbImage, Rgba, RgbaImage};
use paged_capture::{CaptureError, CaptureEvent, CaptureResult, FrameSource, WindowHandle};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;

pub const FRAME_WIDTH: u32 = 40;
pub const FRAME_HEIGHT: u32 = 30;

/// Solid frame whose color encodes `value`.
pub fn solid_frame(value: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(FRAME_WIDTH, FRAME_HEIGHT, Rgb([value, 255 - value, value / 2])))
}

/// Half-transparent frame, for exercising the white flattening.
pub fn translucent_frame(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 128])))
}

/// Reader stand-in. Frame `n` (zero-based capture count) is `script[n]`; once
/// the script runs out the last entry repeats, like a reader stuck on its
/// final page.
pub struct ScriptedSource {
    script: Vec<u8>,
    window: Option<WindowHandle>,
    fail_capture_at: Option<usize>,
    fail_advance_at: Option<usize>,
    cancel_after_advances: Option<(usize, CancellationToken)>,
    pub captures: usize,
    pub advances: usize,
    pub activations: usize,
}

impl ScriptedSource {
    pub fn new(script: impl Into<Vec<u8>>) -> Self {
        Self {
            script: script.into(),
            window: Some(WindowHandle {
                id: 42,
                owner: "Kindle".to_string(),
                width: FRAME_WIDTH,
                height: FRAME_HEIGHT,
            }),
            fail_capture_at: None,
            fail_advance_at: None,
            cancel_after_advances: None,
            captures: 0,
            advances: 0,
            activations: 0,
        }
    }

    /// Pages `1..=count` all differ.
    pub fn distinct(count: u8) -> Self {
        Self::new((1..=count).map(|n| n * 10).collect::<Vec<_>>())
    }

    pub fn without_window(mut self) -> Self {
        self.window = None;
        self
    }

    /// The `n`th capture (one-based) fails.
    pub fn failing_capture_at(mut self, n: usize) -> Self {
        self.fail_capture_at = Some(n);
        self
    }

    /// The `n`th page turn (one-based) fails.
    pub fn failing_advance_at(mut self, n: usize) -> Self {
        self.fail_advance_at = Some(n);
        self
    }

    /// Trip `token` once `n` page turns have happened.
    pub fn cancelling_after(mut self, n: usize, token: CancellationToken) -> Self {
        self.cancel_after_advances = Some((n, token));
        self
    }
}

#[async_trait]
impl FrameSource for ScriptedSource {
    async fn locate_window(&mut self) -> CaptureResult<WindowHandle> {
        self.window
            .clone()
            .ok_or_else(|| CaptureError::source_unavailable("Kindle window not found"))
    }

    async fn activate(&mut self) -> CaptureResult<()> {
        self.activations += 1;
        Ok(())
    }

    async fn capture(&mut self, _handle: &WindowHandle) -> CaptureResult<DynamicImage> {
        self.captures += 1;
        if self.fail_capture_at == Some(self.captures) {
            return Err(CaptureError::capture_failure(0, "screen recording permission revoked"));
        }
        let position = (self.captures - 1).min(self.script.len().saturating_sub(1));
        let value = self.script.get(position).copied().unwrap_or(0);
        Ok(solid_frame(value))
    }

    async fn advance_page(&mut self) -> CaptureResult<()> {
        self.advances += 1;
        if self.fail_advance_at == Some(self.advances) {
            return Err(CaptureError::advance_failure(0, "key event rejected"));
        }
        if let Some((n, token)) = &self.cancel_after_advances {
            if self.advances >= *n {
                token.cancel();
            }
        }
        Ok(())
    }
}

/// Everything sent on the channel so far.
pub fn drain(rx: &mut UnboundedReceiver<CaptureEvent>) -> Vec<CaptureEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Page indexes of the `page_NNNN.png` files in `dir`, ascending.
pub fn page_files(dir: &std::path::Path) -> Vec<u32> {
    let mut indexes: Vec<u32> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    paged_capture::core::page_store::parse_page_index(entry.file_name().to_str()?)
                })
                .collect()
        })
        .unwrap_or_default();
    indexes.sort_unstable();
    indexes
}
