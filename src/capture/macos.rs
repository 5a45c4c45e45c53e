// # Quartz Capture Source
//
// macOS frame source driven through the stock command line tools:
// - window list: CoreGraphics via `osascript -l JavaScript`, printed as JSON
// - capture: `screencapture -l <window id>` into a scratch PNG
// - activation and page turn: AppleScript through `osascript`

use std::time::Duration;

use async_trait::async_trait;
use image::DynamicImage;
use tokio::process::Command;
use tracing::{debug, info};

use super::{FrameSource, WindowHandle, WindowInfo, select_window};
use crate::error::{CaptureError, CaptureResult};

const WINDOW_LIST_SCRIPT: &str = r#"
ObjC.import('CoreGraphics');
var info = ObjC.castRefToObject(
    $.CGWindowListCopyWindowInfo($.kCGWindowListOptionOnScreenOnly, $.kCGNullWindowID));
var list = ObjC.deepUnwrap(info) || [];
JSON.stringify(list.map(function (w) {
    var b = w.kCGWindowBounds || {};
    return { id: w.kCGWindowNumber, owner: w.kCGWindowOwnerName || "", width: b.Width || 0, height: b.Height || 0 };
}));
"#;

/// macOS key code of the right arrow.
const KEY_CODE_RIGHT: u8 = 124;

/// Time the reader needs to come to the front after `activate`.
const ACTIVATE_SETTLE: Duration = Duration::from_millis(500);

pub struct QuartzSource {
    owner: String,
    application: String,
}

impl QuartzSource {
    pub fn new(owner: &str) -> Self {
        Self {
            owner: owner.to_string(),
            application: application_name(owner),
        }
    }
}

/// The Kindle window owner is "Kindle" but the application bundle is "Amazon Kindle".
fn application_name(owner: &str) -> String {
    match owner {
        "Kindle" => "Amazon Kindle".to_string(),
        other => other.to_string(),
    }
}

async fn run_tool(program: &str, args: &[&str]) -> Result<String, String> {
    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|e| format!("failed to start {program}: {e}"))?;
    if !output.status.success() {
        return Err(format!(
            "{program} exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[async_trait]
impl FrameSource for QuartzSource {
    async fn locate_window(&mut self) -> CaptureResult<WindowHandle> {
        let json = run_tool("osascript", &["-l", "JavaScript", "-e", WINDOW_LIST_SCRIPT])
            .await
            .map_err(CaptureError::source_unavailable)?;
        let windows: Vec<WindowInfo> = serde_json::from_str(json.trim()).map_err(|e| {
            CaptureError::source_unavailable(format!("unreadable window list: {e}"))
        })?;
        debug!(count = windows.len(), "listed on-screen windows");

        select_window(&windows, &self.owner).ok_or_else(|| {
            CaptureError::source_unavailable(format!(
                "no {} window found; start the app and open a book",
                self.owner
            ))
        })
    }

    async fn activate(&mut self) -> CaptureResult<()> {
        let script = format!("tell application \"{}\" to activate", self.application);
        run_tool("osascript", &["-e", &script])
            .await
            .map_err(CaptureError::source_unavailable)?;
        info!(application = %self.application, "activated reader");
        tokio::time::sleep(ACTIVATE_SETTLE).await;
        Ok(())
    }

    async fn capture(&mut self, handle: &WindowHandle) -> CaptureResult<DynamicImage> {
        let scratch = tempfile::Builder::new()
            .prefix("pagecap_frame_")
            .suffix(".png")
            .tempfile()
            .map_err(|e| CaptureError::capture_failure(0, format!("scratch file: {e}")))?;
        let path = scratch.path().to_string_lossy().into_owned();
        let id = handle.id.to_string();

        run_tool("screencapture", &["-x", "-o", "-t", "png", "-l", &id, &path])
            .await
            .map_err(|e| CaptureError::capture_failure(0, e))?;

        image::open(scratch.path()).map_err(|e| {
            CaptureError::capture_failure(0, format!("window {} returned no image: {e}", handle.id))
        })
    }

    async fn advance_page(&mut self) -> CaptureResult<()> {
        let script = format!(
            "tell application \"System Events\" to tell process \"{}\" to key code {}",
            self.owner, KEY_CODE_RIGHT
        );
        run_tool("osascript", &["-e", &script])
            .await
            .map(|_| ())
            .map_err(|e| CaptureError::advance_failure(0, e))
    }
}
