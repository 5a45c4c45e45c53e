//! # Configuration Module
//!
//! Configuration structures and validation for a capture run. This is the
//! common interface between the command line front-end and the library: the
//! CLI fills a [`CaptureConfig`], validates it, and hands it to
//! [`crate::run_capture`].
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Range | Description |
//! |-----------|------|-------|-------------|
//! | `output` | `PathBuf` | any path | PDF to write, `.pdf` appended when missing |
//! | `mode` | `CaptureMode` | `Auto` / `FixedCount(n >= 1)` | how the run decides to stop |
//! | `delay` | `Duration` | >= 0 | settle time after each page turn |
//! | `start_index` | `u32` | >= 1 | first page number, used to resume |
//! | `keep_images` | `bool` | | keep `page_NNNN.png` files after success |
//! | `image_dir` | `Option<PathBuf>` | | where page images go |
//! | `app_name` | `String` | non-empty | owner name of the reader window |
//! | `countdown` | `Duration` | >= 0 | pause between activation and first capture |
//!
//! ## Delay Formats
//!
//! [`parse_delay`] accepts raw seconds (`1`, `0.5`), seconds with a unit
//! (`1.5s`) and milliseconds (`750ms`).
//!
//! ## Examples
//!
//! ```rust
//! use paged_capture::config::{CaptureConfig, CaptureMode};
//!
//! let mut config = CaptureConfig::new("novel", CaptureMode::FixedCount(120));
//! config.start_index = 41;
//!
//! assert!(config.validate().is_ok());
//! assert_eq!(config.output_path().to_str(), Some("novel.pdf"));
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{CaptureError, CaptureResult};

/// Directory used for page images when the caller keeps them and did not pick one.
pub const DEFAULT_KEEP_DIR: &str = "kindle_screenshots";

/// Window owner name of the Kindle desktop reader.
pub const DEFAULT_APP_NAME: &str = "Kindle";

/// How a capture run decides that it is finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureMode {
    /// Stop once the page content stops changing.
    Auto,
    /// Stop after exactly this page number.
    FixedCount(u32),
}

impl CaptureMode {
    /// Upper page bound, `None` when unbounded.
    pub fn max_pages(&self) -> Option<u32> {
        match self {
            CaptureMode::Auto => None,
            CaptureMode::FixedCount(n) => Some(*n),
        }
    }

    pub fn is_auto(&self) -> bool {
        matches!(self, CaptureMode::Auto)
    }
}

/// Configuration for one capture run.
///
/// # Examples
///
/// ```rust
/// use paged_capture::config::{CaptureConfig, CaptureMode};
///
/// let config = CaptureConfig::default();
/// assert_eq!(config.mode, CaptureMode::Auto);
/// assert_eq!(config.start_index, 1);
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Output document path. A missing `.pdf` extension is appended by
    /// [`CaptureConfig::output_path`].
    pub output: PathBuf,

    /// Auto detection or a fixed page count.
    pub mode: CaptureMode,

    /// Time to wait after each page turn so the reader can redraw.
    pub delay: Duration,

    /// Page number of the first capture. Values above 1 resume an earlier run
    /// whose images are still in `image_dir`.
    pub start_index: u32,

    /// Keep the page images once the PDF is written.
    pub keep_images: bool,

    /// Directory for page images. When `None`, [`DEFAULT_KEEP_DIR`] is used if
    /// images are kept, otherwise a temporary directory.
    pub image_dir: Option<PathBuf>,

    /// Owner name of the window to capture.
    pub app_name: String,

    /// Countdown between activating the reader and the first capture.
    pub countdown: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("book.pdf"),
            mode: CaptureMode::Auto,
            delay: Duration::from_secs(1),
            start_index: 1,
            keep_images: false,
            image_dir: None,
            app_name: DEFAULT_APP_NAME.to_string(),
            countdown: Duration::from_secs(3),
        }
    }
}

impl CaptureConfig {
    /// Creates a configuration with defaults for everything but output and mode.
    pub fn new(output: impl Into<PathBuf>, mode: CaptureMode) -> Self {
        Self {
            output: output.into(),
            mode,
            ..Self::default()
        }
    }

    /// Validates the configuration parameters.
    ///
    /// # Validation Rules
    ///
    /// - `output` must not be empty
    /// - `FixedCount(n)` needs `n >= 1`
    /// - `start_index` must be at least 1
    /// - in fixed-count mode `start_index` must not be past the last page
    /// - `app_name` must not be empty
    pub fn validate(&self) -> CaptureResult<()> {
        if self.output.as_os_str().is_empty() {
            return Err(CaptureError::config("output", "", "an output file is required"));
        }
        if let CaptureMode::FixedCount(n) = self.mode {
            if n == 0 {
                return Err(CaptureError::config(
                    "pages",
                    n.to_string(),
                    "page count must be a positive integer",
                ));
            }
            if self.start_index > n {
                return Err(CaptureError::config(
                    "start_index",
                    self.start_index.to_string(),
                    format!("start page is past the requested page count {n}"),
                ));
            }
        }
        if self.start_index == 0 {
            return Err(CaptureError::config("start_index", "0", "pages are numbered from 1"));
        }
        if self.app_name.trim().is_empty() {
            return Err(CaptureError::config("app_name", "", "application name is required"));
        }
        Ok(())
    }

    /// Output path with the `.pdf` extension guaranteed.
    pub fn output_path(&self) -> PathBuf {
        ensure_pdf_extension(&self.output)
    }

    /// Image directory to use when the caller asked to keep the images.
    pub fn kept_image_dir(&self) -> PathBuf {
        self.image_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_KEEP_DIR))
    }
}

/// Appends `.pdf` unless the path already ends with it (any case).
pub fn ensure_pdf_extension(path: &Path) -> PathBuf {
    let has_pdf = path
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false);
    if has_pdf {
        return path.to_path_buf();
    }
    let mut name = path.as_os_str().to_owned();
    name.push(".pdf");
    PathBuf::from(name)
}

/// Parse a delay such as `1`, `0.5`, `1.5s` or `750ms`.
pub fn parse_delay(delay: &str) -> CaptureResult<Duration> {
    let trimmed = delay.trim();
    let (number, scale) = if let Some(ms) = trimmed.strip_suffix("ms") {
        (ms, 0.001)
    } else if let Some(s) = trimmed.strip_suffix('s') {
        (s, 1.0)
    } else {
        (trimmed, 1.0)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| CaptureError::config("delay", delay, "not a number"))?;
    if !value.is_finite() || value < 0.0 {
        return Err(CaptureError::config(
            "delay",
            delay,
            "delay must be zero or greater",
        ));
    }
    Ok(Duration::from_secs_f64(value * scale))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_path_appends_pdf_once() {
        assert_eq!(ensure_pdf_extension(Path::new("book")), PathBuf::from("book.pdf"));
        assert_eq!(ensure_pdf_extension(Path::new("book.pdf")), PathBuf::from("book.pdf"));
        assert_eq!(ensure_pdf_extension(Path::new("BOOK.PDF")), PathBuf::from("BOOK.PDF"));
        assert_eq!(
            ensure_pdf_extension(Path::new("out/vol.2")),
            PathBuf::from("out/vol.2.pdf")
        );
    }

    #[test]
    fn parse_delay_formats() {
        assert_eq!(parse_delay("1").unwrap(), Duration::from_secs(1));
        assert_eq!(parse_delay("0.5").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_delay("2s").unwrap(), Duration::from_secs(2));
        assert_eq!(parse_delay("750ms").unwrap(), Duration::from_millis(750));
        assert_eq!(parse_delay("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn parse_delay_rejects_bad_values() {
        assert!(parse_delay("-1").is_err());
        assert!(parse_delay("soon").is_err());
        assert!(parse_delay("NaN").is_err());
    }

    #[test]
    fn validate_rules() {
        assert!(CaptureConfig::default().validate().is_ok());

        let zero_pages = CaptureConfig::new("a.pdf", CaptureMode::FixedCount(0));
        assert_eq!(zero_pages.validate().unwrap_err().category(), "config");

        let mut zero_start = CaptureConfig::default();
        zero_start.start_index = 0;
        assert!(zero_start.validate().is_err());

        let mut past_end = CaptureConfig::new("a.pdf", CaptureMode::FixedCount(5));
        past_end.start_index = 6;
        assert!(past_end.validate().is_err());

        let mut no_app = CaptureConfig::default();
        no_app.app_name = " ".into();
        assert!(no_app.validate().is_err());
    }

    #[test]
    fn kept_image_dir_defaults() {
        let mut config = CaptureConfig::default();
        assert_eq!(config.kept_image_dir(), PathBuf::from(DEFAULT_KEEP_DIR));
        config.image_dir = Some("scans".into());
        assert_eq!(config.kept_image_dir(), PathBuf::from("scans"));
    }

    #[test]
    fn mode_bounds() {
        assert_eq!(CaptureMode::Auto.max_pages(), None);
        assert_eq!(CaptureMode::FixedCount(9).max_pages(), Some(9));
        assert!(CaptureMode::Auto.is_auto());
    }
}
