//! # Paged Capture Library
//!
//! Turns a paginated on-screen document, such as an open book in an e-reader
//! window, into one ordered PDF. The reader window is captured page by page,
//! the page is turned with a synthetic key press, and the run stops either
//! after a fixed page count or once the content stops changing.
//!
//! ## Architecture
//!
//! - `capture`: the [`FrameSource`] trait and the macOS / X11 adapters
//! - `session`: the acquisition loop ([`CaptureSession`]) and its events
//! - `processing`: duplicate detection and PDF assembly
//! - `core`: pages and the on-disk page store
//! - `config`: run configuration and validation
//!
//! ## Example
//!
//! ```rust,no_run
//! use paged_capture::config::{CaptureConfig, CaptureMode};
//! use paged_capture::{RunOutcome, capture::platform_source, run_capture};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CaptureConfig::new("book.pdf", CaptureMode::Auto);
//! let mut source = platform_source(&config.app_name)?;
//! let (events, _rx) = tokio::sync::mpsc::unbounded_channel();
//!
//! match run_capture(&config, source.as_mut(), &events, &CancellationToken::new()).await? {
//!     RunOutcome::Completed { output, pages, .. } => println!("{} pages -> {}", pages, output.display()),
//!     RunOutcome::Cancelled { resume_from, .. } => println!("resume with --start-page {resume_from}"),
//! }
//! # Ok(())
//! # }
//! ```

use std::path::PathBuf;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod processing;
pub mod session;

pub use capture::{FrameSource, WindowHandle};
pub use config::{CaptureConfig, CaptureMode};
pub use error::{CaptureError, CaptureResult};
pub use processing::document::{Document, assemble};
pub use session::{CaptureEvent, CaptureSession, SessionOptions, SessionReport, SessionStatus};

use crate::core::page::Page;
use crate::core::page_store::PageStore;

/// How a run ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The PDF was written. `image_dir` is set when the page images were kept.
    Completed {
        output: PathBuf,
        pages: usize,
        image_dir: Option<PathBuf>,
    },
    /// The user stopped the run. Pages so far are in `image_dir`; rerun with
    /// `start_index = resume_from` to continue.
    Cancelled { resume_from: u32, image_dir: PathBuf },
}

fn open_store(config: &CaptureConfig) -> CaptureResult<PageStore> {
    // a resumed run reads its earlier pages from the kept directory
    if config.keep_images || config.image_dir.is_some() || config.start_index > 1 {
        PageStore::open(config.kept_image_dir())
    } else {
        PageStore::temporary()
    }
}

/// Pages from an earlier run in the same directory that precede `start_index`.
fn earlier_pages(store: &PageStore, start_index: u32) -> CaptureResult<Vec<Page>> {
    if start_index <= 1 {
        return Ok(Vec::new());
    }
    Ok(store
        .scan()?
        .into_iter()
        .filter(|page| page.index() < start_index)
        .collect())
}

/// Earlier pages must be exactly `1..start_index`, so the resumed run
/// continues one gapless sequence.
fn check_earlier(pages: &[Page], start_index: u32) -> CaptureResult<()> {
    let missing = (1..start_index)
        .zip(pages.iter().map(|page| Some(page.index())).chain(std::iter::repeat(None)))
        .find(|(expected, found)| *found != Some(*expected))
        .map(|(expected, _)| expected);
    match missing {
        Some(index) => Err(CaptureError::assembly(format!(
            "page {index} is missing from the image directory"
        ))
        .with_context(format!("resuming at page {start_index}"))),
        None => Ok(()),
    }
}

/// Capture a whole document and write it as a PDF.
///
/// Window discovery, the capture loop and document assembly run in order.
/// Page images are removed after success unless `keep_images` is set; on
/// cancellation or failure they are always kept and their directory is
/// reported, through [`RunOutcome::Cancelled`] or the log.
pub async fn run_capture(
    config: &CaptureConfig,
    source: &mut dyn FrameSource,
    events: &UnboundedSender<CaptureEvent>,
    cancel: &CancellationToken,
) -> CaptureResult<RunOutcome> {
    config.validate()?;
    let output = config.output_path();
    let store = open_store(config)?;
    let image_dir = store.dir().to_path_buf();
    info!(
        output = %output.display(),
        mode = ?config.mode,
        image_dir = %image_dir.display(),
        "capture run starting"
    );
    let _ = events.send(CaptureEvent::Prepared {
        image_dir: image_dir.clone(),
    });

    let earlier = earlier_pages(&store, config.start_index)?;
    check_earlier(&earlier, config.start_index)?;

    let mut session = CaptureSession::new(SessionOptions::from(config));
    if config.mode.is_auto() {
        if let Some(previous) = earlier.last() {
            match previous.fingerprint() {
                Ok(print) => session.continue_from(print),
                Err(error) => warn!(%error, page = previous.index(), "repeat detection starts fresh"),
            }
        }
    }
    let report = match session.run(source, &store, events, cancel).await {
        Ok(report) => report,
        Err(error) => {
            warn!(
                image_dir = %image_dir.display(),
                temporary = store.is_temporary(),
                "page images kept after failure"
            );
            return Err(error);
        }
    };

    if report.status == SessionStatus::Cancelled {
        info!(resume_from = report.resume_from(), image_dir = %image_dir.display(), "run cancelled");
        return Ok(RunOutcome::Cancelled {
            resume_from: report.resume_from(),
            image_dir,
        });
    }

    let mut pages = earlier;
    pages.extend(report.pages);

    let _ = events.send(CaptureEvent::Assembling { pages: pages.len() });
    let document = match assemble(&pages, &output) {
        Ok(document) => document,
        Err(error) => {
            warn!(image_dir = %image_dir.display(), "page images kept after failure");
            return Err(error);
        }
    };
    let _ = events.send(CaptureEvent::DocumentWritten {
        path: document.path.clone(),
        pages: document.page_count,
    });
    info!(output = %document.path.display(), pages = document.page_count, "document written");

    let kept = if config.keep_images {
        Some(image_dir)
    } else {
        store.discard(&pages)?;
        None
    };
    Ok(RunOutcome::Completed {
        output: document.path,
        pages: document.page_count,
        image_dir: kept,
    })
}
