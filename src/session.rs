//! # Capture Session
//!
//! The page-by-page acquisition loop.
//!
//! ## Loop
//!
//! ```text
//! activate ─▶ locate window ─▶ countdown
//!                                 │
//!          ┌──────────────────────▼──────────────────────┐
//!          │ capture ─▶ store ─▶ [auto] fingerprint/check │
//!          │    ▲                         │ stable ──────┼─▶ trim, Completed
//!          │    └── delay ◀── advance ◀── progress      │
//!          └─────────────────────────────────────────────┘
//!                 cancel token observed here ──────────────▶ Cancelled
//! ```
//!
//! All run state lives in a [`CaptureSession`]; progress leaves the loop only
//! through the [`CaptureEvent`] channel, so front-ends never touch session
//! state. Cancellation is cooperative: it is checked at the top of every
//! iteration and during the post-advance delay, never in the middle of a
//! capture.

use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::capture::{FrameSource, WindowHandle};
use crate::config::{CaptureConfig, CaptureMode};
use crate::core::page::Page;
use crate::core::page_store::PageStore;
use crate::error::{CaptureError, CaptureResult};
use crate::processing::fingerprint::{Fingerprint, RepeatTracker, RepeatVerdict, fingerprint};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Running,
    Cancelled,
    Completed,
    Failed,
}

/// Messages from the capture loop to whoever is watching it.
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// Page images will be written here.
    Prepared { image_dir: PathBuf },
    /// The target window was found.
    WindowFound { handle: WindowHandle },
    /// Seconds left before the first capture.
    Countdown { remaining_secs: u64 },
    /// A page was captured and stored. `percent` is only known with a page count.
    Progress {
        page: u32,
        total: Option<u32>,
        percent: Option<f32>,
    },
    /// Content stopped changing; `removed` trailing duplicates were dropped.
    EndDetected { last_page: u32, removed: u32 },
    /// The loop ended.
    Finished { status: SessionStatus, last_index: u32 },
    /// The document is being written.
    Assembling { pages: usize },
    /// The document is on disk.
    DocumentWritten { path: PathBuf, pages: usize },
}

/// Loop parameters derived from a [`CaptureConfig`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionOptions {
    pub mode: CaptureMode,
    pub start_index: u32,
    pub delay: Duration,
    pub countdown: Duration,
}

impl From<&CaptureConfig> for SessionOptions {
    fn from(config: &CaptureConfig) -> Self {
        Self {
            mode: config.mode,
            start_index: config.start_index,
            delay: config.delay,
            countdown: config.countdown,
        }
    }
}

/// What a session produced when it did not fail.
#[derive(Debug)]
pub struct SessionReport {
    pub status: SessionStatus,
    pub start_index: u32,
    /// Last page that survived, `start_index - 1` if none did.
    pub last_index: u32,
    /// Trailing duplicates removed at the end of an auto run.
    pub removed: u32,
    pub pages: Vec<Page>,
}

impl SessionReport {
    /// `start_index` for a follow-up run.
    pub fn resume_from(&self) -> u32 {
        self.last_index + 1
    }
}

/// Ephemeral state of one capture run.
#[derive(Debug)]
pub struct CaptureSession {
    start_index: u32,
    current_index: u32,
    mode: CaptureMode,
    delay: Duration,
    countdown: Duration,
    status: SessionStatus,
    repeats: RepeatTracker,
    removed: u32,
    pages: Vec<Page>,
}

enum Step {
    Continue,
    Stop(SessionStatus),
}

impl CaptureSession {
    pub fn new(options: SessionOptions) -> Self {
        let start_index = options.start_index.max(1);
        Self {
            start_index,
            current_index: start_index,
            mode: options.mode,
            delay: options.delay,
            countdown: options.countdown,
            status: SessionStatus::Running,
            repeats: RepeatTracker::new(),
            removed: 0,
            pages: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn start_index(&self) -> u32 {
        self.start_index
    }

    /// Index of the next page to capture.
    pub fn current_index(&self) -> u32 {
        self.current_index
    }

    /// Last page captured and kept, `start_index - 1` before the first one.
    pub fn last_index(&self) -> u32 {
        self.current_index - 1
    }

    /// Pages captured in this session. Always `current_index - start_index`.
    pub fn captured(&self) -> u32 {
        self.current_index - self.start_index
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Compare the first capture against the page a previous run ended on.
    pub fn continue_from(&mut self, previous: Fingerprint) {
        self.repeats.prime(previous);
    }

    fn max_pages(&self) -> Option<u32> {
        self.mode.max_pages()
    }

    fn has_more(&self) -> bool {
        self.max_pages().is_none_or(|max| self.current_index <= max)
    }

    fn emit(events: &UnboundedSender<CaptureEvent>, event: CaptureEvent) {
        // a closed receiver only means nobody is watching
        let _ = events.send(event);
    }

    fn fail(&mut self, error: CaptureError) -> CaptureError {
        self.status = SessionStatus::Failed;
        error.with_last_index(self.last_index())
    }

    /// Run the loop to completion, cancellation or failure.
    ///
    /// On `Err` the session status is `Failed`, the pages captured so far stay
    /// on disk, and the error carries the last stored index.
    pub async fn run<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        store: &PageStore,
        events: &UnboundedSender<CaptureEvent>,
        cancel: &CancellationToken,
    ) -> CaptureResult<SessionReport> {
        let status = match self.drive(source, store, events, cancel).await {
            Ok(status) => status,
            Err(error) => {
                let error = self.fail(error);
                warn!(%error, last_index = self.last_index(), "capture session failed");
                Self::emit(
                    events,
                    CaptureEvent::Finished {
                        status: SessionStatus::Failed,
                        last_index: self.last_index(),
                    },
                );
                return Err(error);
            }
        };

        self.status = status;
        info!(
            ?status,
            captured = self.captured(),
            last_index = self.last_index(),
            "capture session finished"
        );
        Self::emit(
            events,
            CaptureEvent::Finished {
                status,
                last_index: self.last_index(),
            },
        );
        Ok(SessionReport {
            status,
            start_index: self.start_index,
            last_index: self.last_index(),
            removed: self.removed,
            pages: std::mem::take(&mut self.pages),
        })
    }

    async fn drive<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        store: &PageStore,
        events: &UnboundedSender<CaptureEvent>,
        cancel: &CancellationToken,
    ) -> CaptureResult<SessionStatus> {
        source.activate().await?;
        let handle = source.locate_window().await?;
        info!(window = handle.id, width = handle.width, height = handle.height, "found reader window");
        Self::emit(events, CaptureEvent::WindowFound { handle: handle.clone() });

        if !self.count_down(events, cancel).await {
            return Ok(SessionStatus::Cancelled);
        }

        info!(
            start = self.start_index,
            max = ?self.max_pages(),
            delay_ms = self.delay.as_millis() as u64,
            "starting capture loop"
        );
        while self.has_more() {
            if cancel.is_cancelled() {
                return Ok(SessionStatus::Cancelled);
            }
            if let Step::Stop(status) = self.step(source, &handle, store, events, cancel).await? {
                return Ok(status);
            }
        }
        Ok(SessionStatus::Completed)
    }

    /// Returns false when cancelled during the countdown.
    async fn count_down(&self, events: &UnboundedSender<CaptureEvent>, cancel: &CancellationToken) -> bool {
        let mut remaining = self.countdown;
        while !remaining.is_zero() {
            Self::emit(
                events,
                CaptureEvent::Countdown {
                    remaining_secs: remaining.as_secs_f64().ceil() as u64,
                },
            );
            let tick = remaining.min(Duration::from_secs(1));
            if !Self::pause(tick, cancel).await {
                return false;
            }
            remaining -= tick;
        }
        !cancel.is_cancelled()
    }

    /// Sleep for `duration`; false if cancelled first.
    async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
        tokio::select! {
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }

    async fn step<S: FrameSource + ?Sized>(
        &mut self,
        source: &mut S,
        handle: &WindowHandle,
        store: &PageStore,
        events: &UnboundedSender<CaptureEvent>,
        cancel: &CancellationToken,
    ) -> CaptureResult<Step> {
        let index = self.current_index;
        let frame = source
            .capture(handle)
            .await
            .map_err(|e| e.with_context(format!("capturing page {index}")))?;
        let mut page = store.write(index, &frame)?;

        let verdict = if self.mode.is_auto() {
            let print = fingerprint(&frame);
            page = page.with_fingerprint(print);
            Some(self.repeats.observe(print))
        } else {
            None
        };
        drop(frame);

        self.pages.push(page);
        self.current_index += 1;

        if let Some(RepeatVerdict::Stable { run }) = verdict {
            self.trim_trailing(run, store)?;
            info!(last_page = self.last_index(), removed = run, "end of document detected");
            Self::emit(
                events,
                CaptureEvent::EndDetected {
                    last_page: self.last_index(),
                    removed: run,
                },
            );
            return Ok(Step::Stop(SessionStatus::Completed));
        }
        if let Some(RepeatVerdict::Repeat { run }) = verdict {
            debug!(page = index, run, "page repeats the previous one");
        }

        let total = self.max_pages();
        let percent = total.map(|max| index as f32 * 100.0 / max as f32);
        Self::emit(events, CaptureEvent::Progress { page: index, total, percent });

        source
            .advance_page()
            .await
            .map_err(|e| e.with_context(format!("turning past page {index}")))?;
        if !Self::pause(self.delay, cancel).await {
            return Ok(Step::Stop(SessionStatus::Cancelled));
        }
        Ok(Step::Continue)
    }

    /// Drop the last `run` pages and roll the index back by the same amount.
    ///
    /// The index and page list are rolled back before any file is touched;
    /// every removal is attempted and the first failure is returned.
    fn trim_trailing(&mut self, run: u32, store: &PageStore) -> CaptureResult<()> {
        let run = run.min(self.pages.len() as u32);
        let keep = self.pages.len() - run as usize;
        let trailing: Vec<Page> = self.pages.drain(keep..).collect();
        self.current_index -= run;
        self.removed += run;

        let mut first_error = None;
        for page in &trailing {
            if let Err(error) = store.remove(page) {
                warn!(page = page.index(), %error, "could not remove trailing duplicate");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
