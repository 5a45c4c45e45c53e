//! # Error Handling
//!
//! Error types for the capture-and-paginate pipeline.
//!
//! ## Classification
//!
//! Every failure is fatal for the session that raised it. Nothing is retried.
//! Each capture-side error carries the last page index that was written to
//! disk, so the caller can restart with `start_index = last_index + 1`.
//!
//! | Variant | Raised by | Partial pages |
//! |---------|-----------|---------------|
//! | `SourceUnavailable` | window discovery, before the loop | none yet |
//! | `CaptureFailure` | `FrameSource::capture` | kept |
//! | `AdvanceFailure` | `FrameSource::advance_page` | kept |
//! | `AssemblyFailure` | document assembly | kept, no output written |
//! | `Config` | option validation | none |
//! | `Io` | page store | kept |
//!
//! Cancellation by the user is not an error. It is reported as
//! [`crate::RunOutcome::Cancelled`].
//!
//! ## Usage
//!
//! ```rust
//! use paged_capture::error::CaptureError;
//!
//! let error = CaptureError::capture_failure(12, "window 4711 returned no image")
//!     .with_context("capturing page 13");
//!
//! assert_eq!(error.category(), "capture");
//! assert_eq!(error.last_index(), Some(12));
//! ```

use std::path::PathBuf;

use thiserror::Error;

/// Base error type for the capture pipeline.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// The target window could not be found or the automation backend is missing.
    #[error("source unavailable: {reason}{}", fmt_context(.context))]
    SourceUnavailable {
        reason: String,
        context: Option<String>,
    },

    /// A single frame could not be obtained.
    #[error("capture failed after page {last_index}: {reason}{}", fmt_context(.context))]
    CaptureFailure {
        last_index: u32,
        reason: String,
        context: Option<String>,
    },

    /// The page-turn command failed.
    #[error("page advance failed after page {last_index}: {reason}{}", fmt_context(.context))]
    AdvanceFailure {
        last_index: u32,
        reason: String,
        context: Option<String>,
    },

    /// No pages to assemble, or a page image could not be decoded or encoded.
    #[error("document assembly failed: {reason}{}", fmt_context(.context))]
    AssemblyFailure {
        path: Option<PathBuf>,
        reason: String,
        context: Option<String>,
    },

    /// Option validation errors.
    #[error("configuration error in '{field}': {reason} (value: {value})")]
    Config {
        field: String,
        value: String,
        reason: String,
    },

    /// Page store I/O.
    #[error("I/O error during {operation}{}: {source}", fmt_path(.path))]
    Io {
        operation: String,
        path: Option<PathBuf>,
        last_index: Option<u32>,
        #[source]
        source: std::io::Error,
    },
}

fn fmt_context(context: &Option<String>) -> String {
    context
        .as_ref()
        .map(|c| format!(" (while {c})"))
        .unwrap_or_default()
}

fn fmt_path(path: &Option<PathBuf>) -> String {
    path.as_ref()
        .map(|p| format!(" on {}", p.display()))
        .unwrap_or_default()
}

impl CaptureError {
    /// Create a source-unavailable error
    pub fn source_unavailable(reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            reason: reason.into(),
            context: None,
        }
    }

    /// Create a frame capture error
    pub fn capture_failure(last_index: u32, reason: impl Into<String>) -> Self {
        Self::CaptureFailure {
            last_index,
            reason: reason.into(),
            context: None,
        }
    }

    /// Create a page advance error
    pub fn advance_failure(last_index: u32, reason: impl Into<String>) -> Self {
        Self::AdvanceFailure {
            last_index,
            reason: reason.into(),
            context: None,
        }
    }

    /// Create an assembly error
    pub fn assembly(reason: impl Into<String>) -> Self {
        Self::AssemblyFailure {
            path: None,
            reason: reason.into(),
            context: None,
        }
    }

    /// Create an assembly error tied to a page file
    pub fn assembly_at(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::AssemblyFailure {
            path: Some(path.into()),
            reason: reason.into(),
            context: None,
        }
    }

    /// Create a configuration error
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: Some(path.into()),
            last_index: None,
            source,
        }
    }

    /// Attach a description of what was going on when the error happened.
    pub fn with_context(mut self, ctx: impl Into<String>) -> Self {
        match &mut self {
            Self::SourceUnavailable { context, .. }
            | Self::CaptureFailure { context, .. }
            | Self::AdvanceFailure { context, .. }
            | Self::AssemblyFailure { context, .. } => *context = Some(ctx.into()),
            Self::Config { .. } | Self::Io { .. } => {}
        }
        self
    }

    /// Record the last page that made it to disk before this error.
    pub fn with_last_index(mut self, index: u32) -> Self {
        match &mut self {
            Self::CaptureFailure { last_index, .. } | Self::AdvanceFailure { last_index, .. } => {
                *last_index = index
            }
            Self::Io { last_index, .. } => *last_index = Some(index),
            _ => {}
        }
        self
    }

    /// Short machine-friendly name of the error class.
    pub fn category(&self) -> &'static str {
        match self {
            Self::SourceUnavailable { .. } => "source",
            Self::CaptureFailure { .. } => "capture",
            Self::AdvanceFailure { .. } => "advance",
            Self::AssemblyFailure { .. } => "assembly",
            Self::Config { .. } => "config",
            Self::Io { .. } => "io",
        }
    }

    /// Last page index successfully written before the failure, if known.
    pub fn last_index(&self) -> Option<u32> {
        match self {
            Self::CaptureFailure { last_index, .. } | Self::AdvanceFailure { last_index, .. } => {
                Some(*last_index)
            }
            Self::Io { last_index, .. } => *last_index,
            _ => None,
        }
    }

    /// Index to pass as `start_index` to pick the run back up.
    pub fn resume_index(&self) -> Option<u32> {
        self.last_index().map(|i| i + 1)
    }
}

/// Result type alias using our custom error type
pub type CaptureResult<T> = Result<T, CaptureError>;
