//! A captured page and its lazily computed fingerprint.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{CaptureError, CaptureResult};
use crate::processing::fingerprint::{Fingerprint, fingerprint};

/// One captured page. The pixels live in the page image file written by the
/// [`PageStore`](super::page_store::PageStore); the session owns the `Page`
/// until it is handed to the assembler.
#[derive(Debug)]
pub struct Page {
    index: u32,
    path: PathBuf,
    fingerprint: OnceLock<Fingerprint>,
}

impl Page {
    pub fn new(index: u32, path: impl Into<PathBuf>) -> Self {
        Self {
            index,
            path: path.into(),
            fingerprint: OnceLock::new(),
        }
    }

    /// 1-based page number.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Backing image file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Seed the fingerprint from pixels already in memory.
    pub fn with_fingerprint(self, value: Fingerprint) -> Self {
        let _ = self.fingerprint.set(value);
        self
    }

    /// Fingerprint of the page, decoding the image file on first use.
    pub fn fingerprint(&self) -> CaptureResult<Fingerprint> {
        if let Some(value) = self.fingerprint.get() {
            return Ok(*value);
        }
        let image = image::open(&self.path)
            .map_err(|e| CaptureError::assembly_at(&self.path, format!("cannot decode page: {e}")))?;
        Ok(*self.fingerprint.get_or_init(|| fingerprint(&image)))
    }
}
