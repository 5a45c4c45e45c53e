//! # Page Store
//!
//! Intermediate page images on disk: one PNG per page, named
//! `page_NNNN.png` so a plain directory listing shows them in page order.
//! A store either owns a temporary directory, which it deletes on
//! [`PageStore::discard`], or writes into a caller-chosen directory, where
//! only the page files are removed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use image::DynamicImage;
use tracing::{debug, warn};

use super::page::Page;
use crate::error::{CaptureError, CaptureResult};

const PAGE_PREFIX: &str = "page_";
const PAGE_SUFFIX: &str = ".png";

/// File name of page `index`, zero-padded to four digits.
pub fn page_file_name(index: u32) -> String {
    format!("{PAGE_PREFIX}{index:04}{PAGE_SUFFIX}")
}

/// Page index encoded in a page file name, if it is one.
pub fn parse_page_index(name: &str) -> Option<u32> {
    let digits = name.strip_prefix(PAGE_PREFIX)?.strip_suffix(PAGE_SUFFIX)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok().filter(|index| *index > 0)
}

#[derive(Debug)]
pub struct PageStore {
    dir: PathBuf,
    temporary: bool,
}

impl PageStore {
    /// Use (and create if needed) a caller-chosen directory.
    pub fn open(dir: impl Into<PathBuf>) -> CaptureResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| CaptureError::io("create image directory", &dir, e))?;
        Ok(Self {
            dir,
            temporary: false,
        })
    }

    /// Create a fresh temporary directory.
    pub fn temporary() -> CaptureResult<Self> {
        let dir = tempfile::Builder::new()
            .prefix("pagecap_")
            .tempdir()
            .map_err(|e| CaptureError::io("create temporary directory", std::env::temp_dir(), e))?
            .keep();
        Ok(Self {
            dir,
            temporary: true,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn page_path(&self, index: u32) -> PathBuf {
        self.dir.join(page_file_name(index))
    }

    /// Persist a captured frame as page `index`.
    pub fn write(&self, index: u32, frame: &DynamicImage) -> CaptureResult<Page> {
        let path = self.page_path(index);
        frame.save_with_format(&path, image::ImageFormat::Png).map_err(|e| {
            let source = match e {
                image::ImageError::IoError(io) => io,
                other => io::Error::other(other),
            };
            CaptureError::io("write page image", &path, source)
        })?;
        debug!(index, path = %path.display(), "stored page");
        Ok(Page::new(index, path))
    }

    /// Delete a page image. A file that is already gone is not an error.
    pub fn remove(&self, page: &Page) -> CaptureResult<()> {
        match fs::remove_file(page.path()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CaptureError::io("remove page image", page.path(), e)),
        }
    }

    /// All page files currently in the directory, in ascending index order.
    pub fn scan(&self) -> CaptureResult<Vec<Page>> {
        let entries =
            fs::read_dir(&self.dir).map_err(|e| CaptureError::io("list image directory", &self.dir, e))?;
        let mut pages = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| CaptureError::io("list image directory", &self.dir, e))?;
            let name = entry.file_name();
            if let Some(index) = name.to_str().and_then(parse_page_index) {
                pages.push(Page::new(index, entry.path()));
            }
        }
        pages.sort_by_key(Page::index);
        Ok(pages)
    }

    /// Remove the intermediate images after a successful run.
    pub fn discard(self, pages: &[Page]) -> CaptureResult<()> {
        if self.temporary {
            return fs::remove_dir_all(&self.dir)
                .map_err(|e| CaptureError::io("remove temporary directory", &self.dir, e));
        }
        for page in pages {
            self.remove(page)?;
        }
        if let Err(e) = fs::remove_dir(&self.dir) {
            // other files live there; leave the directory alone
            warn!(dir = %self.dir.display(), error = %e, "image directory kept");
        }
        Ok(())
    }
}
