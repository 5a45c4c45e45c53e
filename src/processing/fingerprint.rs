//! # Duplicate Detection
//!
//! Content fingerprints for captured pages and the run-length policy that
//! decides when a book has ended.
//!
//! ## Fingerprint
//!
//! A SHA-256 digest over the decoded pixel buffer together with its width,
//! height and color type. File names, timestamps and PNG encoder details never
//! enter the digest, so two captures of the same screen content always match.
//!
//! ## End-of-document policy
//!
//! Turning past the last page leaves the reader on that page, so every further
//! capture repeats it. The [`RepeatTracker`] counts consecutive repeats; the
//! first repeat makes the run 1. When the run reaches
//! [`STABLE_RUN_THRESHOLD`], all pages in the run are past the end: the caller
//! removes those trailing pages and rolls the page index back by the run
//! length. A changed page resets the run to zero.
//!
//! ```text
//! page:   1  2  3  4  5  6  7  8  9
//! print:  a  b  c  d  e  f  f  f  f
//! run:    0  0  0  0  0  0  1  2  3 -> stable, drop 7..=9, keep 1..=6
//! ```

use std::fmt;

use image::DynamicImage;
use sha2::{Digest, Sha256};

/// Consecutive repeats that mark the end of the document.
pub const STABLE_RUN_THRESHOLD: u32 = 3;

/// Content digest of one page image.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // the first 8 bytes are plenty to tell pages apart in logs
        write!(f, "Fingerprint(")?;
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        write!(f, ")")
    }
}

/// Compute the content fingerprint of a decoded image.
pub fn fingerprint(image: &DynamicImage) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(image.width().to_le_bytes());
    hasher.update(image.height().to_le_bytes());
    hasher.update(format!("{:?}", image.color()).as_bytes());
    hasher.update(image.as_bytes());
    Fingerprint(hasher.finalize().into())
}

/// True when `current` repeats `previous`. The first page has no predecessor
/// and is never a repeat.
pub fn is_repeat(current: &Fingerprint, previous: Option<&Fingerprint>) -> bool {
    previous.is_some_and(|prev| prev == current)
}

/// Outcome of feeding one fingerprint to a [`RepeatTracker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatVerdict {
    /// Differs from the previous page.
    Fresh,
    /// Same as the previous page; `run` repeats so far.
    Repeat { run: u32 },
    /// The run hit the threshold. The last `run` pages are past the end.
    Stable { run: u32 },
}

/// Run-length counter of consecutive identical fingerprints.
#[derive(Debug, Clone)]
pub struct RepeatTracker {
    last: Option<Fingerprint>,
    run: u32,
    threshold: u32,
}

impl Default for RepeatTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RepeatTracker {
    pub fn new() -> Self {
        Self::with_threshold(STABLE_RUN_THRESHOLD)
    }

    fn with_threshold(threshold: u32) -> Self {
        Self {
            last: None,
            run: 0,
            threshold: threshold.max(1),
        }
    }

    /// Feed the fingerprint of the next captured page.
    pub fn observe(&mut self, current: Fingerprint) -> RepeatVerdict {
        let verdict = if is_repeat(&current, self.last.as_ref()) {
            self.run += 1;
            if self.run >= self.threshold {
                RepeatVerdict::Stable { run: self.run }
            } else {
                RepeatVerdict::Repeat { run: self.run }
            }
        } else {
            self.run = 0;
            RepeatVerdict::Fresh
        };
        self.last = Some(current);
        verdict
    }

    /// Current number of consecutive repeats.
    pub fn run(&self) -> u32 {
        self.run
    }

    /// Treat `previous` as the page seen just before the next observation,
    /// without counting it as a capture.
    pub fn prime(&mut self, previous: Fingerprint) {
        self.last = Some(previous);
        self.run = 0;
    }
}
