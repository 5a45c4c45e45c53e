//! # Processing Module
//!
//! What happens to captured pages: duplicate detection while capturing and
//! PDF assembly at the end.

pub mod document;
pub mod fingerprint;

pub use document::{Document, OUTPUT_DPI, assemble, flatten_onto_white};
pub use fingerprint::{Fingerprint, RepeatTracker, RepeatVerdict, STABLE_RUN_THRESHOLD, fingerprint, is_repeat};
