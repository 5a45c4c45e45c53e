//! # Core Module
//!
//! Captured pages and the directory they are persisted in.

pub mod page;
pub mod page_store;
