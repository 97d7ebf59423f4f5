//! A URL checking engine.
//!
//! Takes a raw URL, normalises it, expands it into host/path variants and
//! compares their hashes against rule sets (a malware feed, a curated
//! block list and a curated allow list) to decide whether the URL should
//! be blocked, and why.

pub mod checker;
pub mod config;
pub mod domain;
pub mod engine;
pub mod models;
pub mod rules;
pub mod store;
pub mod url;

pub use engine::{max_severity, CheckError, CheckOptions, UrlCheckerService};
pub use models::{Detection, Reason, Severity, Source};
