//! URL normalisation, expansion and hashing.
//!
//! Implements the Google Web Risk canonicalization and suffix/prefix
//! expression scheme (https://cloud.google.com/web-risk/docs/urls-hashing)
//! used to compare URLs against hashed rule sets.

pub mod canonicalize;
pub mod expand;
pub mod hash;

pub use canonicalize::{canonical_split, canonicalize, UrlParts};
pub use expand::{expand, expand_single};
pub use hash::{hash_for_rule, hash_url};

use thiserror::Error;

/// Error raised when a URL's host cannot be decoded at all.
///
/// Everything else about a URL is corrected best-effort rather than
/// rejected.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("malformed URL: {0}")]
pub struct MalformedUrl(pub String);
