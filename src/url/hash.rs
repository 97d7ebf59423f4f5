//! URL hashing for rule lookups.
//!
//! As defined here: https://cloud.google.com/web-risk/docs/urls-hashing#hash_computations

use sha2::{Digest, Sha256};

use super::{canonicalize, expand, expand_single, MalformedUrl};

/// Hash one expanded URL variant.
fn digest(variant: &str) -> String {
    hex::encode(Sha256::digest(variant.as_bytes()))
}

/// Create the hashed variations of a URL to check, in expansion order.
pub fn hash_url(raw_url: &str) -> Result<Vec<String>, MalformedUrl> {
    let canonical_url = canonicalize(raw_url)?;

    Ok(expand(&canonical_url)
        .iter()
        .map(|variant| digest(variant))
        .collect())
}

/// Create the full hash of a URL to register a rule against.
///
/// Returns the expanded rule text together with its hash.
pub fn hash_for_rule(raw_url: &str) -> Result<(String, String), MalformedUrl> {
    let canonical_url = canonicalize(raw_url)?;
    let expanded_url = expand_single(&canonical_url);
    let hash = digest(&expanded_url);

    Ok((expanded_url, hash))
}
