//! Checkers which look for reasons to block a URL.

pub mod allow_rules;
pub mod block_rules;
pub mod blocklist_file;
pub mod malware_feed;

pub use allow_rules::AllowRules;
pub use block_rules::BlockRules;
pub use blocklist_file::BlocklistFile;
pub use malware_feed::MalwareFeed;

use crate::models::Reason;
use crate::store;

/// A checker which operates on the hex hashes of a URL's expansions.
pub trait UrlChecker: Send + Sync {
    /// Check for reasons to block a URL based on its hashes.
    fn check_hashes(&self, hashes: &[String]) -> store::Result<Vec<Reason>>;
}
