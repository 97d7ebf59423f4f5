//! A checker backed by an external malware URL feed (such as URLHaus).

use crate::models::{Reason, RuleRecord};
use crate::store::{self, RuleSource};
use crate::url::hash_for_rule;

pub struct MalwareFeed {
    source: Box<dyn RuleSource>,
}

impl MalwareFeed {
    pub fn new(source: Box<dyn RuleSource>) -> Self {
        MalwareFeed { source }
    }

    /// Convert raw feed URLs into storable rule records.
    ///
    /// URLs which cannot be canonicalized are logged and skipped rather
    /// than poisoning the whole update.
    pub fn records_from_feed<'a>(urls: impl IntoIterator<Item = &'a str>) -> Vec<RuleRecord> {
        let mut records = Vec::new();

        for url in urls {
            match hash_for_rule(url) {
                Ok((rule, hash)) => records.push(RuleRecord {
                    hash,
                    rule,
                    tags: vec![Reason::Malicious.as_str().to_string()],
                }),
                Err(err) => {
                    tracing::warn!(url, %err, "Skipping unusable feed URL");
                }
            }
        }

        records
    }
}

impl super::UrlChecker for MalwareFeed {
    fn check_hashes(&self, hashes: &[String]) -> store::Result<Vec<Reason>> {
        // Everything in the feed is malicious, so one hit is enough
        let hits = self.source.find_matches(hashes, Some(1))?;

        if hits.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![Reason::Malicious])
        }
    }
}
