//! A checker based on our own curated allow list.

use crate::models::Reason;
use crate::store::{self, RuleSource};

pub struct AllowRules {
    source: Box<dyn RuleSource>,
}

impl AllowRules {
    pub fn new(source: Box<dyn RuleSource>) -> Self {
        AllowRules { source }
    }
}

impl super::UrlChecker for AllowRules {
    /// Flag a URL which is not explicitly allowed, based on its hashes.
    fn check_hashes(&self, hashes: &[String]) -> store::Result<Vec<Reason>> {
        let hits = self.source.find_matches(hashes, Some(1))?;

        if hits.is_empty() {
            Ok(vec![Reason::NotAllowed])
        } else {
            Ok(Vec::new())
        }
    }
}
