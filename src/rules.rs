//! A service for managing the rules themselves.

use std::sync::Arc;

use thiserror::Error;

use crate::engine::{CheckError, CheckOptions, UrlCheckerService};
use crate::models::{Detection, Reason, RuleRecord, Source};
use crate::store::{RuleTable, SqliteRuleStore};
use crate::url::hash_for_rule;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("Requested URL is already allowed")]
    AlreadyAllowed,
    #[error("Cannot allow URL as reasons to block found: {0:?}")]
    Blocked(Vec<Detection>),
    #[error(transparent)]
    Check(#[from] CheckError),
    #[error("Store error: {0}")]
    Store(#[from] crate::store::StoreError),
}

pub struct RuleService {
    checker: Arc<UrlCheckerService>,
    store: Arc<SqliteRuleStore>,
}

impl RuleService {
    const ALLOW_LIST_DETECTION: Detection = Detection {
        reason: Reason::NotAllowed,
        source: Source::AllowList,
    };

    pub fn new(checker: Arc<UrlCheckerService>, store: Arc<SqliteRuleStore>) -> Self {
        RuleService { checker, store }
    }

    /// Add a URL to the allow list.
    ///
    /// This also checks that the URL is not already allowed and is not on
    /// any of our block lists.
    pub fn add_to_allow_list(&self, url: &str) -> Result<RuleRecord, RuleError> {
        let options = CheckOptions {
            fail_fast: false,
            ..CheckOptions::default()
        };
        let mut detections = self.checker.check_url(url, &options)?;

        // Exactly the NOT_ALLOWED detection must be present; without it
        // the URL is already on the list
        match detections
            .iter()
            .position(|detection| *detection == Self::ALLOW_LIST_DETECTION)
        {
            Some(pos) => detections.remove(pos),
            None => return Err(RuleError::AlreadyAllowed),
        };

        if !detections.is_empty() {
            return Err(RuleError::Blocked(detections));
        }

        let (rule, hash) = hash_for_rule(url).map_err(CheckError::from)?;
        let record = RuleRecord {
            hash,
            rule,
            tags: vec!["manual".to_string()],
        };
        self.store.bulk_upsert(RuleTable::Allow, &[record.clone()])?;

        Ok(record)
    }
}
