//! A checker based on our own curated block rules.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::{Reason, RuleRecord};
use crate::store::{self, RuleSource};
use crate::url::hash_for_rule;

/// One `<rule> <reason>` pair per line, with an optional trailing comment.
static LINE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\S+)\s+(\S+)(?:\s*#.*)?$").unwrap());

pub struct BlockRules {
    source: Box<dyn RuleSource>,
}

impl BlockRules {
    pub fn new(source: Box<dyn RuleSource>) -> Self {
        BlockRules { source }
    }

    /// Convert curated block list text into storable rule records.
    ///
    /// Leading '*' wildcards are dropped as a raw domain is subject to
    /// suffix expansion anyway. Rules with wildcards anywhere else cannot
    /// be expressed as a hash and are skipped.
    pub fn records_from_blocklist(text: &str) -> Vec<RuleRecord> {
        let mut records = Vec::new();

        for (rule, reason) in parse_blocklist(text) {
            let rule = rule.trim_start_matches(['*', '.']);
            if rule.contains('*') {
                tracing::warn!(rule, "Skipping non-prefix wildcard block rule");
                continue;
            }

            match hash_for_rule(rule) {
                Ok((expanded, hash)) => records.push(RuleRecord {
                    hash,
                    rule: expanded,
                    tags: vec![reason.as_str().to_string()],
                }),
                Err(err) => {
                    tracing::warn!(rule, %err, "Skipping unusable block rule");
                }
            }
        }

        records
    }
}

impl super::UrlChecker for BlockRules {
    fn check_hashes(&self, hashes: &[String]) -> store::Result<Vec<Reason>> {
        let hits = self.source.find_matches(hashes, None)?;

        Ok(hits.iter().flat_map(|hit| hit.reasons()).collect())
    }
}

/// Parse curated block list text into (rule, reason) pairs.
///
/// Blank lines and comments are skipped; lines which don't parse are
/// logged and dropped. Unknown reasons fall back to [`Reason::Other`].
pub fn parse_blocklist(text: &str) -> Vec<(String, Reason)> {
    let mut rules = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        match LINE_PATTERN.captures(line) {
            Some(captures) => rules.push((captures[1].to_string(), Reason::parse(&captures[2]))),
            None => {
                tracing::warn!(line, "Cannot parse block list line");
            }
        }
    }

    rules
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checker::UrlChecker;
    use crate::store::{RuleTable, SqliteRuleStore, TableSource};
    use crate::url::hash_url;
    use std::sync::Arc;

    #[test]
    fn test_parse_blocklist() {
        let rules = parse_blocklist(
            "# A comment\n\
             \n\
             example.com publisher-blocked\n\
             video.example.com media-video # trailing comment\n\
             odd.example.com no-such-reason\n\
             a-rule-with no reason at all\n",
        );

        assert_eq!(
            rules,
            vec![
                ("example.com".to_string(), Reason::PublisherBlocked),
                ("video.example.com".to_string(), Reason::MediaVideo),
                ("odd.example.com".to_string(), Reason::Other),
            ]
        );
    }

    #[test]
    fn test_records_from_blocklist() {
        let records = BlockRules::records_from_blocklist(
            "*.wildcard.example.com high-io\n\
             inner.*.example.com media-mixed\n\
             plain.example.com publisher-blocked\n",
        );

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].rule, "wildcard.example.com/");
        assert_eq!(records[0].tags, vec!["high-io"]);
        assert_eq!(records[1].rule, "plain.example.com/");
    }

    #[test]
    fn test_check_hashes_returns_every_reason() {
        let store = Arc::new(SqliteRuleStore::open_in_memory().unwrap());
        store
            .bulk_upsert(
                RuleTable::Block,
                &BlockRules::records_from_blocklist(
                    "example.com publisher-blocked\nwww.example.com media-video\n",
                ),
            )
            .unwrap();

        let checker = BlockRules::new(Box::new(TableSource::new(store, RuleTable::Block)));

        let hashes = hash_url("http://www.example.com/page").unwrap();
        let mut reasons = checker.check_hashes(&hashes).unwrap();
        reasons.sort_by_key(|reason| reason.priority());

        assert_eq!(reasons, vec![Reason::PublisherBlocked, Reason::MediaVideo]);
    }

    #[test]
    fn test_check_hashes_misses() {
        let store = Arc::new(SqliteRuleStore::open_in_memory().unwrap());
        let checker = BlockRules::new(Box::new(TableSource::new(store, RuleTable::Block)));

        let hashes = hash_url("http://fine.example.org/").unwrap();
        assert!(checker.check_hashes(&hashes).unwrap().is_empty());
    }
}
