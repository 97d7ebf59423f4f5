//! Rules and tests for public domain suffixes.
//!
//! These come in two basic flavours:
//!
//!  * ICANN: .com, .co.uk etc.
//!  * Private: .github.io
//!
//! The private list includes lots of blog sites and domain hosting
//! providers. "Private" here means privately owned; both kinds are public
//! in the sense of being reachable on the internet.
//!
//! The data is sourced from and maintained by https://publicsuffix.org/list/

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use serde::Serialize;

use super::Domain;

/// Whether a suffix is ICANN registered or run by a private company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SuffixType {
    #[serde(rename = "icann")]
    Icann,
    #[serde(rename = "private")]
    Private,
}

#[derive(Debug, Clone)]
struct Rule {
    line_no: usize,
    is_exception: bool,
    suffix_type: SuffixType,
}

/// A parsed copy of the public suffix list.
#[derive(Debug, Clone, Default)]
pub struct PublicSuffixTable {
    rules: HashMap<String, Rule>,
    /// Label count of the longest rule, which bounds how many suffixes of
    /// a domain are worth testing
    longest_rule: usize,
}

impl PublicSuffixTable {
    /// Parse rules from the public suffix list format.
    ///
    /// See https://publicsuffix.org/list/ for details.
    pub fn parse(text: &str) -> Self {
        let mut rules = HashMap::new();
        let mut max_dots = 0;
        let mut suffix_type = SuffixType::Icann;

        for (line_no, line) in text.lines().enumerate() {
            if line.contains("===BEGIN PRIVATE DOMAINS===") {
                suffix_type = SuffixType::Private;
                continue;
            }

            let line = line.trim();
            if line.is_empty() || line.starts_with("//") {
                continue;
            }

            // Lines starting with "!" are exception rules
            let (line, is_exception) = match line.strip_prefix('!') {
                Some(line) => (line, true),
                None => (line, false),
            };

            max_dots = max_dots.max(line.matches('.').count());

            rules.insert(
                line.to_string(),
                Rule {
                    line_no,
                    is_exception,
                    suffix_type,
                },
            );
        }

        PublicSuffixTable {
            rules,
            longest_rule: max_dots + 1,
        }
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Classify a suffix string, or None if it isn't a public suffix.
    pub fn suffix_type(&self, suffix: &str) -> Option<SuffixType> {
        if suffix.is_empty() {
            return None;
        }

        // We need to match the exact suffix as well as the wildcard version
        let exact = self.rules.get(suffix);
        let wild = self.rules.get(&make_wild(suffix));

        let rule = match (exact, wild) {
            // On a double hit the rule from later in the file wins
            (Some(exact), Some(wild)) => {
                if wild.line_no > exact.line_no {
                    wild
                } else {
                    exact
                }
            }
            (Some(rule), None) | (None, Some(rule)) => rule,
            (None, None) => return None,
        };

        if rule.is_exception {
            return None;
        }

        Some(rule.suffix_type)
    }

    /// Is the given string a recognised public suffix?
    pub fn is_suffix(&self, suffix: &str, icann_only: bool) -> bool {
        match self.suffix_type(suffix) {
            Some(SuffixType::Icann) => true,
            Some(SuffixType::Private) => !icann_only,
            None => false,
        }
    }

    /// Get the public suffix of a domain, longest match first.
    pub fn get_suffix(&self, domain: &Domain, icann_only: bool) -> Option<String> {
        let suffixes = domain.suffixes(None, Some(self.longest_rule), true);

        // suffixes() is shortest first, so walk it backwards to prefer
        // longer matches
        suffixes
            .into_iter()
            .rev()
            .find(|suffix| self.is_suffix(suffix, icann_only))
    }

    /// Does the domain end in any recognised public suffix?
    pub fn has_suffix(&self, domain: &Domain) -> bool {
        self.get_suffix(domain, false).is_some()
    }
}

/// The wildcard version of a suffix, with the first label replaced by '*'.
///
/// The format allows '*' in any position but the real list only ever uses
/// a single leading wildcard.
fn make_wild(suffix: &str) -> String {
    let mut labels: Vec<&str> = suffix.split('.').collect();
    labels[0] = "*";
    labels.join(".")
}
