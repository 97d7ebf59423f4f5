//! Recognised top level domains.

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

/// The set of ICANN recognised top level domains.
///
/// The top level domain is the last label of a domain, which must also be
/// a recognised ICANN value. Many valid domain names therefore have a last
/// label which is not a top level domain by this definition:
///
/// ```text
/// www.google.com -> com
/// my_home_server.local -> None
/// ```
#[derive(Debug, Clone, Default)]
pub struct TopLevelDomainTable {
    tlds: HashSet<String>,
}

impl TopLevelDomainTable {
    /// Parse a table from one TLD per line. Blank lines and lines starting
    /// with '#' are skipped.
    pub fn parse(text: &str) -> Self {
        let tlds = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_lowercase)
            .collect();

        TopLevelDomainTable { tlds }
    }

    pub fn from_file(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    /// Is this exact string a recognised top level domain?
    pub fn is_tld(&self, suffix: &str) -> bool {
        self.tlds.contains(suffix)
    }

    /// Does this domain end in a recognised top level domain?
    ///
    /// The domain must have at least one label before the TLD, so a bare
    /// "com" does not count.
    pub fn has_tld(&self, domain: &str) -> bool {
        match domain.rfind('.') {
            Some(pos) => self.tlds.contains(&domain[pos + 1..]),
            None => false,
        }
    }

    /// Get the top level domain of a domain name (if it has one).
    pub fn get_tld(&self, domain: &str) -> Option<String> {
        if !self.has_tld(domain) {
            return None;
        }

        domain.rsplit('.').next().map(str::to_string)
    }
}
