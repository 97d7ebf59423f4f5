//! Domain names and the lookup data needed to classify them.

pub mod public_suffix;
pub mod top_level_domain;

pub use public_suffix::{PublicSuffixTable, SuffixType};
pub use top_level_domain::TopLevelDomainTable;

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static IP_V4: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}$").unwrap());
static PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d*$").unwrap());
static USER_PASS: Lazy<Regex> = Lazy::new(|| Regex::new(r"^.*@").unwrap());

/// A domain string with metadata derivable from the string alone.
///
/// Anything needing lookup data (public suffixes, TLDs) lives on
/// [`DomainTables`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Construct a domain, stripping whitespace, any port and any
    /// user:password section. This is total; validity is a separate check.
    pub fn new(raw: &str) -> Self {
        let domain = raw.trim();
        let domain = PORT.replace(domain, "");
        let domain = USER_PASS.replace(&domain, "");

        Domain(domain.into_owned())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The parts separated by dots. For IP addresses these are the digit
    /// groups.
    pub fn labels(&self) -> Vec<&str> {
        self.0.split('.').collect()
    }

    /// Whether the domain is valid at all.
    ///
    /// A valid domain name consists of one or more valid labels joined
    /// with dots. This does not imply the name is public or resolvable.
    pub fn is_valid(&self) -> bool {
        if self.0.is_empty() || self.0.len() > 253 {
            return false;
        }

        self.0.split('.').all(valid_label)
    }

    pub fn is_ip_v4(&self) -> bool {
        if !IP_V4.is_match(&self.0) {
            return false;
        }

        // The regex allows up to 999 per group
        self.labels()
            .iter()
            .all(|digits| digits.parse::<u32>().is_ok_and(|value| value <= 255))
    }

    pub fn is_private_ip_v4(&self) -> bool {
        if !self.is_ip_v4() {
            return false;
        }

        let digits: Vec<u32> = self
            .labels()
            .iter()
            .map(|part| part.parse().unwrap_or(0))
            .collect();

        if digits == [0, 0, 0, 0] {
            return true;
        }

        // 127.0.0.0/8 and 10.0.0.0/8
        if digits[0] == 127 || digits[0] == 10 {
            return true;
        }

        // 172.16.0.0/12
        if digits[0] == 172 && (16..=31).contains(&digits[1]) {
            return true;
        }

        // 192.168.0.0/16
        digits[0] == 192 && digits[1] == 168
    }

    /// A suffix of this domain with the given number of labels.
    ///
    /// For "a.b.c.com": depth 1 is "com", depth 2 is "c.com" and so on.
    /// Depths past the label count return the whole domain. IP addresses
    /// have no suffixes.
    pub fn suffix(&self, depth: usize) -> Option<String> {
        if self.is_ip_v4() {
            return None;
        }

        let labels = self.labels();
        if depth >= labels.len() {
            return Some(self.0.clone());
        }

        Some(labels[labels.len() - depth..].join("."))
    }

    /// Suffixes of this domain, shortest first.
    ///
    /// No suffixes are returned for IP addresses. `min_depth` and
    /// `max_depth` bound the number of labels included; the domain itself
    /// is dropped when `include_domain` is false.
    pub fn suffixes(
        &self,
        min_depth: Option<usize>,
        max_depth: Option<usize>,
        include_domain: bool,
    ) -> Vec<String> {
        if self.is_ip_v4() {
            return Vec::new();
        }

        let labels = self.labels();
        let mut suffixes = Vec::new();
        let mut suffix = String::new();

        for (pos, part) in labels.iter().rev().enumerate() {
            if max_depth.is_some_and(|max| pos >= max) {
                break;
            }

            if suffix.is_empty() {
                suffix = (*part).to_string();
            } else {
                suffix = format!("{part}.{suffix}");
            }

            if !include_domain && pos == labels.len() - 1 {
                break;
            }

            if min_depth.is_none_or(|min| pos + 1 >= min) {
                suffixes.push(suffix.clone());
            }
        }

        suffixes
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One label: 1-63 chars of [a-z0-9-] in either case, with no hyphen at
/// either end.
fn valid_label(label: &str) -> bool {
    if label.is_empty() || label.len() > 63 {
        return false;
    }
    if label.starts_with('-') || label.ends_with('-') {
        return false;
    }

    label
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'-')
}

/// Everything known about one domain, in wire format.
#[derive(Debug, Clone, Serialize)]
pub struct DomainReport {
    pub domain: String,
    pub meta: DomainMeta,
    pub sub_domains: Vec<String>,
    pub root_domain: String,
    pub suffix: SuffixReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct DomainMeta {
    pub is_valid: bool,
    pub is_public: bool,
    pub is_fully_qualified: bool,
    pub is_ip_v4: bool,
    pub is_private_ip_v4: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuffixReport {
    #[serde(rename = "type")]
    pub suffix_type: Option<SuffixType>,
    pub tld: Option<String>,
    pub public: Option<String>,
    pub icann: Option<String>,
}

/// The lookup tables needed to classify domains, bundled for injection.
#[derive(Debug, Clone, Default)]
pub struct DomainTables {
    pub public_suffix: PublicSuffixTable,
    pub top_level: TopLevelDomainTable,
}

impl DomainTables {
    pub fn new(public_suffix: PublicSuffixTable, top_level: TopLevelDomainTable) -> Self {
        DomainTables {
            public_suffix,
            top_level,
        }
    }

    /// The public suffix, ICANN or private. Often the same as the TLD.
    pub fn public_suffix(&self, domain: &Domain) -> Option<String> {
        if domain.is_ip_v4() {
            return None;
        }

        self.public_suffix.get_suffix(domain, false)
    }

    /// The ICANN registered suffix, excluding private company suffixes.
    pub fn icann_suffix(&self, domain: &Domain) -> Option<String> {
        if domain.is_ip_v4() {
            return None;
        }

        self.public_suffix.get_suffix(domain, true)
    }

    pub fn suffix_type(&self, domain: &Domain) -> Option<SuffixType> {
        let suffix = self.public_suffix(domain)?;

        self.public_suffix.suffix_type(&suffix)
    }

    /// The top level domain (if any). A bare TLD is its own TLD.
    pub fn tld(&self, domain: &Domain) -> Option<String> {
        if self.top_level.is_tld(domain.as_str()) {
            return Some(domain.as_str().to_string());
        }

        self.top_level.get_tld(domain.as_str())
    }

    /// Whether this is a fully qualified (public) domain name.
    ///
    /// IP addresses are not fully qualified as they have no top level
    /// domain.
    pub fn is_fully_qualified(&self, domain: &Domain) -> bool {
        if !domain.is_valid() {
            return false;
        }

        // A proper suffix which isn't the whole domain name
        match self.icann_suffix(domain) {
            Some(suffix) => domain.as_str() != suffix,
            None => false,
        }
    }

    /// Whether the domain is publicly reachable on the internet.
    pub fn is_public(&self, domain: &Domain) -> bool {
        if domain.is_ip_v4() {
            return !domain.is_private_ip_v4();
        }

        self.is_fully_qualified(domain)
    }

    /// Split a domain into sub-domain labels and a root domain.
    ///
    /// ```text
    /// a.b.c.co.uk -> (["a", "b"], "c.co.uk")
    /// ```
    ///
    /// IP addresses and bare suffixes come back whole with no sub-domains.
    pub fn split_domain(&self, domain: &Domain, icann_only: bool) -> (Vec<String>, String) {
        if domain.is_ip_v4() {
            return (Vec::new(), domain.as_str().to_string());
        }

        let suffix = match self.public_suffix.get_suffix(domain, icann_only) {
            Some(suffix) if suffix != domain.as_str() => suffix,
            _ => return (Vec::new(), domain.as_str().to_string()),
        };

        let head = &domain.as_str()[..domain.as_str().len() - suffix.len() - 1];
        let mut labels: Vec<String> = head.split('.').map(str::to_string).collect();
        let last = labels.pop().unwrap_or_default();

        (labels, format!("{last}.{suffix}"))
    }

    /// The root domain without any sub-domains.
    ///
    /// ```text
    /// www.google.com -> google.com
    /// a.b.c.github.io -> c.github.io
    /// ```
    pub fn root_domain(&self, domain: &Domain) -> String {
        self.split_domain(domain, false).1
    }

    /// Assemble everything we know about a domain.
    pub fn classify(&self, domain: &Domain) -> DomainReport {
        let (sub_domains, _) = self.split_domain(domain, false);

        DomainReport {
            domain: domain.as_str().to_string(),
            meta: DomainMeta {
                is_valid: domain.is_valid(),
                is_public: self.is_public(domain),
                is_fully_qualified: self.is_fully_qualified(domain),
                is_ip_v4: domain.is_ip_v4(),
                is_private_ip_v4: domain.is_private_ip_v4(),
            },
            sub_domains,
            root_domain: self.root_domain(domain),
            suffix: SuffixReport {
                suffix_type: self.suffix_type(domain),
                tld: self.tld(domain),
                public: self.public_suffix(domain),
                icann: self.icann_suffix(domain),
            },
        }
    }
}
