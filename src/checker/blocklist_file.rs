//! A standalone blocklist file which URLs can be checked against.
//!
//! The file is kept up to date by an external sync job; we watch its
//! modification time and reload when it changes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use std::time::SystemTime;

use regex::Regex;

use crate::checker::block_rules::parse_blocklist;
use crate::models::Reason;
use crate::url::{canonical_split, MalformedUrl};

// Media-restricted consumers are fine with video, as far as we can tell
const PERMITTED: &[Reason] = &[Reason::MediaVideo];

#[derive(Default)]
struct State {
    last_modified: Option<SystemTime>,
    domains: HashMap<String, Reason>,
    patterns: Vec<(Regex, Reason)>,
}

pub struct BlocklistFile {
    path: PathBuf,
    state: RwLock<State>,
}

impl BlocklistFile {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let blocklist = BlocklistFile {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(State::default()),
        };

        tracing::debug!(path = %blocklist.path.display(), "Monitoring blocklist file");
        blocklist.refresh();

        blocklist
    }

    /// Test a URL and return the reasons it should be blocked (if any).
    pub fn check_url(&self, url: &str) -> Result<Vec<Reason>, MalformedUrl> {
        self.refresh();

        let domain = canonical_split(url)?.host;
        if domain.is_empty() {
            return Err(MalformedUrl(format!(
                "The URL '{url}' has no domain to check"
            )));
        }

        let state = match self.state.read() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut reasons = Vec::new();
        if let Some(reason) = state.domains.get(&domain) {
            reasons.push(*reason);
        }
        for (pattern, reason) in &state.patterns {
            if pattern.is_match(&domain) {
                reasons.push(*reason);
            }
        }

        Ok(reasons)
    }

    /// Reload the file if its modification time has changed.
    fn refresh(&self) {
        let Some(last_modified) = self.last_modified() else {
            return;
        };

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if state.last_modified == Some(last_modified) {
            return;
        }

        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    %err,
                    "Cannot read blocklist file"
                );
                return;
            }
        };

        tracing::debug!("Reloading blocklist file");

        let mut fresh = State {
            last_modified: Some(last_modified),
            ..State::default()
        };
        for (domain, reason) in parse_blocklist(&text) {
            add_domain(&mut fresh, &domain, reason);
        }

        *state = fresh;
    }

    fn last_modified(&self) -> Option<SystemTime> {
        match fs::metadata(&self.path) {
            Ok(meta) => meta.modified().ok(),
            Err(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    "Cannot find blocklist file"
                );
                None
            }
        }
    }
}

fn add_domain(state: &mut State, domain: &str, reason: Reason) {
    if PERMITTED.contains(&reason) {
        // Listed as blocked, but we can serve this type without incident
        return;
    }

    if domain.contains('*') {
        match wildcard_to_regex(domain) {
            Ok(pattern) => state.patterns.push((pattern, reason)),
            Err(err) => {
                tracing::warn!(domain, %err, "Cannot compile blocklist pattern");
            }
        }
    } else {
        state.domains.insert(domain.to_string(), reason);
    }
}

/// Convert a domain with '*' wildcards into an anchored regex.
fn wildcard_to_regex(domain: &str) -> Result<Regex, regex::Error> {
    let mut pattern = String::from("(?i)^");
    for c in domain.chars() {
        match c {
            '*' => pattern.push_str(".*"),
            '?' => pattern.push('.'),
            c => pattern.push_str(&regex::escape(&c.to_string())),
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
}
