//! Suffix/prefix expression expansion.
//!
//! Turns one canonical URL into the set of host-suffix / path-prefix
//! variations to look up, as defined by
//! https://cloud.google.com/web-risk/docs/urls-hashing#suffixprefix_expressions

use once_cell::sync::Lazy;
use regex::Regex;

static IPV4: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}").unwrap());

/// Expand a canonical URL into variations for comparison.
///
/// Removes the scheme, progressively snips parts from the start of the
/// host and progressively simplifies the path. Host variations are the
/// outer loop so all paths for one host appear together.
pub fn expand(canonical_url: &str) -> Vec<String> {
    let (host, path, query) = light_split(canonical_url);

    let path_variants = vary_path(path, query);

    let mut variants = Vec::new();
    for host in vary_hostname(host) {
        for path in &path_variants {
            variants.push(format!("{host}{path}"));
        }
    }

    variants
}

/// Create the single least-simplified expansion of a canonical URL.
///
/// This is the form rules are registered under.
pub fn expand_single(canonical_url: &str) -> String {
    match canonical_url.find("://") {
        Some(pos) => canonical_url[pos + 3..].to_string(),
        None => canonical_url.to_string(),
    }
}

/// Pull (host, path, query) out of an already canonical URL. The path
/// excludes any `;params` section.
fn light_split(url: &str) -> (&str, &str, &str) {
    let rest = match url.find("://") {
        Some(pos) => &url[pos + 3..],
        None => url,
    };

    let host_end = rest.find(|c| c == '/' || c == '?').unwrap_or(rest.len());
    let (host, rest) = rest.split_at(host_end);

    let (path, query) = match rest.find('?') {
        Some(pos) => (&rest[..pos], &rest[pos + 1..]),
        None => (rest, ""),
    };

    let last_segment = path.rfind('/').map(|pos| pos + 1).unwrap_or(0);
    let path = match path[last_segment..].find(';') {
        Some(pos) => &path[..last_segment + pos],
        None => path,
    };

    (host, path, query)
}

fn vary_hostname(hostname: &str) -> Vec<String> {
    let mut variants = vec![hostname.to_string()];

    // Don't snip bits off an IP address thinking it's a domain name
    if IPV4.is_match(hostname) {
        return variants;
    }

    // Progressively snip labels from the left a maximum of 4 times,
    // starting from something with at most 5 labels even if the original
    // host has more
    let parts: Vec<&str> = hostname.split('.').collect();
    let start = parts.len().saturating_sub(5).max(1);
    for pos in start..parts.len().saturating_sub(1) {
        variants.push(parts[pos..].join("."));
    }

    variants
}

fn vary_path(path: &str, query: &str) -> Vec<String> {
    let mut variants = Vec::new();

    if !query.is_empty() {
        variants.push(format!("{path}?{query}"));
    }

    variants.push(path.to_string());

    // Build the path up from the start a maximum of 4 times
    let parts: Vec<&str> = path.trim_end_matches('/').split('/').collect();
    let max_parts = parts.len().min(5);
    for pos in 1..max_parts {
        variants.push(parts[..pos].join("/") + "/");
    }

    variants
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_host_and_path() {
        assert_eq!(
            expand("http://a.b.c/1/2.html?param=1"),
            vec![
                "a.b.c/1/2.html?param=1",
                "a.b.c/1/2.html",
                "a.b.c/",
                "a.b.c/1/",
                "b.c/1/2.html?param=1",
                "b.c/1/2.html",
                "b.c/",
                "b.c/1/",
            ]
        );
    }

    #[test]
    fn test_expand_deep_host_and_path() {
        assert_eq!(
            expand("http://a.b.c.d.e.f.g/1.html"),
            vec![
                "a.b.c.d.e.f.g/1.html",
                "a.b.c.d.e.f.g/",
                // Skips b.c.d.e.f.g as the list starts at 5 labels
                "c.d.e.f.g/1.html",
                "c.d.e.f.g/",
                "d.e.f.g/1.html",
                "d.e.f.g/",
                "e.f.g/1.html",
                "e.f.g/",
                "f.g/1.html",
                "f.g/",
            ]
        );
    }

    #[test]
    fn test_expand_long_path_is_capped() {
        assert_eq!(
            expand("http://1.2.3.4/1/2/3/4/5/6.html"),
            vec![
                "1.2.3.4/1/2/3/4/5/6.html",
                "1.2.3.4/",
                "1.2.3.4/1/",
                "1.2.3.4/1/2/",
                "1.2.3.4/1/2/3/",
            ]
        );
    }

    #[test]
    fn test_expand_does_not_snip_ip_addresses() {
        assert_eq!(expand("http://192.168.0.1/"), vec!["192.168.0.1/"]);
    }

    #[test]
    fn test_expand_bare_root() {
        assert_eq!(expand("http:///"), vec!["/"]);
    }

    #[test]
    fn test_expand_ignores_params() {
        assert_eq!(
            expand("http://a.com/path;params?query=1"),
            vec![
                "a.com/path?query=1",
                "a.com/path",
                "a.com/",
            ]
        );
    }

    #[test]
    fn test_expand_single() {
        assert_eq!(
            expand_single("http://a.b.c/1/2.html?param=1"),
            "a.b.c/1/2.html?param=1"
        );
        assert_eq!(
            expand_single("https://host.com/path;params?q=1"),
            "host.com/path;params?q=1"
        );
    }
}
