//! URL canonicalization.
//!
//! Converts an arbitrary, possibly badly mangled URL into a single exact
//! form suitable for byte-for-byte comparison. The rules follow the Google
//! Web Risk canonicalization spec, with a few extensions for URLs browsers
//! will open despite being malformed.

use std::net::Ipv4Addr;

use once_cell::sync::Lazy;
use regex::Regex;

use super::MalformedUrl;

static BANNED_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new("[\x09\x0d\x0a]").unwrap());
static SCHEME_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-Za-z]+):/+").unwrap());
static CONSECUTIVE_DOTS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\.+").unwrap());
static PORT: Lazy<Regex> = Lazy::new(|| Regex::new(r":\d+$").unwrap());
static CONSECUTIVE_SLASHES: Lazy<Regex> = Lazy::new(|| Regex::new("//+").unwrap());

/// The canonical parts of a URL. The fragment is always dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlParts {
    pub scheme: String,
    pub host: String,
    pub path: String,
    pub params: String,
    pub query: String,
}

impl UrlParts {
    /// Join the parts back into a URL string.
    pub fn unparse(&self) -> String {
        let mut url = format!("{}://{}{}", self.scheme, self.host, self.path);

        if !self.params.is_empty() {
            url.push(';');
            url.push_str(&self.params);
        }
        if !self.query.is_empty() {
            url.push('?');
            url.push_str(&self.query);
        }

        url
    }
}

/// Convert a URL to a canonical form for comparison.
///
/// This may "invent" an http scheme when the input has none.
pub fn canonicalize(url: &str) -> Result<String, MalformedUrl> {
    let parts = canonical_split(url)?;
    let mut clean_url = parts.unparse();

    // Splitting strips a trailing '?' when the query string is empty
    if url.ends_with('?') && !clean_url.ends_with('?') {
        clean_url.push('?');
    }

    Ok(clean_url)
}

/// Split a URL into canonical parts.
pub fn canonical_split(url: &str) -> Result<UrlParts, MalformedUrl> {
    let (scheme, host, path, params, query) = pre_process_url(url)?;

    let host = canonicalize_host(&host);
    let path = canonicalize_path(&path);

    // Percent-escape all characters that are <= ASCII 32, >= 127, '#' or
    // '%', using uppercase hex
    Ok(UrlParts {
        scheme,
        host: partial_quote(&host),
        path: partial_quote(&path),
        params,
        query: partial_quote(&query),
    })
}

type RawParts = (String, String, String, String, String);

fn pre_process_url(url: &str) -> Result<RawParts, MalformedUrl> {
    if let Some(parts) = pre_process_attempt(url)? {
        return Ok(parts);
    }

    // Without a scheme the domain is often taken to be the path. Prepend a
    // fake scheme and try again.
    pre_process_attempt(&format!("http://{url}"))?
        .ok_or_else(|| MalformedUrl(format!("no usable host in '{url}'")))
}

fn pre_process_attempt(url: &str) -> Result<Option<RawParts>, MalformedUrl> {
    let clean_url = url.trim();

    // Remove tab (0x09), CR (0x0d) and LF (0x0a) characters, but not the
    // escape sequences for them like %0a
    let clean_url = BANNED_CHARS.replace_all(clean_url, "");

    // Chrome will open URLs like http:/example.com or http:///example.com,
    // so convert them to always have exactly two slashes
    let clean_url = SCHEME_PREFIX.replace(&clean_url, "$1://");

    let (scheme, host, path, params, query) = split_url(&clean_url)?;

    if scheme.is_empty() && host.is_empty() {
        return Ok(None);
    }

    let scheme = if scheme.is_empty() {
        // Looks like we have a host but no scheme, so make one up
        "http".to_string()
    } else {
        scheme
    };

    // Repeatedly remove percent-escapes until none remain (handles double
    // and triple encoded URLs)
    Ok(Some((
        scheme,
        repeated_unquote(&host),
        repeated_unquote(&path),
        params,
        repeated_unquote(&query),
    )))
}

/// Split a URL into (scheme, host, path, params, query), dropping any
/// fragment.
fn split_url(url: &str) -> Result<RawParts, MalformedUrl> {
    // The fragment goes first and never comes back
    let url = match url.find('#') {
        Some(pos) => &url[..pos],
        None => url,
    };

    let mut scheme = String::new();
    let mut rest = url;

    if let Some(colon) = url.find(':') {
        let candidate = &url[..colon];
        let starts_with_letter = candidate
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic());

        if starts_with_letter
            && candidate
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            scheme = candidate.to_ascii_lowercase();
            rest = &url[colon + 1..];
        }
    }

    let mut host = String::new();
    if let Some(after) = rest.strip_prefix("//") {
        let end = after
            .find(|c| c == '/' || c == '?')
            .unwrap_or(after.len());
        host = after[..end].to_string();
        rest = &after[end..];

        // Mismatched brackets mean the host can never be decoded
        if host.contains('[') != host.contains(']') {
            return Err(MalformedUrl(format!("invalid bracket in host: '{host}'")));
        }
    }

    let (path, query) = match rest.find('?') {
        Some(pos) => (&rest[..pos], rest[pos + 1..].to_string()),
        None => (rest, String::new()),
    };

    let (path, params) = split_params(path);

    Ok((scheme, host, path, params, query))
}

/// Split `;params` off the last path segment.
fn split_params(path: &str) -> (String, String) {
    let from = path.rfind('/').map(|pos| pos + 1).unwrap_or(0);

    match path[from..].find(';') {
        Some(pos) => {
            let split = from + pos;
            (path[..split].to_string(), path[split + 1..].to_string())
        }
        None => (path.to_string(), String::new()),
    }
}

fn canonicalize_host(host: &str) -> String {
    // Internationalized domain names get the ASCII punycode treatment. If
    // that fails we carry on with what we were given.
    let mut host = host.to_string();
    if !host.is_ascii() {
        if let Ok(ascii) = idna::domain_to_ascii(&host) {
            host = ascii;
        }
    }

    // Remove leading and trailing dots, then collapse runs of dots
    let host = host.trim_matches('.');
    let host = CONSECUTIVE_DOTS.replace_all(host, ".");

    // Not in the Web Risk text, but in its test cases
    let host = PORT.replace(&host, "");

    // Hostnames which are really IP addresses in some encoding become four
    // dot-separated decimal octets
    let host = match decode_ipv4(&host) {
        Some(ip) => ip,
        None => host.into_owned(),
    };

    host.to_lowercase()
}

fn canonicalize_path(path: &str) -> String {
    let mut path = path.to_string();

    // Resolve "/./" and "/../" sequences, keeping a trailing slash
    if !path.is_empty() {
        let trailing = if path.ends_with('/') { "/" } else { "" };
        path = resolve_dot_segments(&path) + trailing;
    }

    // Collapse runs of slashes to a single slash
    let path = CONSECUTIVE_SLASHES.replace_all(&path, "/");

    if path.is_empty() {
        "/".to_string()
    } else {
        path.into_owned()
    }
}

/// Resolve "." and ".." path segments, POSIX normpath style. Never returns
/// a trailing slash except for the root path.
fn resolve_dot_segments(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut stack: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if stack.last().is_some_and(|last| *last != "..") {
                    stack.pop();
                } else if !absolute {
                    stack.push("..");
                }
                // ".." at the root of an absolute path just vanishes
            }
            _ => stack.push(segment),
        }
    }

    let joined = stack.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Try to spot hostnames that are really encoded IPv4 addresses.
fn decode_ipv4(host: &str) -> Option<String> {
    // Plain dotted-decimal wins over everything else
    if let Ok(ip) = host.parse::<Ipv4Addr>() {
        return Some(ip.to_string());
    }

    // inet_aton-style: 1 to 4 dot separated decimal/octal/hex parts, the
    // last filling all remaining bytes
    if let Some(ip) = decode_inet_aton(host) {
        return Some(ip.to_string());
    }

    if let Some(ip) = decode_dotted_binary(host) {
        return Some(ip);
    }

    decode_dotted_hex(host)
}

fn decode_inet_aton(host: &str) -> Option<Ipv4Addr> {
    if host.is_empty() {
        return None;
    }

    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() > 4 {
        return None;
    }

    let mut octets: Vec<u8> = Vec::with_capacity(4);
    for (pos, part) in parts.iter().enumerate() {
        let value = parse_c_integer(part)?;

        if pos == parts.len() - 1 {
            let remaining = 4 - octets.len();
            if value > (1u64 << (8 * remaining)) - 1 {
                return None;
            }
            for shift in (0..remaining).rev() {
                octets.push(((value >> (8 * shift)) & 0xff) as u8);
            }
        } else {
            if value > 255 {
                return None;
            }
            octets.push(value as u8);
        }
    }

    Some(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
}

/// Parse a C-style numeric literal: 0x hex, leading-zero octal, or decimal.
fn parse_c_integer(part: &str) -> Option<u64> {
    if part.is_empty() {
        return None;
    }

    if let Some(hex) = part.strip_prefix("0x").or_else(|| part.strip_prefix("0X")) {
        if hex.is_empty() {
            return None;
        }
        u64::from_str_radix(hex, 16).ok()
    } else if part.len() > 1 && part.starts_with('0') {
        u64::from_str_radix(part, 8).ok()
    } else if part.chars().all(|c| c.is_ascii_digit()) {
        part.parse::<u64>().ok()
    } else {
        None
    }
}

fn decode_dotted_binary(host: &str) -> Option<String> {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() != 4 {
        return None;
    }

    let mut octets: Vec<u8> = Vec::with_capacity(4);
    for part in parts {
        if part.is_empty() || !part.bytes().all(|b| b == b'0' || b == b'1') {
            return None;
        }
        let value = u32::from_str_radix(part, 2).ok()?;
        if value > 255 {
            return None;
        }
        octets.push(value as u8);
    }

    Some(format!("{}.{}.{}.{}", octets[0], octets[1], octets[2], octets[3]))
}

/// Dotted hex without the 0x prefix, read as one 32-bit hex value.
///
/// Requires one byte per part and at least one hex letter, so plain
/// numeric hostnames never end up here.
fn decode_dotted_hex(host: &str) -> Option<String> {
    let parts: Vec<&str> = host.split('.').collect();
    if parts.len() != 4 {
        return None;
    }
    if !parts
        .iter()
        .all(|part| part.len() == 2 && part.bytes().all(|b| b.is_ascii_hexdigit()))
    {
        return None;
    }
    if !host.bytes().any(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let value = u32::from_str_radix(&parts.concat(), 16).ok()?;
    Some(Ipv4Addr::from(value).to_string())
}

/// Decode percent-escapes until the string stops changing.
fn repeated_unquote(string: &str) -> String {
    let mut string = string.to_string();

    loop {
        let decoded = unquote(&string);
        if decoded == string {
            return decoded;
        }
        string = decoded;
    }
}

/// Decode one round of percent-escapes. Invalid escapes pass through and
/// invalid UTF-8 decodes lossily.
fn unquote(string: &str) -> String {
    let bytes = string.as_bytes();
    let mut out: Vec<u8> = Vec::with_capacity(bytes.len());
    let mut pos = 0;

    while pos < bytes.len() {
        if bytes[pos] == b'%' && pos + 2 < bytes.len() {
            let high = (bytes[pos + 1] as char).to_digit(16);
            let low = (bytes[pos + 2] as char).to_digit(16);

            if let (Some(high), Some(low)) = (high, low) {
                out.push((high * 16 + low) as u8);
                pos += 3;
                continue;
            }
        }

        out.push(bytes[pos]);
        pos += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

/// Percent-escape every char that is <= ASCII 32, >= 127, '#' or '%',
/// using uppercase hex of the char's code point.
fn partial_quote(string: &str) -> String {
    let mut out = String::with_capacity(string.len());

    for c in string.chars() {
        let code = c as u32;
        if code <= 32 || code >= 127 || c == '#' || c == '%' {
            out.push_str(&format!("%{code:02X}"));
        } else {
            out.push(c);
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    // Cases from the Web Risk canonicalization spec plus our own additions
    // for URLs browsers will open anyway
    const CASES: &[(&str, &str)] = &[
        ("http://host/%25%32%35", "http://host/%25"),
        ("http://host/%25%32%35%25%32%35", "http://host/%25%25"),
        ("http://host/%2525252525252525", "http://host/%25"),
        ("http://host/asdf%25%32%35asd", "http://host/asdf%25asd"),
        ("http://host/%%%25%32%35asd%%", "http://host/%25%25%25asd%25%25"),
        ("http://www.google.com/", "http://www.google.com/"),
        (
            "http://%31%36%38%2e%31%38%38%2e%39%39%2e%32%36/%2E%73%65%63%75%72%65/%77%77%77%2E%65%62%61%79%2E%63%6F%6D/",
            "http://168.188.99.26/.secure/www.ebay.com/",
        ),
        (
            "http://195.127.0.11/uploads/%20%20%20%20/.verify/.eBaysecure=updateuserdataxplimnbqmn-xplmvalidateinfoswqpcmlx=hgplmcx/",
            "http://195.127.0.11/uploads/%20%20%20%20/.verify/.eBaysecure=updateuserdataxplimnbqmn-xplmvalidateinfoswqpcmlx=hgplmcx/",
        ),
        (
            "http://host%23.com/%257Ea%2521b%2540c%2523d%2524e%25f%255E00%252611%252A22%252833%252944_55%252B",
            "http://host%23.com/~a!b@c%23d$e%25f^00&11*22(33)44_55+",
        ),
        ("http://www.google.com/blah/..", "http://www.google.com/"),
        ("www.google.com/", "http://www.google.com/"),
        ("www.google.com", "http://www.google.com/"),
        ("http://www.evil.com/blah#frag", "http://www.evil.com/blah"),
        ("http://www.GOOgle.com/", "http://www.google.com/"),
        ("http://www.google.com.../", "http://www.google.com/"),
        (
            "http://www.google.com/foo\tbar\rbaz\n2",
            "http://www.google.com/foobarbaz2",
        ),
        ("http://www.google.com/q?", "http://www.google.com/q?"),
        ("http://www.google.com/q?r?", "http://www.google.com/q?r?"),
        ("http://www.google.com/q?r?s", "http://www.google.com/q?r?s"),
        ("http://evil.com/foo#bar#baz", "http://evil.com/foo"),
        ("http://evil.com/foo),", "http://evil.com/foo),"),
        ("http://evil.com/foo?bar),", "http://evil.com/foo?bar),"),
        ("http://\u{01}\u{80}.com/", "http://%01%80.com/"),
        ("http://notrailingslash.com", "http://notrailingslash.com/"),
        ("http://www.gotaport.com:1234/", "http://www.gotaport.com/"),
        ("  http://www.google.com/  ", "http://www.google.com/"),
        ("http:// leadingspace.com/", "http://%20leadingspace.com/"),
        ("http://%20leadingspace.com/", "http://%20leadingspace.com/"),
        ("%20leadingspace.com/", "http://%20leadingspace.com/"),
        ("https://www.securesite.com/", "https://www.securesite.com/"),
        ("http://host.com/ab%23cd", "http://host.com/ab%23cd"),
        (
            "http://host.com//twoslashes?more//slashes",
            "http://host.com/twoslashes?more//slashes",
        ),
        // Many flavours of IP address
        ("http://3279880203/blah", "http://195.127.0.11/blah"),
        ("http://0303.0177.0000.0013/blah", "http://195.127.0.11/blah"),
        ("http://030337600013/blah", "http://195.127.0.11/blah"),
        ("http://0xc3.0x7f.0x00.0x0b/blah", "http://195.127.0.11/blah"),
        ("http://0xc37f000b/blah", "http://195.127.0.11/blah"),
        ("http://192.168.2.1/uploads/", "http://192.168.2.1/uploads/"),
        ("http://0x7F.0.0.1/uploads/", "http://127.0.0.1/uploads/"),
        ("http://0x7F.0.0.0x1/uploads/", "http://127.0.0.1/uploads/"),
        ("http://10.0.0.1/uploads/", "http://10.0.0.1/uploads/"),
        // Leading 0 means octal
        ("http://022.101.31.153/uploads/", "http://18.101.31.153/uploads/"),
        // Punycode
        ("http://ümlaut.com", "http://xn--mlaut-jva.com/"),
        // Unspecified behaviour around badly formatted URLs. If Chrome will
        // open it, we should check it
        ("/example.com", "http://example.com/"),
        ("//example.com", "http://example.com/"),
        ("///example.com", "http://example.com/"),
        ("http:/example.com", "http://example.com/"),
        ("http:///example.com", "http://example.com/"),
        ("http:/", "http:///"),
        ("http://", "http:///"),
        ("/", "http:///"),
        ("//", "http:///"),
        (
            "https://www.tumblr.com/search/\u{2018}question?\u{2019}/post_page/2",
            "https://www.tumblr.com/search/%2018question?%2019/post_page/2",
        ),
        (
            "https%3A%2F%2Fwww.google.com",
            "http://https://www.google.com/",
        ),
    ];

    #[test]
    fn test_canonicalize() {
        for (url, expected) in CASES {
            let result = canonicalize(url).unwrap();
            assert_eq!(&result, expected, "canonicalize({url:?})");
        }
    }

    #[test]
    fn test_canonicalize_is_stable() {
        // Not every output is a fixpoint (percent-escapes of invalid UTF-8
        // decode lossily on a second pass), but typical results are
        for canonical in [
            "http://www.google.com/",
            "https://www.securesite.com/",
            "http://195.127.0.11/blah",
            "http://host%23.com/ab%23cd",
            "http://xn--mlaut-jva.com/",
            "http://www.google.com/q?r?s",
            "http:///",
            "http://168.188.99.26/.secure/www.ebay.com/",
        ] {
            let result = canonicalize(canonical).unwrap();
            assert_eq!(&result, canonical, "re-canonicalize({canonical:?})");
        }
    }

    #[test]
    fn test_canonical_split() {
        let parts = canonical_split("http:/example.com/path/abc;path_param?a=b#foo").unwrap();

        assert_eq!(
            parts,
            UrlParts {
                scheme: "http".to_string(),
                host: "example.com".to_string(),
                path: "/path/abc".to_string(),
                params: "path_param".to_string(),
                query: "a=b".to_string(),
            }
        );
    }

    #[test]
    fn test_canonicalize_invalid_bracket_host() {
        assert!(canonicalize("http://example.com]").is_err());
        assert!(canonicalize("http://[example.com").is_err());
    }

    #[test]
    fn test_resolve_dot_segments() {
        assert_eq!(resolve_dot_segments("/a/b/../c"), "/a/c");
        assert_eq!(resolve_dot_segments("/a/./b"), "/a/b");
        assert_eq!(resolve_dot_segments("/blah/.."), "/");
        assert_eq!(resolve_dot_segments("/../a"), "/a");
        assert_eq!(resolve_dot_segments("/"), "/");
    }

    #[test]
    fn test_decode_ipv4_rejects_hostnames() {
        assert_eq!(decode_ipv4("example.com"), None);
        assert_eq!(decode_ipv4("1.2.3.4.5"), None);
        assert_eq!(decode_ipv4(""), None);
        assert_eq!(decode_ipv4("256.1.1.1"), None);
    }

    #[test]
    fn test_decode_ipv4_binary() {
        assert_eq!(
            decode_ipv4("11000011.01111111.00000000.00001011"),
            Some("195.127.0.11".to_string())
        );
    }

    #[test]
    fn test_decode_ipv4_bare_dotted_hex() {
        assert_eq!(decode_ipv4("c3.7f.00.0b"), Some("195.127.0.11".to_string()));
    }
}
