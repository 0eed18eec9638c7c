//! Trusted-origin allow-list.
//!
//! Entries are either an exact origin (`https://warpcast.com`) or a
//! subdomain pattern (`https://*.warpcast.com`). A subdomain pattern matches
//! strict subdomains only, on the same scheme and port; it never matches the
//! bare domain or a look-alike such as `https://evil-warpcast.com`.

use url::Url;

/// One allow-list entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OriginPattern {
    /// Serialized origin, e.g. `https://warpcast.com`.
    Exact(String),
    /// Any strict subdomain of `suffix`.
    Subdomain {
        scheme: String,
        suffix: String,
        port: Option<u16>,
    },
}

impl OriginPattern {
    /// Parse an allow-list entry.
    pub fn parse(entry: &str) -> Result<Self, String> {
        let entry = entry.trim();

        if let Some((scheme, rest)) = entry.split_once("://*.") {
            if rest.contains('*') {
                return Err(format!("'{}': only one leading wildcard label is allowed", entry));
            }
            let url = parse_origin_url(&format!("{}://{}", scheme, rest))?;
            let suffix = url
                .host_str()
                .ok_or_else(|| format!("'{}': missing host", entry))?
                .to_string();
            if !suffix.contains('.') {
                return Err(format!("'{}': wildcard suffix must contain a dot", entry));
            }
            return Ok(OriginPattern::Subdomain {
                scheme: url.scheme().to_string(),
                suffix,
                port: url.port_or_known_default(),
            });
        }

        if entry.contains('*') {
            return Err(format!(
                "'{}': wildcards are only allowed as a leading subdomain label",
                entry
            ));
        }

        let url = parse_origin_url(entry)?;
        Ok(OriginPattern::Exact(url.origin().ascii_serialization()))
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, OriginPattern::Subdomain { .. })
    }

    fn matches(&self, origin: &Url) -> bool {
        match self {
            OriginPattern::Exact(expected) => origin.origin().ascii_serialization() == *expected,
            OriginPattern::Subdomain { scheme, suffix, port } => {
                let Some(host) = origin.host_str() else {
                    return false;
                };
                origin.scheme() == scheme
                    && origin.port_or_known_default() == *port
                    && host.len() > suffix.len() + 1
                    && host.ends_with(suffix.as_str())
                    && host.as_bytes()[host.len() - suffix.len() - 1] == b'.'
            }
        }
    }
}

/// Parse a string that must be a bare http(s) origin.
fn parse_origin_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("'{}': {}", raw, e))?;
    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(format!("'{}': scheme must be http or https", raw));
    }
    if url.host_str().is_none() {
        return Err(format!("'{}': missing host", raw));
    }
    if url.path() != "/" || url.query().is_some() || url.fragment().is_some() {
        return Err(format!("'{}': an origin must not carry a path, query or fragment", raw));
    }
    if !url.username().is_empty() || url.password().is_some() {
        return Err(format!("'{}': an origin must not carry credentials", raw));
    }
    Ok(url)
}

/// Static allow-list of trusted origins.
#[derive(Debug, Clone, Default)]
pub struct OriginPolicy {
    patterns: Vec<OriginPattern>,
}

impl OriginPolicy {
    /// Build a policy from allow-list entries. Malformed entries are skipped
    /// with a warning; configs are validated before they get here.
    pub fn new<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut patterns = Vec::new();
        for entry in entries {
            match OriginPattern::parse(entry.as_ref()) {
                Ok(pattern) => patterns.push(pattern),
                Err(e) => tracing::warn!(error = %e, "Ignoring malformed origin pattern"),
            }
        }
        Self { patterns }
    }

    /// Whether a message from `origin` may be acted upon.
    ///
    /// `null`, opaque and malformed origins are never allowed.
    pub fn is_allowed(&self, origin: &str) -> bool {
        let Ok(url) = Url::parse(origin) else {
            return false;
        };
        if url.host_str().is_none() || origin.trim_end_matches('/') != url.origin().ascii_serialization() {
            return false;
        }
        self.patterns.iter().any(|p| p.matches(&url))
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
