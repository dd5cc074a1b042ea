use crate::{UrlError, UrlResult};
use std::fmt;
use std::str::FromStr;
use url::Url;

/// A URL decomposed into the components that make up the frontier dedup key
///
/// Absent query, fragment and params are represented by empty strings. An
/// absent `port` means the scheme's default port; an absent `host` means the
/// URL has no authority (e.g. `mailto:` or `data:` URLs).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UrlComponents {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    pub params: String,
    pub query: String,
    pub fragment: String,
}

impl UrlComponents {
    /// Decomposes an already-parsed URL
    pub fn from_url(url: &Url) -> Self {
        let (path, params) = if url.cannot_be_a_base() {
            (url.path().to_string(), String::new())
        } else {
            split_params(url.path())
        };

        Self {
            scheme: url.scheme().to_string(),
            host: match url.host_str() {
                Some(host) if !host.is_empty() => Some(host.to_string()),
                // `foo://` has an authority whose host is empty
                _ if url.has_authority() && url.scheme() != "file" => Some(String::new()),
                _ => None,
            },
            port: url.port(),
            path,
            params,
            query: url.query().unwrap_or_default().to_string(),
            fragment: url.fragment().unwrap_or_default().to_string(),
        }
    }

    /// Returns true if the URL carries an authority component
    pub fn has_authority(&self) -> bool {
        self.host.is_some()
    }

    /// Returns `host[:port]`, or None when there is no authority
    pub fn authority(&self) -> Option<String> {
        self.host.as_ref().map(|host| match self.port {
            Some(port) => format!("{}:{}", host, port),
            None => host.clone(),
        })
    }
}

impl fmt::Display for UrlComponents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&unparse(self))
    }
}

impl FromStr for UrlComponents {
    type Err = UrlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

/// Parses a raw URL string into its canonical components
///
/// The normalized form produced by the WHATWG parser is the canonical form:
/// scheme and host are lowercased, a default port is elided, dot segments are
/// removed and hierarchical URLs always get at least `/` as their path.
/// Percent escapes are kept exactly as given. User info is dropped.
///
/// # Arguments
///
/// * `raw` - The URL string to decompose
///
/// # Returns
///
/// * `Ok(UrlComponents)` - The canonical components
/// * `Err(UrlError::Malformed)` - The input is not an absolute URL
///
/// # Examples
///
/// ```
/// use moebius::url::parse;
///
/// let c = parse("HTTP://Example.COM:8042/over/there?name=ferret#nose").unwrap();
/// assert_eq!(c.scheme, "http");
/// assert_eq!(c.host.as_deref(), Some("example.com"));
/// assert_eq!(c.port, Some(8042));
/// assert_eq!(c.path, "/over/there");
/// assert_eq!(c.query, "name=ferret");
/// assert_eq!(c.fragment, "nose");
/// ```
pub fn parse(raw: &str) -> UrlResult<UrlComponents> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(UrlError::Malformed("empty URL".to_string()));
    }

    let url = Url::parse(raw).map_err(|e| UrlError::Malformed(format!("{}: {}", raw, e)))?;
    Ok(UrlComponents::from_url(&url))
}

/// Reconstitutes a URL string from its components
///
/// Empty params, query and fragment are emitted without their delimiters.
///
/// ```
/// use moebius::url::{parse, unparse};
///
/// let c = parse("foo://example.com:8042/over/there?name=ferret#nose").unwrap();
/// assert_eq!(unparse(&c), "foo://example.com:8042/over/there?name=ferret#nose");
/// ```
pub fn unparse(components: &UrlComponents) -> String {
    let mut out = String::with_capacity(
        components.scheme.len()
            + components.host.as_ref().map_or(0, String::len)
            + components.path.len()
            + components.params.len()
            + components.query.len()
            + components.fragment.len()
            + 16,
    );

    out.push_str(&components.scheme);
    out.push(':');

    match &components.host {
        Some(host) => {
            out.push_str("//");
            out.push_str(host);
            if let Some(port) = components.port {
                out.push(':');
                out.push_str(&port.to_string());
            }
        }
        // file URLs keep an empty authority
        None if components.scheme == "file" => out.push_str("//"),
        // without this a leading `//` would be read back as an authority
        None if components.path.starts_with("//") => out.push_str("/."),
        None => {}
    }

    out.push_str(&components.path);

    if !components.params.is_empty() {
        out.push(';');
        out.push_str(&components.params);
    }
    if !components.query.is_empty() {
        out.push('?');
        out.push_str(&components.query);
    }
    if !components.fragment.is_empty() {
        out.push('#');
        out.push_str(&components.fragment);
    }

    out
}

/// Resolves a possibly-relative link against a base URL
///
/// Returns the absolute URL string, or `UrlError::Malformed` if either the
/// base or the joined result cannot be parsed.
pub fn resolve(base: &str, href: &str) -> UrlResult<String> {
    let base = Url::parse(base).map_err(|e| UrlError::Malformed(format!("{}: {}", base, e)))?;
    base.join(href.trim())
        .map(|url| url.to_string())
        .map_err(|e| UrlError::Malformed(format!("{}: {}", href, e)))
}

/// Splits RFC 2396 `;params` off the last path segment
fn split_params(path: &str) -> (String, String) {
    let segment_start = path.rfind('/').map(|i| i + 1).unwrap_or(0);

    match path[segment_start..].find(';') {
        Some(offset) => {
            let split = segment_start + offset;
            (path[..split].to_string(), path[split + 1..].to_string())
        }
        None => (path.to_string(), String::new()),
    }
}
