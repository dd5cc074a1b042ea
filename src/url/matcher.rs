/// Checks if a host matches an exclusion pattern
///
/// Patterns are either an exact host (`example.com`) or a wildcard
/// (`*.example.com`) that covers the bare host and every subdomain. Hosts
/// from the canonicalizer are already lowercase; patterns are compared
/// case-insensitively and a trailing root dot on the host is ignored.
///
/// # Examples
///
/// ```
/// use moebius::url::host_matches;
///
/// assert!(host_matches("example.com", "example.com"));
/// assert!(host_matches("*.example.com", "cdn.example.com"));
/// assert!(host_matches("*.example.com", "example.com"));
/// assert!(!host_matches("*.example.com", "badexample.com"));
/// ```
pub fn host_matches(pattern: &str, host: &str) -> bool {
    let pattern = pattern.trim().to_ascii_lowercase();
    let host = host.strip_suffix('.').unwrap_or(host);

    if pattern.is_empty() || host.is_empty() {
        return false;
    }

    match pattern.strip_prefix("*.") {
        Some(base) => {
            host == base
                || host
                    .strip_suffix(base)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        }
        None => host == pattern,
    }
}

/// Returns true if the host matches any of the patterns
pub fn host_matches_any<S: AsRef<str>>(patterns: &[S], host: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| host_matches(pattern.as_ref(), host))
}
