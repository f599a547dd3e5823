//! Subdomain grammar: `^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$`.

/// True exactly when `s` matches the subdomain grammar: lowercase
/// alphanumerics and hyphens, 1-63 characters, not starting or ending
/// with a hyphen.
pub fn is_valid_subdomain(s: &str) -> bool {
    let bytes = s.as_bytes();
    if bytes.is_empty() || bytes.len() > 63 {
        return false;
    }
    if !is_alnum(bytes[0]) {
        return false;
    }
    if bytes.len() == 1 {
        return true;
    }
    if !is_alnum(bytes[bytes.len() - 1]) {
        return false;
    }
    bytes[1..bytes.len() - 1]
        .iter()
        .all(|&b| is_alnum(b) || b == b'-')
}

fn is_alnum(b: u8) -> bool {
    b.is_ascii_lowercase() || b.is_ascii_digit()
}

/// Derive the subdomain label from a `Host` header value: the first
/// dot-separated component, case-normalized.
pub fn subdomain_from_host(host: &str) -> Option<String> {
    let label = host.split('.').next()?.to_ascii_lowercase();
    if is_valid_subdomain(&label) {
        Some(label)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_simple_labels() {
        assert!(is_valid_subdomain("a"));
        assert!(is_valid_subdomain("abc"));
        assert!(is_valid_subdomain("abc123"));
        assert!(is_valid_subdomain("a-b-c"));
        assert!(is_valid_subdomain(&"a".repeat(63)));
    }

    #[test]
    fn rejects_bad_labels() {
        assert!(!is_valid_subdomain(""));
        assert!(!is_valid_subdomain(&"a".repeat(64)));
        assert!(!is_valid_subdomain("-abc"));
        assert!(!is_valid_subdomain("abc-"));
        assert!(!is_valid_subdomain("ABC"));
        assert!(!is_valid_subdomain("abc_def"));
        assert!(!is_valid_subdomain("abc.def"));
        assert!(!is_valid_subdomain(" "));
    }

    #[test]
    fn host_header_extraction() {
        assert_eq!(
            subdomain_from_host("roundtrip.localhost"),
            Some("roundtrip".to_string())
        );
        assert_eq!(
            subdomain_from_host("MyApp.example.com"),
            Some("myapp".to_string())
        );
        assert_eq!(subdomain_from_host(""), None);
        assert_eq!(subdomain_from_host(".example.com"), None);
    }
}
