//! Input validation utilities

use once_cell::sync::Lazy;
use regex::Regex;

/// Regex for validating hostnames (letters, digits, hyphens per label, no
/// leading/trailing hyphen)
static HOSTNAME_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(\.[a-zA-Z0-9]([a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$")
        .unwrap()
});

/// Regex for the characters a domain name may contain at all
static DOMAIN_CHARS_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-zA-Z0-9.-]+$").unwrap());

/// Validate a domain name as a hostname.
pub fn is_valid_domain(domain: &str) -> bool {
    !domain.is_empty() && domain.len() <= 253 && HOSTNAME_REGEX.is_match(domain)
}

/// Collect human-readable problems with a caller-supplied domain name.
///
/// An empty name short-circuits; otherwise every failed check contributes
/// its own message.
pub fn validate_domain_name(domain: &str) -> Vec<String> {
    let mut errors = Vec::new();

    if domain.is_empty() {
        errors.push("Domain name cannot be empty".to_string());
        return errors;
    }

    if !is_valid_domain(domain) {
        errors.push("Invalid domain format".to_string());
    }

    if domain.len() > 253 {
        errors.push("Domain name too long".to_string());
    }

    if !DOMAIN_CHARS_REGEX.is_match(domain) {
        errors.push("Domain contains invalid characters".to_string());
    }

    if domain.contains("..") {
        errors.push("Domain cannot contain consecutive dots".to_string());
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        errors.push("Domain cannot start or end with a dot".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_domain() {
        assert!(is_valid_domain("example.com"));
        assert!(is_valid_domain("blog.example.com"));
        assert!(is_valid_domain("xn--bcher-kva.example"));
        assert!(is_valid_domain("localhost"));
    }

    #[test]
    fn test_is_valid_domain_rejects_malformed() {
        assert!(!is_valid_domain(""));
        assert!(!is_valid_domain("-leading.example.com"));
        assert!(!is_valid_domain("trailing-.example.com"));
        assert!(!is_valid_domain("spaces in.example.com"));
        assert!(!is_valid_domain(&"a".repeat(254)));
    }

    #[test]
    fn test_validate_domain_name_empty_short_circuits() {
        assert_eq!(
            validate_domain_name(""),
            vec!["Domain name cannot be empty".to_string()]
        );
    }

    #[test]
    fn test_validate_domain_name_collects_problems() {
        let errors = validate_domain_name(".bad..name.");
        assert!(errors.contains(&"Invalid domain format".to_string()));
        assert!(errors.contains(&"Domain cannot contain consecutive dots".to_string()));
        assert!(errors.contains(&"Domain cannot start or end with a dot".to_string()));
    }

    #[test]
    fn test_validate_domain_name_clean() {
        assert!(validate_domain_name("shop.example.co.uk").is_empty());
    }
}
