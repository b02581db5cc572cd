//! Hosted domain model
//!
//! A domain record as returned by the WHM account listing, enriched with the
//! dependent-name lists and the optional SSL certificate. Classification and
//! status are derived on access, never stored.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::SslCertificate;

/// Domain classification for listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DomainType {
    Main,
    Subdomain,
    Addon,
}

impl DomainType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainType::Main => "main",
            DomainType::Subdomain => "subdomain",
            DomainType::Addon => "addon",
        }
    }
}

/// Aggregate domain status, suspension first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DomainStatus {
    Active,
    Suspended,
    SslActive,
    SslExpired,
}

impl DomainStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DomainStatus::Active => "active",
            DomainStatus::Suspended => "suspended",
            DomainStatus::SslActive => "ssl_active",
            DomainStatus::SslExpired => "ssl_expired",
        }
    }

    /// Display color used by listings.
    pub fn color(&self) -> &'static str {
        match self {
            DomainStatus::Suspended => "red",
            DomainStatus::SslExpired => "orange",
            DomainStatus::SslActive => "green",
            DomainStatus::Active => "blue",
        }
    }
}

/// A subdomain of a hosted domain.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Subdomain {
    pub domain: String,
    pub root_domain: String,
    #[serde(default)]
    pub base_dir: String,
    #[serde(default)]
    pub status: i64,
}

/// An addon domain owned by an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AddonDomain {
    pub domain: String,
    #[serde(default)]
    pub base_dir: String,
    #[serde(default)]
    pub status: i64,
}

/// A parked (aliased) domain owned by an account.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParkedDomain {
    pub domain: String,
    #[serde(default)]
    pub base_dir: String,
    #[serde(default)]
    pub status: i64,
}

/// A hosted domain and its account context.
///
/// Identity is the `(domain, user)` pair; equality compares only those two
/// fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Domain {
    pub domain: String,
    pub user: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub owner: String,
    #[serde(default = "default_plan")]
    pub plan: String,
    #[serde(default)]
    pub suspended: bool,
    #[serde(default)]
    pub setup_date: Option<String>,
    #[serde(default)]
    pub document_root: Option<String>,
    #[serde(default)]
    pub php_version: Option<String>,
    #[serde(default)]
    pub ssl_certificate: Option<SslCertificate>,
    #[serde(default)]
    pub subdomains: Vec<Subdomain>,
    #[serde(default)]
    pub addon_domains: Vec<AddonDomain>,
    #[serde(default)]
    pub parked_domains: Vec<ParkedDomain>,
}

fn default_plan() -> String {
    "default".to_string()
}

impl PartialEq for Domain {
    fn eq(&self, other: &Self) -> bool {
        self.domain == other.domain && self.user == other.user
    }
}

impl Eq for Domain {}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.domain)
    }
}

impl Domain {
    /// Build a domain record from a WHM `listaccts` account entry.
    pub fn from_account(account: &serde_json::Value) -> Self {
        Self {
            domain: json_str(account, "domain"),
            user: json_str(account, "user"),
            ip: json_str(account, "ip"),
            owner: json_str(account, "owner"),
            plan: match account.get("plan").and_then(serde_json::Value::as_str) {
                Some(plan) if !plan.is_empty() => plan.to_string(),
                _ => default_plan(),
            },
            suspended: json_flag(account, "suspended"),
            setup_date: account
                .get("startdate")
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            ..Default::default()
        }
    }

    /// A main domain has at most one dot: `example.com` is main,
    /// `www.example.com` is not.
    pub fn is_main_domain(&self) -> bool {
        !self.domain.contains('.') || self.domain.split('.').count() == 2
    }

    /// Number of labels below the registrable pair, never negative.
    pub fn subdomain_level(&self) -> usize {
        self.domain.split('.').count().saturating_sub(2)
    }

    /// Classify the domain. The main-domain check wins: a two-label addon
    /// domain still classifies as main here.
    pub fn domain_type(&self) -> DomainType {
        if self.is_main_domain() {
            DomainType::Main
        } else if self.subdomain_level() > 0 {
            DomainType::Subdomain
        } else {
            DomainType::Addon
        }
    }

    /// A certificate is attached and has not expired. Expiry is the only
    /// gate here; full validity is [`Domain::is_ssl_valid`].
    pub fn has_ssl(&self) -> bool {
        matches!(&self.ssl_certificate, Some(cert) if !cert.is_expired())
    }

    /// [`Domain::has_ssl`] plus the certificate's own validity check.
    pub fn is_ssl_valid(&self) -> bool {
        self.has_ssl()
            && self
                .ssl_certificate
                .as_ref()
                .is_some_and(SslCertificate::is_valid)
    }

    /// Signed days until the certificate expires, if one is attached.
    pub fn ssl_expires_in_days(&self) -> Option<i64> {
        self.ssl_certificate
            .as_ref()
            .and_then(SslCertificate::days_until_expiration)
    }

    /// Whether an attached certificate has expired.
    pub fn is_ssl_expired(&self) -> bool {
        matches!(&self.ssl_certificate, Some(cert) if cert.is_expired())
    }

    /// Aggregate status: suspension outranks certificate state.
    pub fn status(&self) -> DomainStatus {
        if self.suspended {
            DomainStatus::Suspended
        } else if self.is_ssl_expired() {
            DomainStatus::SslExpired
        } else if self.has_ssl() {
            DomainStatus::SslActive
        } else {
            DomainStatus::Active
        }
    }

    pub fn home_directory(&self) -> String {
        format!("/home/{}", self.user)
    }

    pub fn public_html_path(&self) -> String {
        format!("{}/public_html", self.home_directory())
    }

    /// The stored document root, or the conventional `public_html` path.
    pub fn full_document_root(&self) -> String {
        self.document_root
            .clone()
            .unwrap_or_else(|| self.public_html_path())
    }

    pub fn has_subdomains(&self) -> bool {
        !self.subdomains.is_empty()
    }

    pub fn has_addon_domains(&self) -> bool {
        !self.addon_domains.is_empty()
    }

    pub fn has_parked_domains(&self) -> bool {
        !self.parked_domains.is_empty()
    }

    /// The domain itself plus all dependent names.
    pub fn total_domains(&self) -> usize {
        1 + self.subdomains.len() + self.addon_domains.len() + self.parked_domains.len()
    }

    /// Check the record for missing or malformed identity fields.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.domain.is_empty() {
            errors.push("Domain name is required".to_string());
        } else if !crate::utils::validation::is_valid_domain(&self.domain) {
            errors.push("Invalid domain format".to_string());
        }

        if self.user.is_empty() {
            errors.push("User is required".to_string());
        }

        if self.ip.is_empty() {
            errors.push("IP address is required".to_string());
        } else if self.ip.parse::<std::net::IpAddr>().is_err() {
            errors.push("Invalid IP address format".to_string());
        }

        errors
    }
}

fn json_str(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn json_flag(value: &serde_json::Value, key: &str) -> bool {
    match value.get(key) {
        Some(v) => v.as_i64() == Some(1) || v.as_bool() == Some(true) || v.as_str() == Some("1"),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn named(domain: &str) -> Domain {
        Domain {
            domain: domain.to_string(),
            user: "acme".to_string(),
            ..Default::default()
        }
    }

    fn cert_expiring_in(days: i64) -> SslCertificate {
        SslCertificate {
            domain: "example.com".to_string(),
            certificate: "CERT".to_string(),
            private_key: "KEY".to_string(),
            expires_on: Some(Utc::now() + Duration::days(days)),
            ..Default::default()
        }
    }

    #[test]
    fn test_main_domain_classification() {
        let main = named("example.com");
        assert!(main.is_main_domain());
        assert_eq!(main.subdomain_level(), 0);
        assert_eq!(main.domain_type(), DomainType::Main);

        let bare = named("localhost");
        assert!(bare.is_main_domain());
        assert_eq!(bare.domain_type(), DomainType::Main);
    }

    #[test]
    fn test_subdomain_classification() {
        let sub = named("blog.example.com");
        assert!(!sub.is_main_domain());
        assert_eq!(sub.subdomain_level(), 1);
        assert_eq!(sub.domain_type(), DomainType::Subdomain);

        let deep = named("a.b.example.com");
        assert_eq!(deep.subdomain_level(), 2);
        assert_eq!(deep.domain_type(), DomainType::Subdomain);
    }

    #[test]
    fn test_status_priority() {
        let mut domain = named("example.com");
        assert_eq!(domain.status(), DomainStatus::Active);

        domain.ssl_certificate = Some(cert_expiring_in(90));
        assert_eq!(domain.status(), DomainStatus::SslActive);

        domain.ssl_certificate = Some(cert_expiring_in(-3));
        assert_eq!(domain.status(), DomainStatus::SslExpired);

        // Suspension outranks everything.
        domain.suspended = true;
        assert_eq!(domain.status(), DomainStatus::Suspended);
    }

    #[test]
    fn test_has_ssl_gates_on_expiry_only() {
        let mut domain = named("example.com");
        assert!(!domain.has_ssl());

        let mut self_signed = cert_expiring_in(90);
        self_signed.is_self_signed = true;
        domain.ssl_certificate = Some(self_signed);

        // Not expired, so has_ssl holds even though the cert is not valid.
        assert!(domain.has_ssl());
        assert!(!domain.is_ssl_valid());
    }

    #[test]
    fn test_equality_is_domain_and_user() {
        let mut a = named("example.com");
        let mut b = named("example.com");
        b.ip = "203.0.113.9".to_string();
        b.plan = "premium".to_string();
        assert_eq!(a, b);

        a.user = "other".to_string();
        assert_ne!(a, b);
    }

    #[test]
    fn test_document_root_fallback() {
        let mut domain = named("example.com");
        assert_eq!(domain.full_document_root(), "/home/acme/public_html");

        domain.document_root = Some("/srv/www/example".to_string());
        assert_eq!(domain.full_document_root(), "/srv/www/example");
    }

    #[test]
    fn test_total_domains_counts_dependents() {
        let mut domain = named("example.com");
        domain.subdomains.push(Subdomain {
            domain: "blog.example.com".to_string(),
            root_domain: "example.com".to_string(),
            ..Default::default()
        });
        domain.parked_domains.push(ParkedDomain {
            domain: "example.net".to_string(),
            ..Default::default()
        });
        assert_eq!(domain.total_domains(), 3);
        assert!(domain.has_subdomains());
        assert!(!domain.has_addon_domains());
    }

    #[test]
    fn test_from_account_payload() {
        let payload = serde_json::json!({
            "domain": "example.com",
            "user": "acme",
            "ip": "203.0.113.9",
            "owner": "root",
            "plan": "gold",
            "suspended": 1,
            "startdate": "12 Jan 2024",
        });
        let domain = Domain::from_account(&payload);
        assert_eq!(domain.domain, "example.com");
        assert_eq!(domain.user, "acme");
        assert!(domain.suspended);
        assert_eq!(domain.plan, "gold");
        assert_eq!(domain.setup_date.as_deref(), Some("12 Jan 2024"));
    }

    #[test]
    fn test_from_account_defaults_plan() {
        let payload = serde_json::json!({"domain": "example.com", "user": "acme"});
        let domain = Domain::from_account(&payload);
        assert_eq!(domain.plan, "default");
        assert!(!domain.suspended);
    }

    #[test]
    fn test_validate_identity_fields() {
        let mut domain = named("example.com");
        domain.ip = "203.0.113.9".to_string();
        assert!(domain.validate().is_empty());

        domain.ip = "not-an-ip".to_string();
        assert_eq!(domain.validate(), vec!["Invalid IP address format".to_string()]);

        let empty = Domain::default();
        let errors = empty.validate();
        assert!(errors.contains(&"Domain name is required".to_string()));
        assert!(errors.contains(&"User is required".to_string()));
        assert!(errors.contains(&"IP address is required".to_string()));
    }
}
