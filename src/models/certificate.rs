//! SSL certificate model
//!
//! A certificate record as returned by the WHM API or assembled from an
//! `openssl x509` inspection. All derived properties are pure functions over
//! the stored fields and are recomputed on every access.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Issuers treated as commercial certificate authorities.
const COMMERCIAL_ISSUERS: [&str; 8] = [
    "DigiCert",
    "Comodo",
    "GlobalSign",
    "Sectigo",
    "GeoTrust",
    "Thawte",
    "RapidSSL",
    "Symantec",
];

/// Issuer markers for Let's Encrypt certificates.
const LETS_ENCRYPT_MARKERS: [&str; 3] = ["Let's Encrypt", "R3", "ISRG"];

/// How close a certificate is to its expiry date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationStatus {
    /// No expiry date recorded
    Unknown,
    /// Already past the expiry date
    Expired,
    /// Seven days or fewer remaining
    Critical,
    /// Between eight and thirty days remaining
    Warning,
    /// More than thirty days remaining
    Valid,
}

impl ExpirationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpirationStatus::Unknown => "unknown",
            ExpirationStatus::Expired => "expired",
            ExpirationStatus::Critical => "critical",
            ExpirationStatus::Warning => "warning",
            ExpirationStatus::Valid => "valid",
        }
    }

    /// Display color used by listings.
    pub fn color(&self) -> &'static str {
        match self {
            ExpirationStatus::Expired | ExpirationStatus::Critical => "red",
            ExpirationStatus::Warning => "orange",
            ExpirationStatus::Valid => "green",
            ExpirationStatus::Unknown => "gray",
        }
    }
}

/// Certificate classification by issuer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateKind {
    SelfSigned,
    LetsEncrypt,
    Commercial,
    Other,
}

impl CertificateKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateKind::SelfSigned => "self_signed",
            CertificateKind::LetsEncrypt => "lets_encrypt",
            CertificateKind::Commercial => "commercial",
            CertificateKind::Other => "other",
        }
    }
}

/// A TLS certificate attached to a hosted domain.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SslCertificate {
    /// Domain the certificate was issued for
    pub domain: String,
    /// PEM-encoded certificate
    #[serde(default)]
    pub certificate: String,
    /// PEM-encoded private key
    #[serde(default)]
    pub private_key: String,
    /// PEM-encoded CA bundle
    #[serde(default)]
    pub ca_bundle: String,
    /// Issuer distinguished name
    #[serde(default)]
    pub issuer: String,
    /// Expiry timestamp, if known
    #[serde(default)]
    pub expires_on: Option<DateTime<Utc>>,
    /// Whether the certificate is self-signed
    #[serde(default)]
    pub is_self_signed: bool,
    /// Raw status string reported by the API
    #[serde(default = "default_status")]
    pub status: String,
    /// Serial number
    #[serde(default)]
    pub serial_number: Option<String>,
    /// Signature algorithm
    #[serde(default)]
    pub signature_algorithm: Option<String>,
    /// Public key size, e.g. "2048 bit"
    #[serde(default)]
    pub key_size: Option<String>,
    /// Subject alternative names
    #[serde(default)]
    pub subject_alternative_names: Vec<String>,
}

fn default_status() -> String {
    "unknown".to_string()
}

impl SslCertificate {
    /// Build a certificate record from a WHM `fetchsslinfo` cert payload.
    pub fn from_whm_payload(domain: &str, cert: &serde_json::Value) -> Self {
        Self {
            domain: domain.to_string(),
            certificate: json_str(cert, "certificate"),
            private_key: json_str(cert, "key"),
            ca_bundle: json_str(cert, "cabundle"),
            issuer: json_str(cert, "issuer"),
            expires_on: cert.get("expires_on").and_then(parse_expiry),
            is_self_signed: json_flag(cert, "is_self_signed"),
            status: match cert.get("status").and_then(serde_json::Value::as_str) {
                Some(s) if !s.is_empty() => s.to_string(),
                _ => default_status(),
            },
            serial_number: None,
            signature_algorithm: None,
            key_size: None,
            subject_alternative_names: Vec::new(),
        }
    }

    /// Whether the expiry date has passed. A certificate with no recorded
    /// expiry is not considered expired.
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expires_on {
            Some(expires_on) => expires_on < now,
            None => false,
        }
    }

    /// Signed whole days until expiry; negative once expired, `None` when no
    /// expiry is recorded.
    pub fn days_until_expiration(&self) -> Option<i64> {
        self.days_until_expiration_at(Utc::now())
    }

    fn days_until_expiration_at(&self, now: DateTime<Utc>) -> Option<i64> {
        self.expires_on
            .map(|expires_on| expires_on.signed_duration_since(now).num_days())
    }

    /// True when the certificate expires within `days` days but has not
    /// expired yet.
    pub fn is_expiring_soon(&self, days: i64) -> bool {
        matches!(self.days_until_expiration(), Some(d) if d > 0 && d <= days)
    }

    /// A certificate is valid when it has both a certificate and a key, has
    /// not expired, and is not self-signed.
    pub fn is_valid(&self) -> bool {
        !self.certificate.is_empty()
            && !self.private_key.is_empty()
            && !self.is_expired()
            && !self.is_self_signed
    }

    pub fn is_lets_encrypt(&self) -> bool {
        LETS_ENCRYPT_MARKERS
            .iter()
            .any(|marker| self.issuer.contains(marker))
    }

    pub fn is_commercial(&self) -> bool {
        COMMERCIAL_ISSUERS
            .iter()
            .any(|issuer| self.issuer.contains(issuer))
    }

    /// Classify the certificate by issuer. Self-signed wins over issuer
    /// matches, Let's Encrypt over the commercial vendor list.
    pub fn certificate_kind(&self) -> CertificateKind {
        if self.is_self_signed {
            CertificateKind::SelfSigned
        } else if self.is_lets_encrypt() {
            CertificateKind::LetsEncrypt
        } else if self.is_commercial() {
            CertificateKind::Commercial
        } else {
            CertificateKind::Other
        }
    }

    /// Bucket the remaining lifetime. Exactly 7 days is critical, exactly 30
    /// is warning.
    pub fn expiration_status(&self) -> ExpirationStatus {
        self.expiration_status_at(Utc::now())
    }

    fn expiration_status_at(&self, now: DateTime<Utc>) -> ExpirationStatus {
        match self.days_until_expiration_at(now) {
            None => ExpirationStatus::Unknown,
            Some(days) if days < 0 => ExpirationStatus::Expired,
            Some(days) if days <= 7 => ExpirationStatus::Critical,
            Some(days) if days <= 30 => ExpirationStatus::Warning,
            Some(_) => ExpirationStatus::Valid,
        }
    }

    /// Expiry date formatted for display, e.g. "May 30, 2027".
    pub fn formatted_expiration_date(&self) -> String {
        match self.expires_on {
            Some(expires_on) => expires_on.format("%b %-d, %Y").to_string(),
            None => "Unknown".to_string(),
        }
    }

    /// Human-readable renewal advice for operators.
    pub fn renewal_recommendation(&self) -> &'static str {
        match self.days_until_expiration() {
            None => "Unable to determine expiration date",
            Some(days) if days < 0 => "Certificate has expired. Immediate renewal required.",
            Some(days) if days <= 7 => "Certificate expires very soon. Renew immediately.",
            Some(days) if days <= 30 => "Certificate expires soon. Schedule renewal.",
            Some(_) => "Certificate is valid. No immediate action needed.",
        }
    }

    /// Check the record for problems that make it unusable for serving.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.certificate.is_empty() {
            errors.push("Certificate is empty".to_string());
        }
        if self.private_key.is_empty() {
            errors.push("Private key is empty".to_string());
        }
        if self.is_expired() {
            errors.push("Certificate has expired".to_string());
        }
        if self.is_self_signed {
            errors.push("Certificate is self-signed".to_string());
        }

        errors
    }
}

impl fmt::Display for SslCertificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.domain, self.certificate_kind().as_str())
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

/// Parse an expiry timestamp from a WHM payload or an `openssl` date.
///
/// WHM reports epoch seconds (as number or string); `openssl x509` prints
/// dates like `May 30 12:00:00 2027 GMT`.
pub fn parse_expiry(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(epoch) = value.as_i64() {
        return Utc.timestamp_opt(epoch, 0).single();
    }

    let text = value.as_str()?;
    if let Ok(epoch) = text.parse::<i64>() {
        return Utc.timestamp_opt(epoch, 0).single();
    }
    parse_openssl_date(text)
}

/// Parse the `Not After` date format printed by `openssl x509 -text`.
pub fn parse_openssl_date(text: &str) -> Option<DateTime<Utc>> {
    // openssl pads single-digit days with an extra space.
    let normalized = text.split_whitespace().collect::<Vec<_>>().join(" ");
    for format in ["%b %d %H:%M:%S %Y GMT", "%b %d %H:%M:%S %Y", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(&normalized, format) {
            return Some(Utc.from_utc_datetime(&parsed));
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

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
    fn test_expiration_status_buckets() {
        let now = Utc::now();
        let at = |days: i64| SslCertificate {
            expires_on: Some(now + Duration::days(days)),
            ..Default::default()
        };

        assert_eq!(at(5).expiration_status_at(now), ExpirationStatus::Critical);
        assert_eq!(at(7).expiration_status_at(now), ExpirationStatus::Critical);
        assert_eq!(at(8).expiration_status_at(now), ExpirationStatus::Warning);
        assert_eq!(at(30).expiration_status_at(now), ExpirationStatus::Warning);
        assert_eq!(at(31).expiration_status_at(now), ExpirationStatus::Valid);
        assert_eq!(at(-1).expiration_status_at(now), ExpirationStatus::Expired);
    }

    #[test]
    fn test_expiration_status_unknown_without_date() {
        let cert = SslCertificate::default();
        assert_eq!(cert.expiration_status(), ExpirationStatus::Unknown);
        assert!(cert.days_until_expiration().is_none());
        assert!(!cert.is_expired());
    }

    #[test]
    fn test_is_valid_requires_material_and_freshness() {
        let cert = cert_expiring_in(90);
        assert!(cert.is_valid());

        let expired = cert_expiring_in(-2);
        assert!(!expired.is_valid());

        let self_signed = SslCertificate {
            is_self_signed: true,
            ..cert_expiring_in(90)
        };
        assert!(!self_signed.is_valid());

        let keyless = SslCertificate {
            private_key: String::new(),
            ..cert_expiring_in(90)
        };
        assert!(!keyless.is_valid());
    }

    #[test]
    fn test_certificate_kind_priority() {
        let mut cert = cert_expiring_in(90);
        cert.issuer = "C=US, O=Let's Encrypt, CN=R3".to_string();
        assert_eq!(cert.certificate_kind(), CertificateKind::LetsEncrypt);

        cert.issuer = "C=US, O=DigiCert Inc".to_string();
        assert_eq!(cert.certificate_kind(), CertificateKind::Commercial);

        cert.is_self_signed = true;
        assert_eq!(cert.certificate_kind(), CertificateKind::SelfSigned);

        cert.is_self_signed = false;
        cert.issuer = "CN=Example Internal CA".to_string();
        assert_eq!(cert.certificate_kind(), CertificateKind::Other);
    }

    #[test]
    fn test_is_expiring_soon_excludes_expired() {
        assert!(cert_expiring_in(10).is_expiring_soon(30));
        assert!(!cert_expiring_in(-1).is_expiring_soon(30));
        assert!(!cert_expiring_in(60).is_expiring_soon(30));
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let cert = SslCertificate {
            expires_on: Some(Utc::now() - Duration::days(1)),
            is_self_signed: true,
            ..Default::default()
        };
        let errors = cert.validate();
        assert_eq!(errors.len(), 4);
    }

    #[test]
    fn test_parse_openssl_date() {
        let parsed = parse_openssl_date("May 30 12:00:00 2027 GMT").unwrap();
        assert_eq!(parsed.format("%Y-%m-%d %H:%M").to_string(), "2027-05-30 12:00");

        // Single-digit day with openssl's double-space padding.
        let padded = parse_openssl_date("Jun  1 00:20:47 2027 GMT").unwrap();
        assert_eq!(padded.format("%Y-%m-%d").to_string(), "2027-06-01");
    }

    #[test]
    fn test_parse_expiry_accepts_epoch() {
        let parsed = parse_expiry(&serde_json::json!(1_900_000_000)).unwrap();
        assert_eq!(parsed.timestamp(), 1_900_000_000);

        let from_str = parse_expiry(&serde_json::json!("1900000000")).unwrap();
        assert_eq!(from_str.timestamp(), 1_900_000_000);
    }

    #[test]
    fn test_from_whm_payload() {
        let payload = serde_json::json!({
            "certificate": "PEM CERT",
            "key": "PEM KEY",
            "cabundle": "PEM CA",
            "issuer": "Let's Encrypt",
            "expires_on": 1_900_000_000,
            "is_self_signed": 0,
            "status": "active",
        });
        let cert = SslCertificate::from_whm_payload("example.com", &payload);
        assert_eq!(cert.domain, "example.com");
        assert_eq!(cert.certificate, "PEM CERT");
        assert!(!cert.is_self_signed);
        assert_eq!(cert.status, "active");
        assert_eq!(cert.certificate_kind(), CertificateKind::LetsEncrypt);
        assert!(cert.expires_on.is_some());
    }
}
