//! Domain and SSL lookup service
//!
//! Queries the WHM API for hosted accounts and their dependent names, and
//! assembles [`Domain`] records. API failures on the enrichment lookups are
//! logged and degrade to defaults; only the account listing itself is fatal.

use serde_json::Value;
use tracing::{info, warn};

use crate::config::ConfigStore;
use crate::models::{AddonDomain, Domain, ParkedDomain, SslCertificate, Subdomain};
use crate::services::whm::WhmClient;
use crate::utils::AppResult;

const FALLBACK_PHP_VERSION: &str = "8.1";
const FALLBACK_USER: &str = "nobody";
const FALLBACK_IP: &str = "127.0.0.1";

/// Service for listing and enriching hosted domains.
pub struct DomainService {
    whm: WhmClient,
    default_php_version: String,
}

impl DomainService {
    pub fn new(whm: WhmClient, default_php_version: impl Into<String>) -> Self {
        Self {
            whm,
            default_php_version: default_php_version.into(),
        }
    }

    /// Build the service with the PHP fallback version from configuration.
    pub fn from_config(whm: WhmClient, config: &ConfigStore) -> Self {
        let default_php_version = config
            .get_str("php.default_version", FALLBACK_PHP_VERSION)
            .to_string();
        Self::new(whm, default_php_version)
    }

    /// List every hosted account as a bare domain record.
    ///
    /// Unlike the enrichment lookups this is fatal on API failure: without
    /// the account listing there is nothing to degrade to.
    pub async fn list_domains(&self) -> AppResult<Vec<Domain>> {
        let payload = self
            .whm
            .call(
                "listaccts",
                &[
                    ("api.version", "1".to_string()),
                    ("want", "domain".to_string()),
                ],
            )
            .await?;

        let domains = parse_accounts(&payload);
        info!(count = domains.len(), "retrieved domains from WHM");
        Ok(domains)
    }

    /// Find one domain by name.
    pub async fn get_domain(&self, domain: &str) -> AppResult<Option<Domain>> {
        let domains = self.list_domains().await?;
        Ok(domains.into_iter().find(|d| d.domain == domain))
    }

    /// SSL certificate for a domain, or `None` when the lookup fails or no
    /// certificate is installed.
    pub async fn ssl_info(&self, domain: &str) -> Option<SslCertificate> {
        let result = self
            .whm
            .call(
                "fetchsslinfo",
                &[
                    ("api.version", "1".to_string()),
                    ("domain", domain.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => payload
                .pointer("/data/cert")
                .map(|cert| SslCertificate::from_whm_payload(domain, cert)),
            Err(e) => {
                warn!(domain, error = %e, "failed to get SSL info for domain");
                None
            }
        }
    }

    /// PHP version serving a vhost, falling back to the configured default.
    pub async fn php_version(&self, domain: &str) -> String {
        let result = self
            .whm
            .call(
                "php_get_vhost_versions",
                &[
                    ("api.version", "1".to_string()),
                    ("vhost", domain.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => payload
                .pointer("/data/version")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.default_php_version.clone()),
            Err(e) => {
                warn!(domain, error = %e, "failed to get PHP version for domain");
                self.default_php_version.clone()
            }
        }
    }

    /// Subdomains of a main domain; empty on lookup failure.
    pub async fn subdomains(&self, main_domain: &str) -> Vec<Subdomain> {
        let result = self
            .whm
            .call(
                "listsubdomains",
                &[
                    ("api.version", "1".to_string()),
                    ("domain", main_domain.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => parse_subdomains(&payload),
            Err(e) => {
                warn!(main_domain, error = %e, "failed to get subdomains");
                Vec::new()
            }
        }
    }

    /// Addon domains owned by an account; empty on lookup failure.
    pub async fn addon_domains(&self, username: &str) -> Vec<AddonDomain> {
        let result = self
            .whm
            .call(
                "listaddondomains",
                &[
                    ("api.version", "1".to_string()),
                    ("user", username.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => parse_addon_domains(&payload),
            Err(e) => {
                warn!(username, error = %e, "failed to get addon domains");
                Vec::new()
            }
        }
    }

    /// Parked domains owned by an account; empty on lookup failure.
    pub async fn parked_domains(&self, username: &str) -> Vec<ParkedDomain> {
        let result = self
            .whm
            .call(
                "listparkeddomains",
                &[
                    ("api.version", "1".to_string()),
                    ("user", username.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => parse_parked_domains(&payload),
            Err(e) => {
                warn!(username, error = %e, "failed to get parked domains");
                Vec::new()
            }
        }
    }

    /// Document root of a domain, falling back to the conventional
    /// `public_html` path for its owner.
    pub async fn document_root(&self, domain: &str) -> String {
        let result = self
            .whm
            .call(
                "domainuserdata",
                &[
                    ("api.version", "1".to_string()),
                    ("domain", domain.to_string()),
                ],
            )
            .await;

        match result {
            Ok(payload) => {
                if let Some(root) = payload
                    .pointer("/data/userdata/documentroot")
                    .or_else(|| payload.pointer("/data/documentroot"))
                    .and_then(Value::as_str)
                {
                    return root.to_string();
                }
                self.default_document_root(domain).await
            }
            Err(e) => {
                warn!(domain, error = %e, "failed to get document root for domain");
                self.default_document_root(domain).await
            }
        }
    }

    async fn default_document_root(&self, domain: &str) -> String {
        format!("/home/{}/public_html", self.domain_user(domain).await)
    }

    /// Owning system user of a domain, `nobody` if unknown.
    pub async fn domain_user(&self, domain: &str) -> String {
        match self.get_domain(domain).await {
            Ok(Some(d)) => d.user,
            _ => FALLBACK_USER.to_string(),
        }
    }

    /// Whether a domain's account is suspended; false if unknown.
    pub async fn is_suspended(&self, domain: &str) -> bool {
        matches!(self.get_domain(domain).await, Ok(Some(d)) if d.suspended)
    }

    /// IP address serving a domain, loopback if unknown.
    pub async fn domain_ip(&self, domain: &str) -> String {
        match self.get_domain(domain).await {
            Ok(Some(d)) if !d.ip.is_empty() => d.ip,
            _ => FALLBACK_IP.to_string(),
        }
    }

    /// Standard HTTP/HTTPS port for a vhost.
    pub fn port(&self, ssl: bool) -> u16 {
        if ssl {
            443
        } else {
            80
        }
    }

    /// List all domains, enriched with document root, PHP version, SSL
    /// certificate and dependent-name lists.
    pub async fn inventory(&self) -> AppResult<Vec<Domain>> {
        let mut domains = self.list_domains().await?;

        for domain in &mut domains {
            let name = domain.domain.clone();
            let user = domain.user.clone();

            domain.document_root = Some(self.document_root(&name).await);
            domain.php_version = Some(self.php_version(&name).await);
            domain.ssl_certificate = self.ssl_info(&name).await;
            domain.subdomains = self.subdomains(&name).await;
            domain.addon_domains = self.addon_domains(&user).await;
            domain.parked_domains = self.parked_domains(&user).await;
        }

        info!(count = domains.len(), "retrieved complete domain data");
        Ok(domains)
    }
}

fn parse_accounts(payload: &Value) -> Vec<Domain> {
    payload
        .pointer("/data/acct")
        .and_then(Value::as_array)
        .map(|accounts| accounts.iter().map(Domain::from_account).collect())
        .unwrap_or_default()
}

fn parse_subdomains(payload: &Value) -> Vec<Subdomain> {
    payload
        .pointer("/data/subdomain")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| Subdomain {
                    domain: json_str(entry, "domain"),
                    root_domain: json_str(entry, "rootdomain"),
                    base_dir: json_str(entry, "basedir"),
                    status: entry.get("status").and_then(Value::as_i64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_addon_domains(payload: &Value) -> Vec<AddonDomain> {
    payload
        .pointer("/data/addon")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| AddonDomain {
                    domain: json_str(entry, "domain"),
                    base_dir: json_str(entry, "basedir"),
                    status: entry.get("status").and_then(Value::as_i64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn parse_parked_domains(payload: &Value) -> Vec<ParkedDomain> {
    payload
        .pointer("/data/parked")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .map(|entry| ParkedDomain {
                    domain: json_str(entry, "domain"),
                    base_dir: json_str(entry, "basedir"),
                    status: entry.get("status").and_then(Value::as_i64).unwrap_or(0),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn json_str(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accounts() {
        let payload = serde_json::json!({
            "metadata": {"result": 1},
            "data": {
                "acct": [
                    {"domain": "example.com", "user": "acme", "ip": "203.0.113.9",
                     "owner": "root", "plan": "gold", "suspended": 0,
                     "startdate": "12 Jan 2024"},
                    {"domain": "example.net", "user": "beta", "ip": "203.0.113.10",
                     "owner": "root", "suspended": 1},
                ],
            },
        });
        let domains = parse_accounts(&payload);
        assert_eq!(domains.len(), 2);
        assert_eq!(domains[0].domain, "example.com");
        assert!(!domains[0].suspended);
        assert!(domains[1].suspended);
        assert_eq!(domains[1].plan, "default");
    }

    #[test]
    fn test_parse_accounts_empty_payload() {
        let payload = serde_json::json!({"metadata": {"result": 1}, "data": {}});
        assert!(parse_accounts(&payload).is_empty());
    }

    #[test]
    fn test_parse_subdomains() {
        let payload = serde_json::json!({
            "data": {
                "subdomain": [
                    {"domain": "blog.example.com", "rootdomain": "example.com",
                     "basedir": "public_html/blog", "status": 1},
                ],
            },
        });
        let subdomains = parse_subdomains(&payload);
        assert_eq!(subdomains.len(), 1);
        assert_eq!(subdomains[0].domain, "blog.example.com");
        assert_eq!(subdomains[0].root_domain, "example.com");
        assert_eq!(subdomains[0].status, 1);
    }

    #[test]
    fn test_parse_addon_and_parked() {
        let payload = serde_json::json!({
            "data": {
                "addon": [{"domain": "shop.example", "basedir": "public_html/shop"}],
                "parked": [{"domain": "example.org", "basedir": "public_html"}],
            },
        });
        let addons = parse_addon_domains(&payload);
        assert_eq!(addons.len(), 1);
        assert_eq!(addons[0].status, 0);

        let parked = parse_parked_domains(&payload);
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].domain, "example.org");
    }

    #[test]
    fn test_port_selection() {
        let service = DomainService::new(WhmClient::new(), "8.1");
        assert_eq!(service.port(false), 80);
        assert_eq!(service.port(true), 443);
    }
}
