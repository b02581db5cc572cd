//! Certificate inspection service
//!
//! Shells out to `openssl` to decode PEM certificates and verify that a
//! certificate and private key belong together. The PEM input is piped via
//! stdin; the textual output of `openssl x509 -text` is parsed with regexes
//! into structured fields.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::models::{parse_openssl_date, SslCertificate};
use crate::utils::{AppError, AppResult};

static ISSUER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Issuer:\s*(.+)").unwrap());
static NOT_AFTER_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Not After\s*:\s*(.+)").unwrap());
static SERIAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"Serial Number:\s*(.+)").unwrap());
static SIGNATURE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Signature Algorithm:\s*(.+)").unwrap());
static KEY_SIZE_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Public-Key:\s*\((\d+) bit\)").unwrap());
static SAN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"DNS:([^\s,]+)").unwrap());

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Fields decoded from `openssl x509 -text` output.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct X509Details {
    pub issuer: Option<String>,
    pub not_after: Option<DateTime<Utc>>,
    pub serial_number: Option<String>,
    pub signature_algorithm: Option<String>,
    pub key_size: Option<String>,
    pub subject_alternative_names: Vec<String>,
}

/// Inspector over the local `openssl` binary.
#[derive(Debug, Clone)]
pub struct SslInspector {
    openssl: PathBuf,
    timeout: Duration,
}

impl Default for SslInspector {
    fn default() -> Self {
        Self {
            openssl: PathBuf::from("openssl"),
            timeout: default_timeout(),
        }
    }
}

impl SslInspector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(mut self, openssl: impl Into<PathBuf>) -> Self {
        self.openssl = openssl.into();
        self
    }

    /// Decode a PEM certificate into structured details.
    pub async fn inspect(&self, certificate_pem: &str) -> AppResult<X509Details> {
        if certificate_pem.is_empty() {
            return Err(AppError::InvalidInput("certificate is empty".to_string()));
        }

        let text = self
            .run_with_stdin(&["x509", "-noout", "-text"], certificate_pem)
            .await?;
        Ok(parse_x509_text(&text))
    }

    /// Fill in the inspection-derived fields of a certificate record.
    pub async fn enrich(&self, cert: &mut SslCertificate) -> AppResult<()> {
        let details = self.inspect(&cert.certificate).await?;

        if let Some(issuer) = details.issuer {
            cert.issuer = issuer;
        }
        if details.not_after.is_some() {
            cert.expires_on = details.not_after;
        }
        cert.serial_number = details.serial_number.or(cert.serial_number.take());
        cert.signature_algorithm = details
            .signature_algorithm
            .or(cert.signature_algorithm.take());
        cert.key_size = details.key_size.or(cert.key_size.take());
        if !details.subject_alternative_names.is_empty() {
            cert.subject_alternative_names = details.subject_alternative_names;
        }

        Ok(())
    }

    /// Whether a certificate and an RSA private key share a modulus.
    pub async fn key_matches(&self, certificate_pem: &str, key_pem: &str) -> AppResult<bool> {
        let cert_modulus = self
            .run_with_stdin(&["x509", "-noout", "-modulus"], certificate_pem)
            .await?;
        let key_modulus = self
            .run_with_stdin(&["rsa", "-noout", "-modulus"], key_pem)
            .await?;
        Ok(cert_modulus.trim() == key_modulus.trim())
    }

    /// Full certificate check: the record's own problems plus a live
    /// modulus comparison of certificate and key.
    pub async fn validate(&self, cert: &SslCertificate) -> Vec<String> {
        let mut errors = cert.validate();

        if !cert.certificate.is_empty() && !cert.private_key.is_empty() {
            match self.key_matches(&cert.certificate, &cert.private_key).await {
                Ok(true) => {}
                Ok(false) => {
                    errors.push("Certificate and private key do not match".to_string());
                }
                Err(e) => {
                    warn!(domain = %cert.domain, error = %e, "key match check failed");
                }
            }
        }

        errors
    }

    async fn run_with_stdin(&self, args: &[&str], input: &str) -> AppResult<String> {
        debug!(openssl = ?self.openssl, ?args, "executing openssl");

        let mut child = Command::new(&self.openssl)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| AppError::CommandFailed(format!("openssl: {e}")))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|e| AppError::CommandFailed(format!("openssl stdin: {e}")))?;
        }

        let output = timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AppError::Timeout("openssl".to_string()))?
            .map_err(|e| AppError::CommandFailed(format!("openssl: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AppError::CommandFailed(format!(
                "openssl {} exited with {:?}: {}",
                args.first().unwrap_or(&""),
                output.status.code(),
                stderr.trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Parse the human-readable output of `openssl x509 -noout -text`.
pub fn parse_x509_text(text: &str) -> X509Details {
    let capture = |regex: &Regex| {
        regex
            .captures(text)
            .map(|caps| caps[1].trim().to_string())
            .filter(|s| !s.is_empty())
    };

    X509Details {
        issuer: capture(&ISSUER_REGEX),
        not_after: capture(&NOT_AFTER_REGEX).and_then(|date| parse_openssl_date(&date)),
        serial_number: capture(&SERIAL_REGEX),
        signature_algorithm: capture(&SIGNATURE_REGEX),
        key_size: capture(&KEY_SIZE_REGEX).map(|bits| format!("{bits} bit")),
        subject_alternative_names: SAN_REGEX
            .captures_iter(text)
            .map(|caps| caps[1].to_string())
            .collect(),
    }
}
