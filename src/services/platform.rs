//! Platform detection
//!
//! Identifies the host distribution, package manager and architecture, and
//! checks the host against the supported-platform matrix. cPanel ships on
//! EL-family and Debian-family systems only, and several paths (EA-PHP,
//! Apache unit names) differ between the two.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::process::Stdio;

use serde::Serialize;
use tokio::process::Command;
use tracing::{info, warn};

/// Operating systems on the RHEL side of the fence.
const RHEL_FAMILY: [&str; 3] = ["AlmaLinux", "Rocky Linux", "CloudLinux"];

/// Operating systems on the Debian side of the fence.
const DEBIAN_FAMILY: [&str; 2] = ["Ubuntu", "Debian"];

/// Commands every managed host must provide.
const REQUIRED_COMMANDS: [&str; 5] = ["systemctl", "curl", "wget", "tar", "unzip"];

/// Package manager detected on the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    Dnf,
    Yum,
    Apt,
    AptGet,
    Unknown,
}

impl PackageManager {
    pub fn as_str(&self) -> &'static str {
        match self {
            PackageManager::Dnf => "dnf",
            PackageManager::Yum => "yum",
            PackageManager::Apt => "apt",
            PackageManager::AptGet => "apt-get",
            PackageManager::Unknown => "unknown",
        }
    }
}

/// Problems and caveats found by [`Platform::validate_host`].
#[derive(Debug, Clone, Default, Serialize)]
pub struct HostValidation {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Snapshot of the detected host platform.
#[derive(Debug, Clone, Serialize)]
pub struct Platform {
    pub os: String,
    pub version: String,
    pub family: String,
    pub architecture: String,
    pub package_manager: PackageManager,
    pub supported: bool,
}

impl Platform {
    /// Probe the host: `/etc/os-release` first, the legacy release files as
    /// fallback, then the package manager binaries.
    pub async fn detect() -> Self {
        let os_release = fs::read_to_string("/etc/os-release").unwrap_or_default();
        let mut platform = Self::from_os_release(&os_release);

        if platform.os == "Unknown" {
            platform.apply_legacy_release_files();
        }

        platform.package_manager = detect_package_manager().await;
        platform.supported = os_supported(&platform.os, &platform.version);

        info!(
            os = %platform.os,
            version = %platform.version,
            package_manager = platform.package_manager.as_str(),
            supported = platform.supported,
            "system detected"
        );
        platform
    }

    /// Build a platform snapshot from `/etc/os-release` contents.
    pub fn from_os_release(contents: &str) -> Self {
        let fields = parse_os_release(contents);
        let os = fields.get("NAME").cloned().unwrap_or_else(|| "Unknown".to_string());
        let version = fields
            .get("VERSION_ID")
            .cloned()
            .unwrap_or_else(|| "Unknown".to_string());
        let family = fields.get("ID").cloned().unwrap_or_else(|| "Unknown".to_string());

        Self {
            supported: os_supported(&os, &version),
            os,
            version,
            family,
            architecture: std::env::consts::ARCH.to_string(),
            package_manager: PackageManager::Unknown,
        }
    }

    /// Placeholder snapshot for hosts that cannot be identified.
    pub fn unknown() -> Self {
        Self {
            os: "Unknown".to_string(),
            version: "Unknown".to_string(),
            family: "Unknown".to_string(),
            architecture: std::env::consts::ARCH.to_string(),
            package_manager: PackageManager::Unknown,
            supported: false,
        }
    }

    fn apply_legacy_release_files(&mut self) {
        if let Ok(release) = fs::read_to_string("/etc/redhat-release") {
            if release.contains("AlmaLinux") {
                self.os = "AlmaLinux".to_string();
                self.family = "almalinux".to_string();
            } else if release.contains("Rocky") {
                self.os = "Rocky Linux".to_string();
                self.family = "rocky".to_string();
            } else if release.contains("CloudLinux") {
                self.os = "CloudLinux".to_string();
                self.family = "cloudlinux".to_string();
            }
        } else if fs::metadata("/etc/debian_version").is_ok() {
            self.os = "Debian".to_string();
            self.family = "debian".to_string();
        }
    }

    pub fn is_rhel_based(&self) -> bool {
        RHEL_FAMILY.contains(&self.os.as_str())
    }

    pub fn is_debian_based(&self) -> bool {
        DEBIAN_FAMILY.contains(&self.os.as_str())
    }

    /// Program and arguments installing one package, `None` without a
    /// usable package manager.
    pub fn install_command(&self, package: &str) -> Option<(String, Vec<String>)> {
        let (program, install) = match self.package_manager {
            PackageManager::Dnf => ("dnf", "install"),
            PackageManager::Yum => ("yum", "install"),
            PackageManager::Apt => ("apt", "install"),
            PackageManager::AptGet => ("apt-get", "install"),
            PackageManager::Unknown => return None,
        };
        Some((
            program.to_string(),
            vec![install.to_string(), "-y".to_string(), package.to_string()],
        ))
    }

    /// Conventional Apache unit name on this platform.
    pub fn apache_service_name(&self) -> &'static str {
        if self.is_debian_based() {
            "apache2"
        } else {
            "httpd"
        }
    }

    /// Conventional Apache configuration directory on this platform.
    pub fn apache_config_path(&self) -> &'static str {
        if self.is_debian_based() {
            "/etc/apache2"
        } else {
            "/etc/httpd"
        }
    }

    /// Candidate PHP binary locations for a version like "8.1", most
    /// specific first.
    pub fn php_binary_candidates(&self, version: &str) -> Vec<PathBuf> {
        let compact = version.replace('.', "");
        let ea_php = PathBuf::from(format!("/opt/cpanel/ea-php{compact}/bin/php"));
        let usr_bin = PathBuf::from(format!("/usr/bin/php{version}"));
        let usr_local = PathBuf::from(format!("/usr/local/bin/php{version}"));

        if self.is_rhel_based() {
            vec![ea_php, usr_bin, usr_local]
        } else {
            vec![usr_bin, usr_local, ea_php]
        }
    }

    /// First existing PHP binary for a version, or the system default.
    pub fn php_binary_path(&self, version: &str) -> PathBuf {
        self.php_binary_candidates(version)
            .into_iter()
            .find(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from("/usr/bin/php"))
    }

    /// Packages this toolkit expects on a freshly provisioned host.
    pub fn recommended_packages(&self) -> Vec<&'static str> {
        if self.is_rhel_based() {
            vec![
                "curl", "wget", "unzip", "tar", "systemd", "which", "git", "epel-release",
            ]
        } else if self.is_debian_based() {
            vec![
                "curl",
                "wget",
                "unzip",
                "tar",
                "systemd",
                "which",
                "git",
                "software-properties-common",
            ]
        } else {
            Vec::new()
        }
    }

    /// Check the host against the platform requirements: supported OS,
    /// required commands, the WHM CLI, memory and disk headroom.
    pub async fn validate_host(&self) -> HostValidation {
        let mut validation = HostValidation::default();

        if !self.supported {
            validation.errors.push(format!(
                "Unsupported operating system: {} {}",
                self.os, self.version
            ));
        }

        if self.architecture != "x86_64" {
            validation.warnings.push(format!(
                "Architecture {} detected. x86_64 is recommended for best performance.",
                self.architecture
            ));
        }

        for command in REQUIRED_COMMANDS {
            if !command_exists(command).await {
                validation
                    .errors
                    .push(format!("Required command not found: {command}"));
            }
        }

        if !command_exists("whmapi1").await {
            validation
                .errors
                .push("cPanel/WHM not found. whmapi1 command is required.".to_string());
        }

        let meminfo = fs::read_to_string("/proc/meminfo").unwrap_or_default();
        if let Some(total) = parse_meminfo_total(&meminfo) {
            let total_gib = total as f64 / f64::from(1 << 30);
            if total_gib < 4.0 {
                validation.warnings.push(format!(
                    "System has less than 4GB RAM ({total_gib:.1}GB). Performance may be affected."
                ));
            }
        }

        match root_disk_available().await {
            Some(available) if available < 20 * (1 << 30) => {
                validation
                    .errors
                    .push("Insufficient disk space. At least 20GB required.".to_string());
            }
            Some(_) => {}
            None => warn!("could not determine available disk space"),
        }

        validation
    }
}

/// Parse `/etc/os-release` key/value pairs, stripping quotes.
pub fn parse_os_release(contents: &str) -> HashMap<String, String> {
    contents
        .lines()
        .filter_map(|line| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            let (key, value) = line.split_once('=')?;
            Some((
                key.trim().to_string(),
                value.trim().trim_matches('"').to_string(),
            ))
        })
        .collect()
}

/// Parse the `MemTotal` line of `/proc/meminfo` into bytes.
pub fn parse_meminfo_total(contents: &str) -> Option<u64> {
    contents.lines().find_map(|line| {
        let rest = line.strip_prefix("MemTotal:")?;
        let kib = rest.split_whitespace().next()?.parse::<u64>().ok()?;
        Some(kib * 1024)
    })
}

/// Parse `df -B1 /` output into available bytes.
pub fn parse_df_available(output: &str) -> Option<u64> {
    let line = output.lines().nth(1)?;
    line.split_whitespace().nth(3)?.parse::<u64>().ok()
}

fn os_supported(os: &str, version: &str) -> bool {
    let major = version
        .split('.')
        .next()
        .and_then(|part| part.parse::<u32>().ok())
        .unwrap_or(0);

    match os {
        "AlmaLinux" | "Rocky Linux" | "CloudLinux" => major >= 9,
        "Ubuntu" => major >= 22,
        "Debian" => major >= 12,
        _ => false,
    }
}

async fn detect_package_manager() -> PackageManager {
    for (command, manager) in [
        ("dnf", PackageManager::Dnf),
        ("yum", PackageManager::Yum),
        ("apt", PackageManager::Apt),
        ("apt-get", PackageManager::AptGet),
    ] {
        if command_exists(command).await {
            return manager;
        }
    }
    PackageManager::Unknown
}

/// Whether a command resolves on PATH.
pub async fn command_exists(command: &str) -> bool {
    Command::new("which")
        .arg(command)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}

async fn root_disk_available() -> Option<u64> {
    let output = Command::new("df")
        .args(["-B1", "/"])
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    parse_df_available(&String::from_utf8_lossy(&output.stdout))
}
