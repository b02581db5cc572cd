//! System management service
//!
//! Wraps `systemctl`, the platform package manager, and a handful of
//! filesystem helpers. External failures are logged and mapped to `false`
//! or a default value; callers must not treat a quiet return as proof that
//! the host changed state.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::services::platform::Platform;

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

fn package_timeout() -> Duration {
    Duration::from_secs(600)
}

/// Captured result of one external command.
#[derive(Debug, Clone, Serialize)]
pub struct CommandOutcome {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// Snapshot of a systemd unit.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub service: String,
    pub active: String,
    pub enabled: String,
    pub running: bool,
}

/// Service for host-level administration.
pub struct SystemService {
    platform: Platform,
    timeout: Duration,
}

impl SystemService {
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            timeout: default_timeout(),
        }
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Run an external command with optional extra environment variables.
    pub async fn run(
        &self,
        program: &str,
        args: &[&str],
        env: &HashMap<String, String>,
    ) -> CommandOutcome {
        self.run_with_timeout(program, args, env, self.timeout).await
    }

    async fn run_with_timeout(
        &self,
        program: &str,
        args: &[&str],
        env: &HashMap<String, String>,
        limit: Duration,
    ) -> CommandOutcome {
        let command_str = format!("{program} {}", args.join(" "));
        debug!(command = %command_str, "executing command");

        let mut command = Command::new(program);
        command
            .args(args)
            .envs(env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let outcome = match timeout(limit, command.output()).await {
            Ok(Ok(output)) => CommandOutcome {
                command: command_str.clone(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code(),
                success: output.status.success(),
            },
            Ok(Err(e)) => CommandOutcome {
                command: command_str.clone(),
                stdout: String::new(),
                stderr: e.to_string(),
                exit_code: None,
                success: false,
            },
            Err(_) => CommandOutcome {
                command: command_str.clone(),
                stdout: String::new(),
                stderr: format!("command timed out after {}s", limit.as_secs()),
                exit_code: None,
                success: false,
            },
        };

        if outcome.success {
            debug!(command = %command_str, "command executed successfully");
        } else {
            error!(
                command = %command_str,
                exit_code = ?outcome.exit_code,
                stderr = %outcome.stderr.trim(),
                "command execution failed"
            );
        }

        outcome
    }

    /// Apply a systemd action (`start`, `stop`, `restart`, `enable`,
    /// `disable`, …) to a unit.
    pub async fn manage_service(&self, service: &str, action: &str) -> bool {
        info!(service, action, "managing service");
        let outcome = self
            .run("systemctl", &[action, service], &HashMap::new())
            .await;
        if !outcome.success {
            error!(service, action, "service action failed");
        }
        outcome.success
    }

    /// Whether a unit reports `active`.
    pub async fn is_service_running(&self, service: &str) -> bool {
        let outcome = self
            .run("systemctl", &["is-active", service], &HashMap::new())
            .await;
        outcome.stdout.trim() == "active"
    }

    /// Active/enabled snapshot of a unit.
    pub async fn service_status(&self, service: &str) -> ServiceStatus {
        let active = self
            .run("systemctl", &["is-active", service], &HashMap::new())
            .await;
        let enabled = self
            .run("systemctl", &["is-enabled", service], &HashMap::new())
            .await;

        let active = active.stdout.trim().to_string();
        ServiceStatus {
            service: service.to_string(),
            running: active == "active",
            active,
            enabled: enabled.stdout.trim().to_string(),
        }
    }

    /// Stop and disable any Apache instance so OpenLiteSpeed can bind its
    /// ports. Both conventional unit names are probed.
    pub async fn stop_web_server(&self) -> bool {
        for service in ["httpd", "apache2"] {
            if self.is_service_running(service).await {
                self.manage_service(service, "stop").await;
                self.manage_service(service, "disable").await;
            }
        }
        true
    }

    /// Install one package through the platform package manager.
    pub async fn install_package(&self, package: &str) -> bool {
        let Some((program, args)) = self.platform.install_command(package) else {
            error!(package, "no package manager available");
            return false;
        };

        info!(package, "installing package");
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        let outcome = self
            .run_with_timeout(&program, &arg_refs, &HashMap::new(), package_timeout())
            .await;

        if outcome.success {
            info!(package, "package installed successfully");
        } else {
            error!(package, exit_code = ?outcome.exit_code, "failed to install package");
        }
        outcome.success
    }

    /// Install several packages, reporting per-package success.
    pub async fn install_packages(&self, packages: &[String]) -> Vec<(String, bool)> {
        let mut results = Vec::with_capacity(packages.len());
        for package in packages {
            let installed = self.install_package(package).await;
            results.push((package.clone(), installed));
        }
        results
    }

    /// Upgrade all system packages.
    pub async fn update_system(&self) -> bool {
        info!("updating system packages");

        let outcome = if self.platform.is_rhel_based() {
            self.run_with_timeout(
                "dnf",
                &["update", "-y"],
                &HashMap::new(),
                package_timeout(),
            )
            .await
        } else if self.platform.is_debian_based() {
            let update = self
                .run_with_timeout("apt", &["update"], &HashMap::new(), package_timeout())
                .await;
            if !update.success {
                error!("apt update failed");
                return false;
            }
            self.run_with_timeout(
                "apt",
                &["upgrade", "-y"],
                &HashMap::new(),
                package_timeout(),
            )
            .await
        } else {
            error!("unsupported operating system for package update");
            return false;
        };

        if outcome.success {
            info!("system updated successfully");
        }
        outcome.success
    }

    /// Create a directory (and parents) with the given mode if absent.
    pub fn create_directory(&self, path: &Path, mode: u32) -> Result<()> {
        if path.is_dir() {
            return Ok(());
        }

        info!(?path, "creating directory");
        fs::create_dir_all(path).with_context(|| format!("failed to create directory {path:?}"))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set permissions on {path:?}"))?;
        }
        #[cfg(not(unix))]
        let _ = mode;

        Ok(())
    }

    /// Copy a file, creating the destination directory if needed.
    pub fn copy_file(&self, source: &Path, destination: &Path) -> Result<()> {
        info!(?source, ?destination, "copying file");

        if let Some(parent) = destination.parent() {
            self.create_directory(parent, 0o755)?;
        }

        fs::copy(source, destination)
            .with_context(|| format!("failed to copy {source:?} -> {destination:?}"))?;
        Ok(())
    }

    /// Remove a file; absent files are not an error.
    pub fn remove_file(&self, path: &Path) -> Result<()> {
        if !path.exists() {
            return Ok(());
        }
        info!(?path, "removing file");
        fs::remove_file(path).with_context(|| format!("failed to remove {path:?}"))
    }

    /// Set the permission bits of an existing path.
    pub fn set_permissions(&self, path: &Path, mode: u32) -> Result<()> {
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(mode))
                .with_context(|| format!("failed to set permissions on {path:?}"))?;
        }
        #[cfg(not(unix))]
        let _ = (path, mode);
        Ok(())
    }

    /// 1/5/15-minute load averages; zeros when unreadable.
    pub fn load_average(&self) -> (f64, f64, f64) {
        let contents = fs::read_to_string("/proc/loadavg").unwrap_or_default();
        parse_load_average(&contents)
    }

    /// Human-readable uptime; "Unknown" when unreadable.
    pub fn uptime(&self) -> String {
        let contents = fs::read_to_string("/proc/uptime").unwrap_or_default();
        match contents.split_whitespace().next().and_then(|s| s.parse::<f64>().ok()) {
            Some(seconds) => format_uptime(seconds as u64),
            None => {
                warn!("failed to read /proc/uptime");
                "Unknown".to_string()
            }
        }
    }

    /// Host name from the kernel.
    pub fn hostname(&self) -> String {
        fs::read_to_string("/proc/sys/kernel/hostname")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "Unknown".to_string())
    }

    /// Kernel release string.
    pub fn kernel_version(&self) -> String {
        fs::read_to_string("/proc/sys/kernel/osrelease")
            .map(|s| s.trim().to_string())
            .unwrap_or_else(|_| "Unknown".to_string())
    }
}

fn parse_load_average(contents: &str) -> (f64, f64, f64) {
    let mut fields = contents.split_whitespace();
    let mut next = || {
        fields
            .next()
            .and_then(|field| field.parse::<f64>().ok())
            .unwrap_or(0.0)
    };
    (next(), next(), next())
}

fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;
    format!("{days} days, {hours} hours, {minutes} minutes")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_load_average() {
        let (one, five, fifteen) = parse_load_average("0.52 0.58 0.59 1/257 12345\n");
        assert_eq!(one, 0.52);
        assert_eq!(five, 0.58);
        assert_eq!(fifteen, 0.59);
    }

    #[test]
    fn test_parse_load_average_garbage() {
        assert_eq!(parse_load_average(""), (0.0, 0.0, 0.0));
        assert_eq!(parse_load_average("nope"), (0.0, 0.0, 0.0));
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(0), "0 days, 0 hours, 0 minutes");
        assert_eq!(format_uptime(90_061), "1 days, 1 hours, 1 minutes");
        assert_eq!(format_uptime(3 * 86_400 + 2 * 3_600 + 60), "3 days, 2 hours, 1 minutes");
    }

    #[tokio::test]
    async fn test_run_reports_missing_binary() {
        let service = SystemService::new(Platform::unknown());
        let outcome = service
            .run("/nonexistent/definitely-not-a-binary", &[], &HashMap::new())
            .await;
        assert!(!outcome.success);
        assert!(outcome.exit_code.is_none());
    }

    #[test]
    fn test_create_directory_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b");
        let service = SystemService::new(Platform::unknown());

        service.create_directory(&target, 0o755).unwrap();
        service.create_directory(&target, 0o755).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_copy_file_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("src.txt");
        fs::write(&source, "payload").unwrap();

        let destination = dir.path().join("nested/dir/dst.txt");
        let service = SystemService::new(Platform::unknown());
        service.copy_file(&source, &destination).unwrap();

        assert_eq!(fs::read_to_string(&destination).unwrap(), "payload");
    }
}
