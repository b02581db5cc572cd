//! WHM API client
//!
//! Thin wrapper around the `whmapi1` command-line interface. Every call runs
//! the binary with `--output=json`, parses the response, and checks the
//! `metadata.result` status code before handing the payload to callers.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::utils::{AppError, AppResult};

fn default_timeout() -> Duration {
    Duration::from_secs(60)
}

/// Client for the local `whmapi1` binary.
#[derive(Debug, Clone)]
pub struct WhmClient {
    binary: PathBuf,
    timeout: Duration,
}

impl Default for WhmClient {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("whmapi1"),
            timeout: default_timeout(),
        }
    }
}

impl WhmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a non-default binary path (e.g. `/usr/local/cpanel/bin/whmapi1`).
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Bound each API call to `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Invoke a WHM API function and return the parsed JSON payload.
    ///
    /// Fails on a non-zero exit status, a timeout, unparsable output, or a
    /// `metadata.result` of 0.
    pub async fn call(&self, function: &str, params: &[(&str, String)]) -> AppResult<Value> {
        let mut command = Command::new(&self.binary);
        command.arg(function).arg("--output=json");
        for (key, value) in params {
            command.arg(format!("{key}={value}"));
        }
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        debug!(function, ?params, "executing whmapi1");

        let output = timeout(self.timeout, command.output())
            .await
            .map_err(|_| {
                error!(function, timeout_secs = self.timeout.as_secs(), "whmapi1 timed out");
                AppError::Timeout(format!("whmapi1 {function}"))
            })?
            .map_err(|e| AppError::CommandFailed(format!("whmapi1 {function}: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            error!(function, exit_code = ?output.status.code(), stderr = %stderr.trim(), "whmapi1 failed");
            return Err(AppError::CommandFailed(format!(
                "whmapi1 {function} exited with {:?}",
                output.status.code()
            )));
        }

        let payload: Value = serde_json::from_slice(&output.stdout)
            .map_err(|e| AppError::WhmApi(format!("unparsable response from {function}: {e}")))?;

        check_metadata(function, &payload)?;
        Ok(payload)
    }

    /// Flush cPanel's account caches after account-affecting changes.
    pub async fn refresh_account_cache(&self) -> AppResult<()> {
        self.call(
            "setup_user_session",
            &[("api.version", "1".to_string()), ("user", "root".to_string())],
        )
        .await?;
        Ok(())
    }
}

/// A `metadata.result` of 0 means the API call failed; the reason string
/// accompanies it. Responses without metadata pass through untouched.
fn check_metadata(function: &str, payload: &Value) -> AppResult<()> {
    if payload.pointer("/metadata/result").and_then(Value::as_i64) == Some(0) {
        let reason = payload
            .pointer("/metadata/reason")
            .and_then(Value::as_str)
            .unwrap_or("Unknown error");
        return Err(AppError::WhmApi(format!("{function}: {reason}")));
    }
    Ok(())
}
