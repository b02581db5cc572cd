//! Configuration management
//!
//! This module provides YAML-based configuration management with support for:
//! - Dotted-path access into the configuration document
//! - A built-in default document materialized on first run
//! - Timestamped backups and restore
//! - Named templates deep-merged onto the live document

use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use serde_norway::{Mapping, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Errors raised by configuration load, save, backup and restore.
///
/// Every fallible store operation reports one of three kinds: the backing
/// file (or a backup/template) is missing, the filesystem failed, or the
/// document did not parse. Path reads and writes (`get`/`set`/`has`) are
/// total and never fail.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("not found: {path:?}")]
    NotFound { path: PathBuf },

    #[error("I/O error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_norway::Error,
    },
}

impl ConfigError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// The default configuration document created on first run.
static DEFAULT_DOCUMENT: Lazy<Value> = Lazy::new(|| {
    serde_norway::from_str(DEFAULT_YAML).expect("built-in default configuration is valid YAML")
});

const DEFAULT_YAML: &str = r#"
server:
  name: OpenLiteSpeed
  version: 1.7.17
  admin_email: root@localhost
  user: nobody
  group: nobody
performance:
  max_connections: 10000
  max_ssl_connections: 10000
  cache_enabled: true
  cache_size_mb: 1024
  gzip_compression: true
  gzip_level: 6
  keep_alive_timeout: 5
  max_keep_alive_requests: 10000
security:
  ssl_auto_renewal: true
  ssl_renewal_days_before: 30
  firewall_rules: true
  rate_limiting: true
  max_requests_per_minute: 60
  block_failed_logins: true
  max_failed_attempts: 5
  block_duration_minutes: 15
logging:
  level: INFO
  access_log_enabled: true
  error_log_enabled: true
  log_rotation: true
  max_log_size_mb: 100
  retention_days: 30
monitoring:
  enabled: true
  metrics_interval: 60
  alert_thresholds:
    cpu_usage: 80
    memory_usage: 85
    disk_usage: 90
    response_time: 5000
php:
  default_version: "8.1"
  allowed_versions: ["7.4", "8.0", "8.1", "8.2"]
  handler: lsapi
  memory_limit: 256M
  max_execution_time: 300
"#;

/// A nested key/value configuration document.
///
/// The document is a tree of YAML values addressed by dotted paths like
/// `performance.cache_size_mb`. Lookups walk the tree segment by segment and
/// give up (returning `None`) as soon as a segment is missing or the current
/// node is not a mapping; they never partial-match and never fail.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigDocument {
    root: Value,
}

impl Default for ConfigDocument {
    fn default() -> Self {
        Self {
            root: Value::Mapping(Mapping::new()),
        }
    }
}

impl ConfigDocument {
    /// Wrap an already-parsed YAML value.
    pub fn new(root: Value) -> Self {
        Self { root }
    }

    /// The built-in default document (see the `server`/`performance`/
    /// `security`/`logging`/`monitoring`/`php` sections in DEFAULT_YAML).
    pub fn built_in_defaults() -> Self {
        Self {
            root: DEFAULT_DOCUMENT.clone(),
        }
    }

    /// The underlying YAML value.
    pub fn as_value(&self) -> &Value {
        &self.root
    }

    /// Look up a value by dotted path.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut node = &self.root;
        for segment in path.split('.') {
            node = node.as_mapping()?.get(segment)?;
        }
        Some(node)
    }

    /// String lookup with a caller-supplied default.
    pub fn get_str<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        self.get(path).and_then(Value::as_str).unwrap_or(default)
    }

    /// Integer lookup with a caller-supplied default.
    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        self.get(path).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Boolean lookup with a caller-supplied default.
    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.get(path).and_then(Value::as_bool).unwrap_or(default)
    }

    /// Whether a non-null value is stored at `path`.
    ///
    /// A stored explicit `null` is indistinguishable from a missing key.
    pub fn has(&self, path: &str) -> bool {
        matches!(self.get(path), Some(value) if !value.is_null())
    }

    /// Assign `value` at a dotted path, creating intermediate mappings as
    /// needed. A non-mapping node found along the path is overwritten by a
    /// fresh mapping, so `set` never fails.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments: Vec<&str> = path.split('.').collect();
        let (last, parents) = match segments.split_last() {
            Some(split) => split,
            None => return,
        };

        let mut node = &mut self.root;
        for segment in parents {
            let map = ensure_mapping(node);
            node = map
                .entry(Value::String((*segment).to_string()))
                .or_insert_with(|| Value::Mapping(Mapping::new()));
        }

        let map = ensure_mapping(node);
        map.insert(Value::String((*last).to_string()), value);
    }

    /// A top-level section as a mapping; empty if absent or not a mapping.
    pub fn section(&self, name: &str) -> Mapping {
        self.get(name)
            .and_then(Value::as_mapping)
            .cloned()
            .unwrap_or_default()
    }

    /// Shallow-merge `partial` over a top-level section: new keys win,
    /// keys absent from `partial` are retained.
    pub fn merge_section(&mut self, name: &str, partial: Mapping) {
        let mut section = self.section(name);
        for (key, value) in partial {
            section.insert(key, value);
        }
        self.set(name, Value::Mapping(section));
    }

    /// Recursively merge `overlay` onto this document: mappings merge
    /// key-wise, scalars and sequences in the overlay replace.
    pub fn deep_merge(&mut self, overlay: &Value) {
        deep_merge_value(&mut self.root, overlay);
    }
}

fn ensure_mapping(node: &mut Value) -> &mut Mapping {
    if !matches!(node, Value::Mapping(_)) {
        *node = Value::Mapping(Mapping::new());
    }
    match node {
        Value::Mapping(map) => map,
        _ => unreachable!("node was just replaced with a mapping"),
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

fn deep_merge_value(base: &mut Value, overlay: &Value) {
    match (base, overlay) {
        (Value::Mapping(base_map), Value::Mapping(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(key) {
                    Some(slot) => deep_merge_value(slot, value),
                    None => {
                        base_map.insert(key.clone(), value.clone());
                    }
                }
            }
        }
        (slot, value) => *slot = value.clone(),
    }
}

/// File-backed configuration store.
///
/// Owns the in-memory [`ConfigDocument`] and its persistence: loading (with
/// first-run default materialization), whole-file rewrite on save, backups
/// under `backups/` and named templates under `templates/`.
#[derive(Debug)]
pub struct ConfigStore {
    config_dir: PathBuf,
    config_file: PathBuf,
    document: ConfigDocument,
}

impl ConfigStore {
    pub const DEFAULT_CONFIG_DIR: &'static str = "/etc/ols-cpanel";
    const CONFIG_FILE_NAME: &'static str = "config.yaml";

    /// Open the store rooted at `config_dir`, loading the backing file or
    /// materializing the default document on first run.
    pub fn open(config_dir: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let config_dir = config_dir.into();
        let config_file = config_dir.join(Self::CONFIG_FILE_NAME);
        let mut store = Self {
            config_dir,
            config_file,
            document: ConfigDocument::default(),
        };
        store.load()?;
        Ok(store)
    }

    /// Path of the backing configuration file.
    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    /// The in-memory document.
    pub fn document(&self) -> &ConfigDocument {
        &self.document
    }

    /// Load the backing document, creating the default one if the file does
    /// not exist yet.
    pub fn load(&mut self) -> Result<(), ConfigError> {
        if !self.config_file.exists() {
            self.create_default_config()?;
            return Ok(());
        }

        let contents = fs::read_to_string(&self.config_file)
            .map_err(|e| ConfigError::io(&self.config_file, e))?;
        self.document = ConfigDocument::new(serde_norway::from_str(&contents).map_err(|e| {
            ConfigError::Parse {
                path: self.config_file.clone(),
                source: e,
            }
        })?);

        info!(file = ?self.config_file, "configuration loaded");
        Ok(())
    }

    /// Re-read the backing file, discarding in-memory changes.
    pub fn reload(&mut self) -> Result<(), ConfigError> {
        self.load()?;
        info!("configuration reloaded");
        Ok(())
    }

    /// Serialize the in-memory document and overwrite the backing file.
    ///
    /// The file is left owner read-write, group read, no world access.
    pub fn save(&self) -> Result<(), ConfigError> {
        if let Some(parent) = self.config_file.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::io(parent, e))?;
        }

        let yaml = serde_norway::to_string(self.document.as_value()).map_err(|e| {
            ConfigError::Parse {
                path: self.config_file.clone(),
                source: e,
            }
        })?;
        fs::write(&self.config_file, yaml).map_err(|e| ConfigError::io(&self.config_file, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.config_file, fs::Permissions::from_mode(0o640))
                .map_err(|e| ConfigError::io(&self.config_file, e))?;
        }

        info!(file = ?self.config_file, "configuration saved");
        Ok(())
    }

    fn create_default_config(&mut self) -> Result<(), ConfigError> {
        self.document = ConfigDocument::built_in_defaults();
        self.save()?;
        info!(file = ?self.config_file, "default configuration created");
        Ok(())
    }

    /// Dotted-path lookup into the live document.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.document.get(path)
    }

    pub fn get_str<'a>(&'a self, path: &str, default: &'a str) -> &'a str {
        self.document.get_str(path, default)
    }

    pub fn get_i64(&self, path: &str, default: i64) -> i64 {
        self.document.get_i64(path, default)
    }

    pub fn get_bool(&self, path: &str, default: bool) -> bool {
        self.document.get_bool(path, default)
    }

    pub fn has(&self, path: &str) -> bool {
        self.document.has(path)
    }

    /// Dotted-path assignment into the live document (in memory only; call
    /// [`ConfigStore::save`] to persist).
    pub fn set(&mut self, path: &str, value: Value) {
        self.document.set(path, value);
    }

    pub fn server(&self) -> Mapping {
        self.document.section("server")
    }

    pub fn performance(&self) -> Mapping {
        self.document.section("performance")
    }

    pub fn security(&self) -> Mapping {
        self.document.section("security")
    }

    pub fn logging(&self) -> Mapping {
        self.document.section("logging")
    }

    /// Shallow-merge `partial` over the `server` section and persist.
    pub fn update_server(&mut self, partial: Mapping) -> Result<(), ConfigError> {
        self.document.merge_section("server", partial);
        self.save()
    }

    /// Shallow-merge `partial` over the `performance` section and persist.
    pub fn update_performance(&mut self, partial: Mapping) -> Result<(), ConfigError> {
        self.document.merge_section("performance", partial);
        self.save()
    }

    /// Shallow-merge `partial` over the `security` section and persist.
    pub fn update_security(&mut self, partial: Mapping) -> Result<(), ConfigError> {
        self.document.merge_section("security", partial);
        self.save()
    }

    /// Check the document for known-bad values.
    ///
    /// Returns human-readable error strings rather than failing; only the
    /// server identity and the performance limits are checked.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if is_blank(self.get("server.name")) {
            errors.push("Server name is required".to_string());
        }

        if is_blank(self.get("server.version")) {
            errors.push("Server version is required".to_string());
        }

        let max_connections = self.get_i64("performance.max_connections", 0);
        if max_connections <= 0 || max_connections > 100_000 {
            errors.push("Max connections must be between 1 and 100000".to_string());
        }

        let cache_size = self.get_i64("performance.cache_size_mb", 0);
        if !(0..=32_768).contains(&cache_size) {
            errors.push("Cache size must be between 0 and 32GB".to_string());
        }

        errors
    }

    /// Copy the backing file into `backups/` with a second-resolution
    /// timestamp suffix and return the backup path.
    pub fn backup(&self) -> Result<PathBuf, ConfigError> {
        let backup_dir = self.config_dir.join("backups");
        fs::create_dir_all(&backup_dir).map_err(|e| ConfigError::io(&backup_dir, e))?;

        let timestamp = chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S");
        let backup_file = backup_dir.join(format!("config_{timestamp}.yaml"));

        fs::copy(&self.config_file, &backup_file)
            .map_err(|e| ConfigError::io(&backup_file, e))?;

        info!(backup = ?backup_file, "configuration backed up");
        Ok(backup_file)
    }

    /// Overwrite the live file with a backup and reload.
    pub fn restore(&mut self, backup_file: &Path) -> Result<(), ConfigError> {
        if !backup_file.exists() {
            return Err(ConfigError::NotFound {
                path: backup_file.to_path_buf(),
            });
        }

        fs::copy(backup_file, &self.config_file)
            .map_err(|e| ConfigError::io(&self.config_file, e))?;
        self.load()?;

        info!(backup = ?backup_file, "configuration restored");
        Ok(())
    }

    /// Load a named template document from `templates/`.
    pub fn template(&self, name: &str) -> Result<Value, ConfigError> {
        let template_file = self.config_dir.join("templates").join(format!("{name}.yaml"));
        if !template_file.exists() {
            return Err(ConfigError::NotFound {
                path: template_file,
            });
        }

        let contents = fs::read_to_string(&template_file)
            .map_err(|e| ConfigError::io(&template_file, e))?;
        serde_norway::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: template_file,
            source: e,
        })
    }

    /// Deep-merge a named template and then `overrides` onto the current
    /// document, and persist the result.
    pub fn apply_template(&mut self, name: &str, overrides: &Value) -> Result<(), ConfigError> {
        let template = self.template(name)?;
        self.document.deep_merge(&template);
        if !overrides.is_null() {
            self.document.deep_merge(overrides);
        }

        if let Err(e) = self.save() {
            warn!(template = name, error = %e, "template applied but save failed");
            return Err(e);
        }
        Ok(())
    }
}
