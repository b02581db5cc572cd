//! Integration tests for the filesystem-backed configuration store
//!
//! Each test gets its own temporary configuration directory; the store is
//! exercised through the same load/save/backup/restore cycle the CLI uses.

use std::fs;

use rstest::rstest;
use serde_norway::{Mapping, Value};
use tempfile::TempDir;

use ols_cpanel::config::{ConfigError, ConfigStore};

fn open_store(dir: &TempDir) -> ConfigStore {
    ConfigStore::open(dir.path()).expect("store opens")
}

#[test]
fn first_run_materializes_default_config() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    assert!(dir.path().join("config.yaml").exists());
    assert_eq!(store.get_str("server.name", ""), "OpenLiteSpeed");
    assert_eq!(store.get_i64("performance.max_connections", 0), 10_000);
    assert_eq!(store.get_i64("security.ssl_renewal_days_before", 0), 30);
    assert_eq!(store.get_str("logging.level", ""), "INFO");

    // The freshly created default document validates cleanly.
    assert!(store.validate().is_empty());
}

#[test]
fn get_returns_default_for_unset_paths() {
    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);

    assert!(store.get("never.set.path").is_none());
    assert_eq!(store.get_i64("never.set.path", 17), 17);
    assert!(!store.has("never.set.path"));

    // Descending through a scalar is a miss, not a failure.
    assert_eq!(store.get_str("server.name.deeper", "fallback"), "fallback");
}

#[test]
fn set_round_trips_through_save_and_reload() {
    let dir = TempDir::new().unwrap();

    {
        let mut store = open_store(&dir);
        store.set("custom.nested.flag", Value::Bool(true));
        store.set("performance.max_connections", Value::from(2_500));
        store.save().expect("save succeeds");
    }

    let store = open_store(&dir);
    assert!(store.get_bool("custom.nested.flag", false));
    assert_eq!(store.get_i64("performance.max_connections", 0), 2_500);
}

#[test]
fn set_overwrites_scalar_with_mapping() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("a.b", Value::from(1));
    store.set("a.b.c", Value::from(2));
    assert_eq!(store.get_i64("a.b.c", 0), 2);
}

#[test]
fn section_update_merges_shallowly_and_persists() {
    let dir = TempDir::new().unwrap();

    {
        let mut store = open_store(&dir);
        let mut partial = Mapping::new();
        partial.insert(Value::from("max_connections"), Value::from(500));
        partial.insert(Value::from("burst_limit"), Value::from(50));
        store.update_performance(partial).expect("update persists");
    }

    let store = open_store(&dir);
    // Updated key wins, new key lands, untouched keys survive.
    assert_eq!(store.get_i64("performance.max_connections", 0), 500);
    assert_eq!(store.get_i64("performance.burst_limit", 0), 50);
    assert!(store.get_bool("performance.cache_enabled", false));
    assert_eq!(store.get_i64("performance.gzip_level", 0), 6);
}

#[test]
fn section_accessors_default_to_empty_mapping() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    assert!(!store.server().is_empty());
    assert!(!store.security().is_empty());

    // A section that is not a mapping reads as empty rather than failing.
    store.set("logging", Value::Null);
    assert!(store.logging().is_empty());
}

#[test]
fn validate_flags_out_of_range_limits() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("performance.max_connections", Value::from(0));
    let errors = store.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("connections"));

    store.set("performance.max_connections", Value::from(100_001));
    let errors = store.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("connections"));

    store.set("performance.max_connections", Value::from(100));
    store.set("performance.cache_size_mb", Value::from(-1));
    let errors = store.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Cache size"));

    store.set("performance.cache_size_mb", Value::from(40_000));
    let errors = store.validate();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("Cache size"));
}

#[rstest]
#[case(1, true)]
#[case(100_000, true)]
#[case(0, false)]
#[case(100_001, false)]
fn max_connections_boundaries(#[case] value: i64, #[case] valid: bool) {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("performance.max_connections", Value::from(value));
    assert_eq!(store.validate().is_empty(), valid);
}

#[rstest]
#[case(0, true)]
#[case(32_768, true)]
#[case(-1, false)]
#[case(32_769, false)]
fn cache_size_boundaries(#[case] value: i64, #[case] valid: bool) {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("performance.cache_size_mb", Value::from(value));
    assert_eq!(store.validate().is_empty(), valid);
}

#[test]
fn validate_requires_server_identity() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("server.name", Value::String(String::new()));
    store.set("server.version", Value::Null);
    let errors = store.validate();
    assert!(errors.contains(&"Server name is required".to_string()));
    assert!(errors.contains(&"Server version is required".to_string()));
}

#[test]
fn backup_and_restore_discard_interim_changes() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    store.set("server.admin_email", Value::from("ops@example.com"));
    store.save().unwrap();

    let backup = store.backup().expect("backup succeeds");
    assert!(backup.starts_with(dir.path().join("backups")));
    let name = backup.file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("config_"));
    assert!(name.ends_with(".yaml"));

    // Mutate and persist after the backup was taken.
    store.set("server.admin_email", Value::from("intruder@example.com"));
    store.set("server.extra", Value::from("junk"));
    store.save().unwrap();

    store.restore(&backup).expect("restore succeeds");
    assert_eq!(store.get_str("server.admin_email", ""), "ops@example.com");
    assert!(!store.has("server.extra"));
}

#[test]
fn restore_missing_backup_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let missing = dir.path().join("backups/config_2024-01-01_00-00-00.yaml");
    let err = store.restore(&missing).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[test]
fn unparsable_config_file_is_a_parse_error() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("config.yaml"), "server: [unclosed\n").unwrap();

    let err = ConfigStore::open(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn apply_template_deep_merges_template_then_overrides() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let templates = dir.path().join("templates");
    fs::create_dir_all(&templates).unwrap();
    fs::write(
        templates.join("high-traffic.yaml"),
        "performance:\n  max_connections: 50000\n  cache_size_mb: 8192\nserver:\n  name: OpenLiteSpeed-HT\n",
    )
    .unwrap();

    let overrides: Value =
        serde_norway::from_str("performance:\n  cache_size_mb: 16384\n").unwrap();
    store
        .apply_template("high-traffic", &overrides)
        .expect("template applies");

    // Template over current document, overrides over template.
    assert_eq!(store.get_i64("performance.max_connections", 0), 50_000);
    assert_eq!(store.get_i64("performance.cache_size_mb", 0), 16_384);
    assert_eq!(store.get_str("server.name", ""), "OpenLiteSpeed-HT");
    // Untouched siblings survive the merge.
    assert_eq!(store.get_i64("performance.gzip_level", 0), 6);
    assert_eq!(store.get_str("server.admin_email", ""), "root@localhost");

    // And the merged result was persisted.
    let reopened = open_store(&dir);
    assert_eq!(reopened.get_i64("performance.cache_size_mb", 0), 16_384);
}

#[test]
fn apply_missing_template_is_not_found() {
    let dir = TempDir::new().unwrap();
    let mut store = open_store(&dir);

    let err = store
        .apply_template("does-not-exist", &Value::Null)
        .unwrap_err();
    assert!(matches!(err, ConfigError::NotFound { .. }));
}

#[cfg(unix)]
#[test]
fn saved_config_has_restricted_permissions() {
    use std::os::unix::fs::PermissionsExt;

    let dir = TempDir::new().unwrap();
    let store = open_store(&dir);
    store.save().unwrap();

    let mode = fs::metadata(store.config_file()).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o640);
}
