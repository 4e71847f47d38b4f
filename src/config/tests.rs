use super::load_config;
use super::settings::Settings;
use serial_test::serial;
use std::env;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.broker.default_capacity, 1000);
    assert_eq!(settings.broker.offer_timeout_ms, 100);
    assert_eq!(settings.broker.poll_interval_ms, 100);
    assert_eq!(settings.broker.shutdown_timeout_ms, 1000);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_duration_helpers() {
    let settings = Settings::default();
    assert_eq!(settings.broker.offer_timeout().as_millis(), 100);
    assert_eq!(settings.broker.shutdown_timeout().as_secs(), 1);
}

#[test]
#[serial]
fn load_config_from_file_overrides_defaults() {
    // Point the cwd at a temp dir so load_config picks up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [broker]
        default_capacity = 16
        shutdown_timeout_ms = 2500

        [log]
        level = "debug"
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.broker.default_capacity, 16);
    assert_eq!(cfg.broker.shutdown_timeout_ms, 2500);
    // untouched keys keep their defaults
    assert_eq!(cfg.broker.offer_timeout_ms, 100);
    assert_eq!(cfg.log.level, "debug");
}

#[test]
#[serial]
fn load_config_from_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("SUBCAST_BROKER__DEFAULT_CAPACITY", Some("8")),
            ("SUBCAST_BROKER__OFFER_TIMEOUT_MS", Some("25")),
            ("SUBCAST_LOG__LEVEL", Some("warn")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.default_capacity, 8);
            assert_eq!(cfg.broker.offer_timeout_ms, 25);
            assert_eq!(cfg.broker.poll_interval_ms, 100);
            assert_eq!(cfg.log.level, "warn");
        },
    );
}

#[test]
#[serial]
fn load_config_without_sources_yields_defaults() {
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    assert_eq!(cfg.expect("load_config failed"), Settings::default());
}
