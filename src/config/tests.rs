use std::env;
use std::fs;

use serial_test::serial;
use tempfile::TempDir;

use super::load_config;
use super::settings::Settings;

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.server.host, "127.0.0.1");
    assert_eq!(settings.server.port, 50051);
    assert_eq!(settings.server.max_connections, 1000);
    assert_eq!(settings.broker.message_ttl_secs, 3600);
    assert_eq!(settings.broker.eviction_interval_secs, 60);
    assert_eq!(settings.log.level, "info");
    assert_eq!(settings.addr(), "127.0.0.1:50051");
}

#[test]
#[serial]
fn test_load_config_from_file_overrides_defaults() {
    // Create a temporary directory and set it as current dir so load_config
    // will pick up config/default.toml from there.
    let tmp = TempDir::new().expect("create tempdir");
    let orig = env::current_dir().expect("current_dir");
    env::set_current_dir(tmp.path()).expect("set current dir");

    fs::create_dir_all("config").expect("create config dir");
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 9000

        [broker]
        message_ttl_secs = 60
    "#;
    fs::write("config/default.toml", toml).expect("write config file");

    let cfg = load_config();
    env::set_current_dir(orig).expect("restore cwd");

    let cfg = cfg.expect("load_config failed");
    assert_eq!(cfg.server.host, "0.0.0.0");
    assert_eq!(cfg.server.port, 9000);
    assert_eq!(cfg.server.max_connections, 1000);
    assert_eq!(cfg.broker.message_ttl_secs, 60);
    assert_eq!(cfg.broker.eviction_interval_secs, 60);
}

#[test]
#[serial]
fn test_load_config_from_env_overrides_defaults() {
    temp_env::with_vars(
        [
            ("TAGSUB__BROKER__MESSAGE_TTL_SECS", Some("15")),
            ("TAGSUB__LOG__LEVEL", Some("debug")),
        ],
        || {
            let cfg = load_config().expect("load_config failed");
            assert_eq!(cfg.broker.message_ttl_secs, 15);
            assert_eq!(cfg.log.level, "debug");
            assert_eq!(cfg.server.port, 50051);
        },
    );
}
