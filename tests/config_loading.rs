use std::io::Write;

use conflux_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
max_steps = 64
event_capacity = 128

[gateway]
bind = "0.0.0.0:9999"
token = "test-token"

[store]
path = "/tmp/conflux-test/runs.db"

[systems.library]
base_url = "https://volvox.example.com/api/v1"
api_key = "vx-key"

[systems.search]
base_url = "https://smart.example.com"

[systems.analysis]
base_url = "https://innoscope.example.com"
timeout_secs = 600

[systems.proposal]
base_url = "https://kickstart.example.com"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.max_steps, 64);
    assert_eq!(config.engine.event_capacity, 128);

    let gw = config.gateway.expect("gateway present");
    assert_eq!(gw.bind, "0.0.0.0:9999");
    assert_eq!(gw.token, Some("test-token".to_string()));

    let store = config.store.expect("store present");
    assert_eq!(store.path, "/tmp/conflux-test/runs.db");

    let library = config.systems.library.expect("library present");
    assert_eq!(library.base_url, "https://volvox.example.com/api/v1");
    assert_eq!(library.api_key, Some("vx-key".to_string()));
    assert_eq!(library.timeout_secs, 300);

    let analysis = config.systems.analysis.expect("analysis present");
    assert_eq!(analysis.timeout_secs, 600);
    assert!(config.systems.search.is_some());
    assert!(config.systems.proposal.is_some());
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("CONFLUX_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[systems.library]
base_url = "https://volvox.example.com/api/v1"
api_key = "${CONFLUX_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    let library = config.systems.library.expect("library present");
    assert_eq!(library.api_key, Some("expanded-key-value".to_string()));

    std::env::remove_var("CONFLUX_TEST_API_KEY");
}

#[test]
fn test_missing_config_file() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/conflux.toml")).unwrap_err();
    assert!(matches!(
        err,
        conflux_core::error::ConfluxError::ConfigNotFound(_)
    ));
}

#[test]
fn test_minimal_config_defaults() {
    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(b"").expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(config.engine.max_steps, 256);
    assert!(config.gateway.is_none());
    assert!(config.store.is_none());
    assert!(config.systems.library.is_none());
}
