use relay_core::config::{ConfigError, ConfigSection, ConfigValue, RelayConfig};

#[test]
fn test_empty_config() {
    let config = RelayConfig::empty();
    assert!(config.get::<String>("nonexistent").is_err());
    assert_eq!(config.profile(), "test");
}

#[test]
fn test_set_and_get() {
    let mut config = RelayConfig::empty();
    config.set("relay.name", ConfigValue::String("test".into()));
    assert_eq!(config.get::<String>("relay.name").unwrap(), "test");
    assert!(config.contains_key("relay.name"));
}

#[test]
fn test_get_or_default() {
    let config = RelayConfig::empty();
    assert_eq!(config.get_or("missing", 42i64).unwrap(), 42);
}

#[test]
fn test_get_or_rejects_bad_value() {
    let mut config = RelayConfig::empty();
    config.set("relay.bus.pool_size", ConfigValue::String("many".into()));
    let err = config.get_or("relay.bus.pool_size", 4usize).unwrap_err();
    assert!(matches!(err, ConfigError::TypeMismatch { expected: "usize", .. }));
}

#[test]
fn test_type_conversions() {
    let mut config = RelayConfig::empty();
    config.set("int_val", ConfigValue::Integer(42));
    config.set("float_val", ConfigValue::Float(2.5));
    config.set("bool_val", ConfigValue::Bool(true));
    config.set("null_val", ConfigValue::Null);
    config.set("env_int", ConfigValue::String("17".into()));
    config.set("negative", ConfigValue::Integer(-1));

    assert_eq!(config.get::<i64>("int_val").unwrap(), 42);
    assert_eq!(config.get::<f64>("float_val").unwrap(), 2.5);
    assert!(config.get::<bool>("bool_val").unwrap());
    assert_eq!(config.get::<String>("int_val").unwrap(), "42");
    assert!(config.get::<Option<u64>>("null_val").unwrap().is_none());
    assert_eq!(config.get::<usize>("env_int").unwrap(), 17);
    assert!(config.get::<usize>("negative").is_err());
}

#[test]
fn test_flatten_yaml() {
    let yaml = r#"
relay:
  bus:
    pool_size: 8
    queue_capacity: ~
  throttle:
    window_ms: 250
"#;
    let config = RelayConfig::from_yaml_str(yaml, "test").unwrap();

    assert_eq!(config.get::<usize>("relay.bus.pool_size").unwrap(), 8);
    assert_eq!(config.get::<Option<usize>>("relay.bus.queue_capacity").unwrap(), None);
    assert_eq!(config.get::<u64>("relay.throttle.window_ms").unwrap(), 250);
}

#[test]
fn test_invalid_yaml_is_load_error() {
    let err = RelayConfig::from_yaml_str("relay: [unclosed", "test").unwrap_err();
    assert!(matches!(err, ConfigError::Load(_)));
}

#[test]
fn test_load_from_dir_profile_overrides_base() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("relay.yaml"),
        "relay:\n  bus:\n    pool_size: 2\n    shutdown_timeout_ms: 5000\n",
    )
    .unwrap();
    std::fs::write(
        dir.path().join("relay-staging.yaml"),
        "relay:\n  bus:\n    pool_size: 6\n",
    )
    .unwrap();

    let config = RelayConfig::load_from_dir(dir.path(), "staging").unwrap();
    assert_eq!(config.get::<usize>("relay.bus.pool_size").unwrap(), 6);
    assert_eq!(config.get::<u64>("relay.bus.shutdown_timeout_ms").unwrap(), 5000);
}

#[test]
fn test_load_from_dir_without_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = RelayConfig::load_from_dir(dir.path(), "dev").unwrap();
    assert!(!config.contains_key("relay.bus.pool_size"));
}

#[test]
fn test_dotenv_file_is_overlaid() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".env"), "RELAY__DOTENV__MARKER=from-dotenv\n").unwrap();

    let config = RelayConfig::load_from_dir(dir.path(), "dev").unwrap();
    assert_eq!(config.get::<String>("relay.dotenv.marker").unwrap(), "from-dotenv");
}

struct Sample {
    workers: usize,
    label: String,
}

impl ConfigSection for Sample {
    fn prefix() -> &'static str {
        "relay.sample"
    }

    fn from_config(config: &RelayConfig) -> Result<Self, ConfigError> {
        Ok(Sample {
            workers: config.get_or(&Self::key("workers"), 1usize)?,
            label: config.get(&Self::key("label"))?,
        })
    }
}

#[test]
fn test_typed_section() {
    let config =
        RelayConfig::from_yaml_str("relay:\n  sample:\n    label: primary\n", "test").unwrap();
    let sample: Sample = config.section().unwrap();
    assert_eq!(sample.workers, 1);
    assert_eq!(sample.label, "primary");

    let missing = RelayConfig::empty().section::<Sample>();
    assert!(matches!(missing, Err(ConfigError::NotFound(key)) if key == "relay.sample.label"));
}
