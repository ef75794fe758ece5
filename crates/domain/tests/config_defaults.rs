use lace_domain::config::LaceConfig;

#[test]
fn default_config_has_documented_defaults() {
    let config = LaceConfig::default();
    assert_eq!(config.max_tokens, 100_000);
    assert_eq!(config.reserve_tokens, 2_000);
    assert!((config.warning_threshold - 0.8).abs() < f64::EPSILON);
    assert_eq!(config.retry.max_attempts, 10);
    assert!(config.streaming);
}

#[test]
fn explicit_overrides_parse_from_toml() {
    let toml_str = r#"
max_tokens = 5000
streaming = false

[retry]
max_attempts = 3
"#;
    let config: LaceConfig = toml::from_str(toml_str).unwrap();
    assert_eq!(config.max_tokens, 5000);
    assert!(!config.streaming);
    assert_eq!(config.retry.max_attempts, 3);
}
