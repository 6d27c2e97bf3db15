use chapterforge::load_config::{
    load_config, resolve_settings, Overrides, API_KEY_ENV, DEFAULT_MODEL,
};
use chapterforge_core::config::{BoundaryStrategy, DeliveryMode, FailurePolicy};
use serial_test::serial;
use std::env;
use std::fs::write;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

#[test]
#[serial]
fn full_config_is_loaded_and_mapped() {
    let file = config_file(
        r#"
pipeline:
  max_concurrency: 3
  max_attempts: 4
  retry_jitter_ms: 250
  boundary: next_title
  delivery: streaming
  on_unit_failure: continue
service:
  model: gemini-2.5-pro
  endpoint: http://localhost:8080/
  upload: false
"#,
    );
    env::set_var(API_KEY_ENV, "from-env");

    let config = load_config(file.path()).expect("Config should load");
    let settings = resolve_settings(Some(config), Overrides::default()).unwrap();

    assert_eq!(settings.pipeline.max_concurrency, 3);
    assert_eq!(settings.pipeline.max_attempts, 4);
    assert_eq!(settings.pipeline.retry_jitter_ms, 250);
    assert_eq!(settings.pipeline.boundary, BoundaryStrategy::NextTitle);
    assert_eq!(settings.pipeline.delivery, DeliveryMode::Streaming);
    assert_eq!(settings.pipeline.on_unit_failure, FailurePolicy::Continue);
    assert_eq!(settings.service.model, "gemini-2.5-pro");
    assert!(!settings.service.upload);
    assert_eq!(settings.api_key, "from-env");
}

#[test]
#[serial]
fn missing_sections_fall_back_to_defaults() {
    let file = config_file("pipeline:\n  max_concurrency: 2\n");
    env::set_var(API_KEY_ENV, "from-env");

    let settings = resolve_settings(Some(load_config(file.path()).unwrap()), Overrides::default()).unwrap();

    assert_eq!(settings.pipeline.max_concurrency, 2);
    assert_eq!(settings.pipeline.max_attempts, 3);
    assert_eq!(settings.pipeline.boundary, BoundaryStrategy::Sentences);
    assert_eq!(settings.pipeline.delivery, DeliveryMode::Batch);
    assert_eq!(settings.pipeline.on_unit_failure, FailurePolicy::Abort);
    assert_eq!(settings.service.model, DEFAULT_MODEL);
    assert!(settings.service.upload);
}

#[test]
#[serial]
fn flags_override_file_and_environment() {
    let file = config_file("pipeline:\n  max_concurrency: 2\nservice:\n  model: from-file\n");
    env::set_var(API_KEY_ENV, "from-env");

    let settings = resolve_settings(
        Some(load_config(file.path()).unwrap()),
        Overrides {
            api_key: Some("from-flag".into()),
            model: Some("from-flag-model".into()),
            concurrency: Some(7),
            stream: true,
            keep_going: true,
        },
    )
    .unwrap();

    assert_eq!(settings.api_key, "from-flag");
    assert_eq!(settings.service.model, "from-flag-model");
    assert_eq!(settings.pipeline.max_concurrency, 7);
    assert_eq!(settings.pipeline.delivery, DeliveryMode::Streaming);
    assert_eq!(settings.pipeline.on_unit_failure, FailurePolicy::Continue);
}

#[test]
#[serial]
fn no_file_and_no_key_is_an_error() {
    env::remove_var(API_KEY_ENV);

    let err = resolve_settings(None, Overrides::default()).unwrap_err();

    assert!(err.to_string().contains(API_KEY_ENV));
}

#[test]
#[serial]
fn zero_attempts_is_rejected() {
    let file = config_file("pipeline:\n  max_attempts: 0\n");
    env::set_var(API_KEY_ENV, "from-env");

    let err = resolve_settings(Some(load_config(file.path()).unwrap()), Overrides::default()).unwrap_err();

    assert!(format!("{err:#}").contains("max_attempts"));
}

#[test]
fn invalid_yaml_is_reported() {
    let file = config_file("pipeline: [not, a, map\n");
    let err = load_config(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn unreadable_file_is_reported() {
    let err = load_config("/definitely/not/here.yaml").unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
