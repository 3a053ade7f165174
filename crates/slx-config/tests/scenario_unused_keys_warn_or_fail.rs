//! scenario_unused_keys_warn_or_fail
//!
//! Invariant under test: leaves outside the consumed registry for a mode are
//! reported in sorted order; `Fail` turns a non-empty report into an error.

use slx_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let yaml = r#"
pipeline:
  concurrency: 3
legacy:
  sheet_id: 42
  tab: orders
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report =
        report_unused_keys(ConfigMode::Post, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();

    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/legacy/sheet_id".to_string(), "/legacy/tab".to_string()]
    );
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let yaml = "legacy:\n  sheet_id: 1\n";
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let err = report_unused_keys(ConfigMode::Post, &loaded.config_json, UnusedKeyPolicy::Fail)
        .unwrap_err();
    assert!(err.to_string().contains("CONFIG_UNUSED_KEYS"));
}

#[test]
fn ingest_mode_does_not_consume_rule_tables() {
    let yaml = r#"
pipeline:
  concurrency: 3
rules:
  default_tax_code: "10"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();

    let ingest =
        report_unused_keys(ConfigMode::Ingest, &loaded.config_json, UnusedKeyPolicy::Warn).unwrap();
    assert_eq!(ingest.unused_leaf_pointers, vec!["/rules/default_tax_code"]);

    let post =
        report_unused_keys(ConfigMode::Post, &loaded.config_json, UnusedKeyPolicy::Fail).unwrap();
    assert!(post.is_clean());
}
