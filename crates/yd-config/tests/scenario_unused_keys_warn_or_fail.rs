use yd_config::{load_layered_yaml_from_strings, report_unused_keys, ConfigMode, UnusedKeyPolicy};

/// scenario_unused_keys_warn_or_fail
///
/// Validates:
/// 1) Unused keys are detected in WARN mode but do not error.
/// 2) Unused keys cause failure in FAIL mode.
/// 3) Keys under consumed prefixes are not flagged.
/// 4) Each mode has its own registry.

const YAML: &str = r#"
allocation:
  global_limit: 150000
  tiers:
    tier_2:
      max_pool_fraction: 0.25
ratings:
  scale: 10000000
legacy:
  db_host: "localhost"
"#;

#[test]
fn warn_mode_reports_unused_keys_without_error() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).expect("config load must succeed");
    let report = report_unused_keys(
        ConfigMode::Allocate,
        &loaded.config_json,
        UnusedKeyPolicy::Warn,
    )
    .expect("warn mode must not error");

    assert!(!report.is_clean());
    assert!(report
        .unused_leaf_pointers
        .contains(&"/legacy/db_host".to_string()));
    // /ratings is a RATE key; allocate does not read it.
    assert!(report
        .unused_leaf_pointers
        .contains(&"/ratings/scale".to_string()));
}

#[test]
fn fail_mode_errors_on_unused_keys() {
    let loaded = load_layered_yaml_from_strings(&[YAML]).expect("config load must succeed");
    let result = report_unused_keys(ConfigMode::Rate, &loaded.config_json, UnusedKeyPolicy::Fail);
    let msg = format!("{:?}", result.err().unwrap());
    assert!(msg.contains("CONFIG_UNUSED_KEYS"), "{msg}");
    assert!(msg.contains("mode=RATE"), "{msg}");
}

#[test]
fn consumed_prefix_covers_nested_keys() {
    let yaml = r#"
allocation:
  global_limit: 1000
  tiers:
    tier_1:
      base_fraction: 0.5
  solver:
    max_iterations: 100
exports:
  root: "out"
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(
        ConfigMode::Allocate,
        &loaded.config_json,
        UnusedKeyPolicy::Fail,
    )
    .expect("all keys are consumed in ALLOCATE mode");
    assert!(report.is_clean());
}

#[test]
fn unused_pointers_are_sorted() {
    let yaml = r#"
zzz: 1
aaa: 2
mmm: { x: 3 }
"#;
    let loaded = load_layered_yaml_from_strings(&[yaml]).unwrap();
    let report = report_unused_keys(ConfigMode::Rate, &loaded.config_json, UnusedKeyPolicy::Warn)
        .unwrap();
    assert_eq!(
        report.unused_leaf_pointers,
        vec!["/aaa".to_string(), "/mmm/x".to_string(), "/zzz".to_string()]
    );
}
