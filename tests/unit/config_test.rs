//! Tests for configuration validation and loading

use std::collections::HashMap;
use std::time::Duration;

use prometheus_dispatcher::config::DispatcherConfig;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn test_dispatcher_config_defaults() {
    let cfg = DispatcherConfig::new(60, 90_000);
    assert!(cfg.validate().is_ok());
    assert_eq!(cfg.request_cycle(), Duration::from_secs(60));
    assert_eq!(cfg.token_cycle(), Duration::from_secs(60));
    assert_eq!(cfg.safety_margin(), Duration::from_secs(10));
    assert_eq!(cfg.connect_timeout(), Duration::from_secs(5));
    assert_eq!(cfg.read_timeout(), Duration::from_secs(60));
    assert_eq!(cfg.demote_after_failures, None);
}

#[test]
fn test_dispatcher_config_invalid_capacity() {
    assert!(DispatcherConfig::new(0, 10).validate().is_err());
    assert!(DispatcherConfig::new(10, 0).validate().is_err());
}

#[test]
fn test_dispatcher_config_invalid_timeouts() {
    let cfg = DispatcherConfig::new(1, 1).with_timeouts_ms(5_000, 1_000);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_dispatcher_config_invalid_demotion() {
    let cfg = DispatcherConfig::new(1, 1).with_demote_after_failures(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_pool_cycle_overrides() {
    let cfg = DispatcherConfig::new(1, 1).with_pool_cycles(30, 90);
    assert_eq!(cfg.request_cycle(), Duration::from_secs(30));
    assert_eq!(cfg.token_cycle(), Duration::from_secs(90));
}

#[test]
fn test_from_json_str_applies_defaults() {
    let cfg = DispatcherConfig::from_json_str(
        r#"{"request_capacity": 3500, "token_capacity": 90000, "safety_margin_ms": 2000}"#,
    )
    .unwrap();
    assert_eq!(cfg.request_capacity, 3500);
    assert_eq!(cfg.cycle_secs, 60);
    assert_eq!(cfg.safety_margin(), Duration::from_secs(2));
}

#[test]
fn test_from_json_str_rejects_invalid() {
    assert!(DispatcherConfig::from_json_str("{not json").is_err());
    let err = DispatcherConfig::from_json_str(r#"{"request_capacity": 0, "token_capacity": 5}"#)
        .unwrap_err();
    assert!(err.contains("request_capacity"));
}

#[test]
fn test_from_lookup_reads_prefixed_vars() {
    let cfg = DispatcherConfig::from_lookup(lookup(&[
        ("DISPATCH_REQUEST_CAPACITY", "20"),
        ("DISPATCH_TOKEN_CAPACITY", " 40000 "),
        ("DISPATCH_TOKEN_CYCLE_SECS", "120"),
        ("DISPATCH_SAFETY_MARGIN_MS", "500"),
        ("DISPATCH_DEMOTE_AFTER_FAILURES", "3"),
    ]))
    .unwrap();
    assert_eq!(cfg.request_capacity, 20);
    assert_eq!(cfg.token_capacity, 40_000);
    assert_eq!(cfg.request_cycle(), Duration::from_secs(60));
    assert_eq!(cfg.token_cycle(), Duration::from_secs(120));
    assert_eq!(cfg.safety_margin(), Duration::from_millis(500));
    assert_eq!(cfg.demote_after_failures, Some(3));
}

#[test]
fn test_from_lookup_requires_capacities() {
    let err = DispatcherConfig::from_lookup(lookup(&[("DISPATCH_TOKEN_CAPACITY", "10")]))
        .unwrap_err();
    assert!(err.to_string().contains("DISPATCH_REQUEST_CAPACITY"));
}

#[test]
fn test_from_lookup_rejects_garbage() {
    let err = DispatcherConfig::from_lookup(lookup(&[
        ("DISPATCH_REQUEST_CAPACITY", "ten"),
        ("DISPATCH_TOKEN_CAPACITY", "10"),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("must be an integer"));
}
