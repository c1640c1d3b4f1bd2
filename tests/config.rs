//! Configuration loading: defaults, required keys, malformed values.

use portfolio_ledger::config::{Config, ConfigError, DEFAULT_BIND_ADDR, DEFAULT_DB_MAX_CONNECTIONS};
use std::collections::HashMap;

fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

#[test]
fn defaults_apply_when_only_secret_is_set() {
    let cfg = Config::from_lookup(lookup(&[("JWT_SECRET", "s3cret")])).unwrap();
    assert_eq!(cfg.jwt_secret, b"s3cret".to_vec());
    assert_eq!(cfg.bind_addr, DEFAULT_BIND_ADDR.parse::<std::net::SocketAddr>().unwrap());
    assert_eq!(cfg.db_max_connections, DEFAULT_DB_MAX_CONNECTIONS);
    assert!(cfg.database_url.is_none());
}

#[test]
fn missing_secret_is_an_error() {
    let err = Config::from_lookup(lookup(&[("JWT_SECRET", "  ")])).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("JWT_SECRET")));
}

#[test]
fn zero_connections_rejected() {
    let err = Config::from_lookup(lookup(&[("JWT_SECRET", "x"), ("DB_MAX_CONNECTIONS", "0")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
}

#[test]
fn bad_bind_addr_rejected() {
    let err = Config::from_lookup(lookup(&[("JWT_SECRET", "x"), ("BIND_ADDR", "nowhere")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { key: "BIND_ADDR", .. }));
}

#[test]
fn debug_output_hides_secrets() {
    let cfg = Config::from_lookup(lookup(&[
        ("JWT_SECRET", "topsecret"),
        ("DATABASE_URL", "postgres://u:pw@host/db"),
    ]))
    .unwrap();
    let shown = format!("{:?}", cfg);
    assert!(!shown.contains("topsecret"));
    assert!(!shown.contains("pw@host"));
}
