//! Configuration loading from TOML files and environment overrides.

use std::io::Write;

use courier_core::config::{BrokerBackend, ConfigLoader, CourierConfig, KafkaCompression};
use tempfile::NamedTempFile;

const KAFKA_TOML: &str = r#"
environment = "production"

[broker]
backend = "kafka"

[broker.kafka]
bootstrap_servers = "kafka-1:9092"
topic_prefix = "orders."
compression = "lz4"
max_in_flight = 5
sasl_username = "svc-courier"
sasl_password = "hunter2"

[idempotency]
lease_seconds = 60
record_ttl_seconds = 86400
"#;

fn toml_file(contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_file() {
    let file = toml_file(KAFKA_TOML);

    let config = ConfigLoader::with_env_prefix("COURIER_IT_FILE")
        .load(Some(file.path()))
        .unwrap();

    assert!(config.is_production());
    assert_eq!(config.broker.backend, BrokerBackend::Kafka);
    let kafka = config.broker.kafka.as_ref().unwrap();
    assert_eq!(kafka.topic_for("OrderCreated"), "orders.OrderCreated");
    assert_eq!(kafka.compression, KafkaCompression::Lz4);
    assert_eq!(kafka.sasl_credentials(), Some(("svc-courier", "hunter2")));
    assert_eq!(config.idempotency.lease_seconds, 60);
    assert_eq!(
        config.idempotency.record_ttl().map(|ttl| ttl.as_secs()),
        Some(86400)
    );
}

#[test]
fn test_debug_output_redacts_secrets() {
    let file = toml_file(KAFKA_TOML);
    let config = ConfigLoader::with_env_prefix("COURIER_IT_REDACT")
        .load(Some(file.path()))
        .unwrap();

    let rendered = format!("{config:?}");
    assert!(!rendered.contains("hunter2"));
    assert!(rendered.contains("[REDACTED]"));
}

#[test]
fn test_environment_overrides_file() {
    let file = toml_file(KAFKA_TOML);
    std::env::set_var("COURIER_IT_OVERRIDE_BROKER__KAFKA__TOPIC_PREFIX", "staging.");
    std::env::set_var("COURIER_IT_OVERRIDE_BROKER__KAFKA__MAX_IN_FLIGHT", "3");

    let config = ConfigLoader::with_env_prefix("COURIER_IT_OVERRIDE")
        .load(Some(file.path()))
        .unwrap();

    let kafka = config.broker.kafka.unwrap();
    assert_eq!(kafka.topic_prefix, "staging.");
    assert_eq!(kafka.max_in_flight, 3);
    assert_eq!(kafka.bootstrap_servers, "kafka-1:9092");
}

#[test]
fn test_environment_alone_selects_backend() {
    std::env::set_var("COURIER_IT_ENVONLY_BROKER__BACKEND", "rabbitmq");
    std::env::set_var("COURIER_IT_ENVONLY_BROKER__RABBITMQ__EXCHANGE", "billing.events");

    let config = ConfigLoader::with_env_prefix("COURIER_IT_ENVONLY")
        .load(None)
        .unwrap();

    assert_eq!(config.broker.backend, BrokerBackend::Rabbitmq);
    let rabbitmq = config.broker.rabbitmq.unwrap();
    assert_eq!(rabbitmq.exchange, "billing.events");
    assert_eq!(rabbitmq.connection_name, "courier-event-bus");
}

#[test]
fn test_in_flight_above_idempotent_limit_rejected() {
    let error = ConfigLoader::with_env_prefix("COURIER_IT_INFLIGHT")
        .load_str("[broker]\nbackend = \"kafka\"\n\n[broker.kafka]\nmax_in_flight = 10\n")
        .unwrap_err();

    assert_eq!(error.code(), "CONFIGURATION_ERROR");
    assert!(error.to_string().contains("max_in_flight"));
}

#[test]
fn test_selected_backend_requires_section() {
    let error = ConfigLoader::with_env_prefix("COURIER_IT_SECTION")
        .load_str("[broker]\nbackend = \"service_bus\"\n")
        .unwrap_err();

    assert_eq!(error.code(), "CONFIGURATION_ERROR");
    assert!(error.to_string().contains("[broker.service_bus]"));
}

#[test]
fn test_service_bus_section_needs_credentials() {
    let error = ConfigLoader::with_env_prefix("COURIER_IT_SBUS")
        .load_str(
            r#"
            [broker]
            backend = "service_bus"

            [broker.service_bus]
            endpoint = "https://shop.servicebus.windows.net"
            topic = "orders"
            "#,
        )
        .unwrap_err();

    assert!(error.to_string().contains("shared_access_key"));
}

#[test]
fn test_zero_lease_rejected() {
    let error = ConfigLoader::with_env_prefix("COURIER_IT_LEASE")
        .load_str("[idempotency]\nlease_seconds = 0\n")
        .unwrap_err();

    assert!(error.to_string().contains("lease_seconds"));
}

#[test]
fn test_defaults_pass_checks() {
    let config = CourierConfig::default();
    config.check().unwrap();
    assert_eq!(config.broker.backend, BrokerBackend::InMemory);
    assert!(!config.is_production());
}
