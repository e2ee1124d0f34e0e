//! Integration tests for the metrics endpoint.

use icsguard_core::config::MetricsConfig;
use icsguard_daemon::metrics_server;
use serial_test::serial;

fn config(listen_addr: &str, port: u16, endpoint: &str) -> MetricsConfig {
    MetricsConfig {
        enabled: true,
        listen_addr: listen_addr.to_owned(),
        port,
        endpoint: endpoint.to_owned(),
    }
}

#[test]
fn test_listen_address_parses_ipv4() {
    let addr = metrics_server::listen_address(&config("127.0.0.1", 9109, "/metrics")).unwrap();
    assert_eq!(addr.port(), 9109);
    assert!(addr.ip().is_loopback());
}

#[test]
#[serial]
fn test_install_fails_with_invalid_address() {
    // Given: An unparseable listen address
    let config = config("999.999.999.999", 9109, "/metrics");

    // When/Then: Installing should fail before binding
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("invalid metrics listen address"));
}

#[test]
#[serial]
fn test_install_rejects_custom_endpoint() {
    // Given: An endpoint the built-in listener does not serve
    let config = config("127.0.0.1", 19109, "/prometheus");

    // When/Then: Installing should fail
    let err = metrics_server::install_metrics_recorder(&config).unwrap_err();
    assert!(err.to_string().contains("unsupported metrics endpoint"));
}

#[test]
#[serial]
fn test_install_succeeds_with_valid_config() {
    // Given: A valid loopback configuration on a non-standard port
    let config = config("127.0.0.1", 19110, "/metrics");

    // When: Installing the recorder (once per test binary)
    let result = metrics_server::install_metrics_recorder(&config);

    // Then: Should succeed
    assert!(result.is_ok(), "install failed: {:?}", result.err());
}
