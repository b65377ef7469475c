//! Failure injection tests for the outbound connector pipeline.

use std::time::{Duration, Instant};

use platform_gateway::connectors::OutboundResponse;
use platform_gateway::resilience::CircuitState;
use platform_gateway::security::Credentials;
use platform_gateway::{GatewayError, Platform};

mod common;

const TIKTOK_OK: &str = r#"{"code":0,"message":"Success","data":{"shops":[]}}"#;

#[tokio::test]
async fn test_retry_on_server_errors() {
    let transport = common::MockTransport::new(|n, _| async move {
        if n < 3 {
            Ok(OutboundResponse::new(503, "Service Unavailable"))
        } else {
            Ok(OutboundResponse::new(200, TIKTOK_OK))
        }
    });
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("tiktok").unwrap();

    let ok = connector
        .authenticate(&Credentials::new(common::tiktok_credentials()))
        .await
        .unwrap();

    assert!(ok, "Should eventually succeed after retries");
    assert_eq!(transport.calls(), 3);
    let snapshot = factory.services().circuits.breaker("tiktok").snapshot();
    assert_eq!(snapshot.state, CircuitState::Closed);
    assert_eq!(snapshot.consecutive_failures, 0);
}

#[tokio::test]
async fn test_circuit_opens_after_repeated_outages() {
    let transport = common::MockTransport::fixed(503, "down");
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("tiktok").unwrap();
    let creds = Credentials::new(common::tiktok_credentials());

    // One exhausted retry loop counts as one breaker failure.
    let first = connector.authenticate(&creds).await.unwrap_err();
    assert_eq!(first.reason_code(), "platform_error");
    assert_eq!(transport.calls(), 3);
    assert_eq!(factory.services().circuits.state("tiktok"), CircuitState::Closed);

    connector.authenticate(&creds).await.unwrap_err();
    assert_eq!(transport.calls(), 6);
    assert_eq!(factory.services().circuits.state("tiktok"), CircuitState::Open);

    let rejected = connector.authenticate(&creds).await.unwrap_err();
    assert_eq!(rejected.reason_code(), "circuit_open");
    assert_eq!(transport.calls(), 6, "Open circuit must not reach the platform");
    assert_eq!(factory.statistics().open_circuits, 1);

    // Other platforms keep their own circuit.
    assert_eq!(factory.services().circuits.state("lazada"), CircuitState::Closed);
}

#[tokio::test]
async fn test_auth_rejections_do_not_trip_circuit() {
    let transport = common::MockTransport::fixed(401, "unauthorized");
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("tiktok").unwrap();
    let creds = Credentials::new(common::tiktok_credentials());

    for _ in 0..4 {
        assert!(!connector.authenticate(&creds).await.unwrap());
    }

    assert_eq!(transport.calls(), 4, "Auth failures are not retried");
    assert_eq!(factory.services().circuits.state("tiktok"), CircuitState::Closed);
    let metrics = factory.services().monitor.get_security_metrics(Platform::Tiktok);
    assert_eq!(metrics.total_auth_failures, 4);
    assert_eq!(metrics.total_requests, 4);
}

#[tokio::test]
async fn test_timeout_enforced() {
    let mut config = common::test_config();
    config.http.timeout_secs = 1;
    config.retries.max_attempts = 1;
    let transport = common::MockTransport::new(|_, _| async {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(OutboundResponse::new(200, TIKTOK_OK))
    });
    let factory = common::factory(&config, transport);
    let connector = factory.create("tiktok").unwrap();

    let started = Instant::now();
    let err = connector
        .authenticate(&Credentials::new(common::tiktok_credentials()))
        .await
        .unwrap_err();

    assert_eq!(err.reason_code(), "timeout");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_network_errors_retried() {
    let transport = common::MockTransport::new(|n, _| async move {
        if n == 1 {
            Err(GatewayError::Network("connection reset".into()))
        } else {
            Ok(OutboundResponse::new(200, r#"{"code":"0","data":{"name":"Seller"}}"#))
        }
    });
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("lazada").unwrap();

    let ok = connector
        .authenticate(&Credentials::new(common::lazada_credentials()))
        .await
        .unwrap();
    assert!(ok);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_platform_rate_limit_short_hint_retried() {
    let transport = common::MockTransport::new(|n, _| async move {
        if n == 1 {
            Ok(OutboundResponse::new(429, "slow down").with_header("Retry-After", "0"))
        } else {
            Ok(OutboundResponse::new(200, TIKTOK_OK))
        }
    });
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("tiktok").unwrap();

    assert!(connector
        .authenticate(&Credentials::new(common::tiktok_credentials()))
        .await
        .unwrap());
    assert_eq!(transport.calls(), 2);
    assert_eq!(factory.services().circuits.state("tiktok"), CircuitState::Closed);
}

#[tokio::test]
async fn test_platform_rate_limit_long_hint_not_retried() {
    let transport = common::MockTransport::new(|_, _| async {
        Ok(OutboundResponse::new(429, "slow down").with_header("Retry-After", "7"))
    });
    let factory = common::factory(&common::test_config(), transport.clone());
    let connector = factory.create("tiktok").unwrap();

    let err = connector
        .authenticate(&Credentials::new(common::tiktok_credentials()))
        .await
        .unwrap_err();

    match err {
        GatewayError::RateLimitExceeded { platform, retry_after } => {
            assert_eq!(platform, Platform::Tiktok);
            assert_eq!(retry_after, Some(Duration::from_secs(7)));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(transport.calls(), 1);
    assert_eq!(factory.services().circuits.state("tiktok"), CircuitState::Closed);
}

#[tokio::test]
async fn test_local_rate_limit_enforcement() {
    let mut config = common::test_config();
    config.monitoring.enforce_rate_limits = true;
    config.platforms.tiktok.rate_limit.burst_limit = 2;
    config.platforms.tiktok.rate_limit.burst_window_secs = 60;
    let transport = common::MockTransport::fixed(200, TIKTOK_OK);
    let factory = common::factory(&config, transport.clone());
    let connector = factory.create("tiktok").unwrap();
    let creds = Credentials::new(common::tiktok_credentials());

    assert!(connector.authenticate(&creds).await.unwrap());
    assert!(connector.authenticate(&creds).await.unwrap());
    let err = connector.authenticate(&creds).await.unwrap_err();

    assert_eq!(err.reason_code(), "rate_limited");
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn test_rate_limit_observe_only_by_default() {
    let mut config = common::test_config();
    config.platforms.tiktok.rate_limit.burst_limit = 2;
    config.platforms.tiktok.rate_limit.burst_window_secs = 60;
    let transport = common::MockTransport::fixed(200, TIKTOK_OK);
    let factory = common::factory(&config, transport.clone());
    let connector = factory.create("tiktok").unwrap();
    let creds = Credentials::new(common::tiktok_credentials());

    for _ in 0..3 {
        assert!(connector.authenticate(&creds).await.unwrap());
    }

    assert_eq!(transport.calls(), 3);
    let metrics = factory.services().monitor.get_security_metrics(Platform::Tiktok);
    assert!(!metrics.suspicious_activity.is_empty());
}
