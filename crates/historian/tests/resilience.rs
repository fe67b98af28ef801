//! End-to-end behaviour of the resilient core over a scripted transport.

use std::sync::Arc;
use std::time::Duration;

use canary_core::config::{HistorianConfig, ResilienceConfig};
use canary_core::{CanaryError, Config};
use canary_historian::testing::ScriptedTransport;
use canary_historian::{CanaryClient, CircuitState, TransportError};
use serde_json::json;

fn config(threshold: u32, max_bytes: usize) -> Config {
    Config {
        historian: HistorianConfig {
            api_token: Some("api-token".into()),
            ..Default::default()
        },
        resilience: ResilienceConfig {
            retry_max_attempts: 2,
            retry_base_delay_ms: 10,
            retry_max_delay_ms: 50,
            retry_jitter_ms: 0,
            circuit_failure_threshold: threshold,
            circuit_reset_timeout_secs: 60,
            response_max_bytes: max_bytes,
        },
        ..Default::default()
    }
}

fn client(transport: &Arc<ScriptedTransport>, threshold: u32, max_bytes: usize) -> CanaryClient {
    CanaryClient::with_transport(&config(threshold, max_bytes), transport.clone())
}

fn tags(paths: &[&str]) -> Vec<String> {
    paths.iter().map(|p| p.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn open_breaker_fails_fast_without_network() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always_fail("getCurrentValues", TransportError::Connect("refused".into())),
    );
    let client = client(&transport, 2, 1_000_000);
    let paths = tags(&["Plant.Kiln6.ShellTemp"]);

    for _ in 0..2 {
        let err = client.get_current_values(&paths, true).await.unwrap_err();
        assert!(matches!(err, CanaryError::UpstreamUnavailable { attempts: 2, .. }));
    }
    assert_eq!(client.core().health().breaker.state, CircuitState::Open);
    let sent = transport.data_calls();

    let err = client.get_current_values(&paths, true).await.unwrap_err();
    match err {
        CanaryError::CircuitOpen { remaining_secs } => assert!(remaining_secs > 0 && remaining_secs <= 60),
        other => panic!("expected circuit_open, got {:?}", other),
    }
    assert_eq!(transport.data_calls(), sent);
}

#[tokio::test(start_paused = true)]
async fn breaker_recovers_after_cooldown() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .fail("getCurrentValues", TransportError::Timeout(Duration::from_secs(30)))
            .fail("getCurrentValues", TransportError::Timeout(Duration::from_secs(30)))
            .respond("getCurrentValues", json!({"data": {"A.B": [{"t": "2024-05-01T00:00:00Z", "v": 1}]}})),
    );
    let client = client(&transport, 1, 1_000_000);
    let paths = tags(&["A.B"]);

    assert!(client.get_current_values(&paths, true).await.is_err());
    assert!(matches!(
        client.get_current_values(&paths, true).await,
        Err(CanaryError::CircuitOpen { .. })
    ));

    tokio::time::advance(Duration::from_secs(61)).await;
    let fetched = client.get_current_values(&paths, true).await.unwrap();
    assert_eq!(fetched.value.len(), 1);
    assert_eq!(client.core().health().breaker.state, CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .fail("browseTags", TransportError::Status { status: 503, body: "busy".into() })
            .respond("browseTags", json!({"tags": ["Plant.Kiln6.ShellTemp"]})),
    );
    let client = client(&transport, 5, 1_000_000);

    let fetched = client.browse_tags(None, Some("shell"), true, false).await.unwrap();
    assert_eq!(fetched.value, vec!["Plant.Kiln6.ShellTemp"]);
    assert_eq!(transport.calls("browseTags"), 2);
    assert_eq!(client.core().health().breaker.consecutive_failures, 0);
}

#[tokio::test]
async fn permanent_rejection_is_not_retried_and_keeps_breaker_closed() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always_fail("getTagProperties", TransportError::Status { status: 400, body: "bad tag".into() }),
    );
    let client = client(&transport, 1, 1_000_000);

    let err = client.get_tag_properties(&tags(&["A.B"]), false).await.unwrap_err();
    assert!(matches!(err, CanaryError::Upstream { status: 400, .. }));
    assert_eq!(transport.calls("getTagProperties"), 1);
    assert_eq!(client.core().health().breaker.state, CircuitState::Closed);
}

#[tokio::test]
async fn rate_limited_request_fails_once_without_retry() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always_fail("browseTags", TransportError::Status { status: 429, body: String::new() }),
    );
    let client = client(&transport, 1, 1_000_000);

    let err = client.browse_tags(Some("Plant"), None, true, true).await.unwrap_err();
    assert!(matches!(err, CanaryError::Upstream { status: 429, .. }));
    assert_eq!(err.error_type(), "upstream_error");
    assert_eq!(transport.calls("browseTags"), 1);
    assert_eq!(client.core().health().breaker.state, CircuitState::Closed);
}

#[tokio::test]
async fn rejected_session_reauthenticates_once() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .respond("getSessionToken", json!({"sessionToken": "s1"}))
            .respond("getSessionToken", json!({"sessionToken": "s2"}))
            .fail("getTagProperties", TransportError::Status { status: 401, body: String::new() })
            .respond("getTagProperties", json!({"properties": {"A.B": {"EngUnits": "degC"}}})),
    );
    let client = client(&transport, 5, 1_000_000);

    let fetched = client.get_tag_properties(&tags(&["A.B"]), false).await.unwrap();
    assert_eq!(fetched.value["A.B"].unit.as_deref(), Some("degC"));

    let sent = transport.requests("getTagProperties");
    assert_eq!(sent[0]["sessionToken"], "s1");
    assert_eq!(sent[1]["sessionToken"], "s2");
    assert_eq!(transport.calls("getSessionToken"), 2);
}

#[tokio::test]
async fn second_session_rejection_is_an_authentication_error() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always("getTagProperties", json!({"statusCode": "BadUnauthorized", "errors": ["session expired"]})),
    );
    let client = client(&transport, 1, 1_000_000);

    let err = client.get_tag_properties(&tags(&["A.B"]), false).await.unwrap_err();
    assert_eq!(err.error_type(), "authentication_error");
    assert_eq!(transport.calls("getTagProperties"), 2);
    assert_eq!(transport.calls("getSessionToken"), 2);
    assert_eq!(client.core().health().breaker.state, CircuitState::Closed);
}

#[tokio::test]
async fn invalid_parameters_never_reach_the_transport() {
    let transport = Arc::new(ScriptedTransport::new().with_session());
    let client = client(&transport, 5, 1_000_000);

    let err = client.get_tag_properties(&[], false).await.unwrap_err();
    assert_eq!(err.error_type(), "invalid_query");
    let err = client
        .browse_tags(None, Some("kiln*"), false, false)
        .await
        .unwrap_err();
    assert_eq!(err.error_type(), "invalid_query");
    assert_eq!(transport.total_calls(), 0);
}

#[tokio::test]
async fn oversized_response_is_truncated_and_not_cached() {
    let big: Vec<String> = (0..200).map(|i| format!("Plant.Area{}.Tag{}", i, i)).collect();
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always("browseTags", json!({ "tags": big })),
    );
    let client = client(&transport, 5, 500);

    let fetched = client.browse_tags(None, None, true, false).await.unwrap();
    let truncation = fetched.truncation.expect("truncated");
    assert!(fetched.value.is_empty());
    assert_eq!(truncation.limit_bytes, 500);
    assert!(truncation.original_size_bytes > 500);
    assert!(truncation.preview.len() <= 500);

    client.browse_tags(None, None, true, false).await.unwrap();
    assert_eq!(transport.calls("browseTags"), 2);
}

#[tokio::test]
async fn health_never_exposes_the_session_token() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always("browseNodes", json!({"nodes": ["Kiln6"]})),
    );
    let client = client(&transport, 5, 1_000_000);
    assert!(!client.core().health().session_valid);

    client.browse_nodes(Some("Plant"), false).await.unwrap();
    let health = client.core().health();
    assert!(health.session_valid);
    let rendered = serde_json::to_string(&health).unwrap();
    assert!(!rendered.contains("test-session"));
}
