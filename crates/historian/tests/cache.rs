//! Client responses flowing through the response cache.

use std::sync::Arc;
use std::time::Duration;

use canary_core::config::{CacheConfig, HistorianConfig};
use canary_core::Config;
use canary_historian::testing::ScriptedTransport;
use canary_historian::{CanaryClient, DataRequest};
use chrono::{TimeZone, Utc};
use serde_json::json;

fn client(transport: &Arc<ScriptedTransport>) -> CanaryClient {
    let config = Config {
        historian: HistorianConfig {
            api_token: Some("api-token".into()),
            ..Default::default()
        },
        cache: CacheConfig {
            metadata_ttl_secs: 3600,
            timeseries_ttl_secs: 300,
            namespace_ttl_secs: 3600,
            max_mb: 1,
        },
        ..Default::default()
    };
    CanaryClient::with_transport(&config, transport.clone())
}

fn data_transport() -> Arc<ScriptedTransport> {
    Arc::new(
        ScriptedTransport::new().with_session().always(
            "getTagData",
            json!({"data": {"A.B": [
                {"t": "2024-05-01T00:00:00Z", "v": 1.0, "q": 192},
                {"t": "2024-05-01T00:01:00Z", "v": 2.0, "q": 192},
            ]}}),
        ),
    )
}

fn request() -> DataRequest {
    DataRequest::new(
        vec!["A.B".into()],
        Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap(),
        1000,
    )
}

#[tokio::test]
async fn repeated_reads_hit_the_cache() {
    let transport = data_transport();
    let client = client(&transport);

    let first = client.get_tag_data(&request(), false).await.unwrap();
    let second = client.get_tag_data(&request(), false).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(first.value.sample_count(), 2);
    assert_eq!(transport.calls("getTagData"), 1);

    let stats = client.cache().stats();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn bypass_always_goes_upstream() {
    let transport = data_transport();
    let client = client(&transport);

    client.get_tag_data(&request(), false).await.unwrap();
    client.get_tag_data(&request(), true).await.unwrap();
    assert_eq!(transport.calls("getTagData"), 2);
}

#[tokio::test]
async fn cached_bytes_are_stable_across_reads() {
    let transport = data_transport();
    let client = client(&transport);
    client.get_tag_data(&request(), false).await.unwrap();

    let keys_before = client.cache().stats().entries;
    let key = canary_historian::cache_key(
        "getTagData",
        &json!({
            "tags": ["A.B"],
            "startTime": "2024-05-01T00:00:00.000Z",
            "endTime": "2024-05-01T01:00:00.000Z",
            "maxSize": 1000,
        }),
    );
    let a = client.cache().get_raw(&key).expect("cached");
    let b = client.cache().get_raw(&key).expect("cached");
    assert_eq!(a, b);
    assert_eq!(keys_before, 1);
}

#[tokio::test(start_paused = true)]
async fn timeseries_entries_expire_after_their_ttl() {
    let transport = data_transport();
    let client = client(&transport);

    client.get_tag_data(&request(), false).await.unwrap();
    tokio::time::advance(Duration::from_secs(299)).await;
    client.get_tag_data(&request(), false).await.unwrap();
    assert_eq!(transport.calls("getTagData"), 1);

    tokio::time::advance(Duration::from_secs(2)).await;
    client.get_tag_data(&request(), false).await.unwrap();
    assert_eq!(transport.calls("getTagData"), 2);
}

#[tokio::test]
async fn invalidate_all_is_idempotent() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .with_session()
            .always("browseTags", json!({"tags": ["A.B"]}))
            .always("getTagProperties", json!({"properties": {"A.B": {"Description": "x"}}})),
    );
    let client = client(&transport);
    client.browse_tags(Some("A"), None, false, false).await.unwrap();
    client.get_tag_properties(&["A.B".to_string()], false).await.unwrap();

    assert_eq!(client.cache().invalidate("browseTags*"), 1);
    assert_eq!(client.cache().invalidate(""), 1);
    assert_eq!(client.cache().invalidate(""), 0);

    client.browse_tags(Some("A"), None, false, false).await.unwrap();
    assert_eq!(transport.calls("browseTags"), 2);
}
