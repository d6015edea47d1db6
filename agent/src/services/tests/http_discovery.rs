//! Tests for HttpDiscovery against a wiremock registry

use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::common::{channel_watcher, node, with_timeout};
use crate::error::AgentError;
use crate::services::HttpDiscovery;
use crate::traits::Discovery;

fn discovery(server: &MockServer, poll: Duration) -> HttpDiscovery {
    HttpDiscovery::new(server.uri(), poll, Duration::from_secs(1)).unwrap()
}

#[tokio::test]
async fn test_get_and_watch_parses_node_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/businesses/billing/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["10.0.0.1:4545", "10.0.0.2:4545"])))
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_secs(60));
    let (watcher, _rx) = channel_watcher();
    let nodes = discovery.get_and_watch("billing", watcher).await.unwrap();

    assert_eq!(nodes, vec![node("10.0.0.1:4545"), node("10.0.0.2:4545")]);
    assert_eq!(discovery.poller_count(), 1);

    discovery.close().await;
    assert_eq!(discovery.poller_count(), 0);
}

#[tokio::test]
async fn test_registry_failure_is_a_discovery_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/businesses/billing/nodes"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_secs(60));
    let (watcher, _rx) = channel_watcher();
    let result = discovery.get_and_watch("billing", watcher).await;

    assert!(matches!(result, Err(AgentError::DiscoveryError { .. })));
    assert_eq!(discovery.poller_count(), 0);
}

#[tokio::test]
async fn test_poller_notifies_on_change() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/businesses/billing/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["a:1"])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/businesses/billing/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["b:2", "a:1"])))
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_millis(20));
    let (watcher, mut rx) = channel_watcher();
    let initial = discovery.get_and_watch("billing", watcher).await.unwrap();
    assert_eq!(initial, vec![node("a:1")]);

    let changed = with_timeout(rx.recv()).await.unwrap().unwrap();
    assert_eq!(changed, vec![node("a:1"), node("b:2")]);

    // same list on later polls, no second notification
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(rx.try_recv().is_err());

    discovery.close().await;
}

#[tokio::test]
async fn test_announce_presence_puts_identity() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/presence/host_a:1"))
        .and(body_partial_json(json!({
            "businesses": ["billing", "default"],
            "identity": "host_a:1"
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_secs(60));
    discovery
        .announce_presence(&["billing".to_string(), "default".to_string()], "host_a:1")
        .await
        .unwrap();
}

#[tokio::test]
async fn test_business_name_is_percent_encoded() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/businesses/eu%2Fbilling%3Fv=2/nodes"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!(["10.0.0.1:4545"])))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_secs(60));
    let nodes = discovery.fetch_nodes("eu/billing?v=2").await.unwrap();
    assert_eq!(nodes, vec![node("10.0.0.1:4545")]);
}

#[tokio::test]
async fn test_presence_identity_is_one_path_segment() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/presence/host%2Fa_1:1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let discovery = discovery(&server, Duration::from_secs(60));
    discovery
        .announce_presence(&["billing".to_string()], "host/a_1:1")
        .await
        .unwrap();
}

#[test]
fn test_invalid_address_is_a_configuration_error() {
    let result = HttpDiscovery::new("not a url", Duration::from_secs(1), Duration::from_secs(1));
    assert!(matches!(result, Err(AgentError::ConfigurationError { .. })));
}
