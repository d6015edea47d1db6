//! Unit tests for orchestrator construction against mocked collaborators
//!
//! These pin down how the orchestrator talks to the coordination service
//! and the collector connector, using the mockall-generated mocks.

mod common;

use std::sync::Arc;

use agent::traits::{MockCollectorConnector, MockCollectorPool, MockDiscovery};
use agent::{AgentError, CollectorPool, NodeWatcher, Orchestrator, OrchestratorSettings};
use common::TestFixtures;
use parking_lot::Mutex;

fn accepting_connector() -> MockCollectorConnector {
    let mut connector = MockCollectorConnector::new();
    connector.expect_connect().returning(|_| {
        let mut pool = MockCollectorPool::new();
        pool.expect_append().returning(|_| Ok(()));
        pool.expect_destroy().returning(|| ());
        Ok(Box::new(pool) as Box<dyn CollectorPool>)
    });
    connector
}

/// Test presence is announced once with every business and the process identity
#[tokio::test]
async fn test_presence_announced_after_provisioning() {
    let mut discovery = MockDiscovery::new();
    discovery
        .expect_get_and_watch()
        .times(2)
        .returning(|_, _| Ok(vec![TestFixtures::node_a()]));
    discovery
        .expect_announce_presence()
        .withf(|businesses, identity| {
            businesses == ["billing".to_string(), "default".to_string()]
                && identity.contains(&format!("_{}:{}", TestFixtures::INSTANCE, std::process::id()))
        })
        .times(1)
        .returning(|_, _| Ok(()));
    discovery.expect_close().times(1).returning(|| ());

    let orchestrator = Orchestrator::new(
        TestFixtures::INSTANCE,
        OrchestratorSettings::default(),
        vec!["billing".to_string(), "default".to_string()],
        Vec::new(),
        accepting_connector(),
        discovery,
    )
    .await
    .unwrap();

    assert!(orchestrator.sink("billing").await.is_some());
    assert!(orchestrator.sink("default").await.is_some());
    orchestrator.close().await;
}

/// Test a failed presence announcement does not abort construction
#[tokio::test]
async fn test_presence_failure_is_not_fatal() {
    let mut discovery = MockDiscovery::new();
    discovery
        .expect_get_and_watch()
        .returning(|_, _| Ok(vec![TestFixtures::node_a()]));
    discovery
        .expect_announce_presence()
        .returning(|_, _| Err(AgentError::discovery("registry unavailable")));
    discovery.expect_close().returning(|| ());

    let result = Orchestrator::new(
        TestFixtures::INSTANCE,
        OrchestratorSettings::default(),
        vec!["billing".to_string()],
        Vec::new(),
        accepting_connector(),
        discovery,
    )
    .await;

    let orchestrator = result.unwrap();
    orchestrator.close().await;
}

/// Test a coordination-service failure at startup is fatal and cleans up
#[tokio::test]
async fn test_startup_discovery_failure_is_fatal() {
    let mut discovery = MockDiscovery::new();
    discovery
        .expect_get_and_watch()
        .returning(|_, _| Err(AgentError::discovery("connection refused")));
    discovery.expect_announce_presence().times(0);
    discovery.expect_close().times(1).returning(|| ());

    let result = Orchestrator::new(
        TestFixtures::INSTANCE,
        OrchestratorSettings::default(),
        vec!["billing".to_string()],
        Vec::new(),
        MockCollectorConnector::new(),
        discovery,
    )
    .await;

    assert!(matches!(result, Err(AgentError::DiscoveryError { .. })));
}

/// Test the watcher handed to discovery reprovisions the business
#[tokio::test]
async fn test_registered_watcher_drives_provisioning() {
    let slot: Arc<Mutex<Option<Arc<dyn NodeWatcher>>>> = Arc::new(Mutex::new(None));
    let captured = Arc::clone(&slot);

    let mut discovery = MockDiscovery::new();
    discovery
        .expect_get_and_watch()
        .withf(|business, _| business == "billing")
        .times(1)
        .returning(move |_, watcher| {
            *captured.lock() = Some(watcher);
            Ok(Vec::new())
        });
    discovery.expect_announce_presence().returning(|_, _| Ok(()));
    discovery.expect_close().returning(|| ());

    let orchestrator = Orchestrator::new(
        TestFixtures::INSTANCE,
        OrchestratorSettings::default(),
        vec!["billing".to_string()],
        Vec::new(),
        accepting_connector(),
        discovery,
    )
    .await
    .unwrap();
    assert!(orchestrator.sink("billing").await.is_none());

    let watcher = slot.lock().clone().expect("watcher registered");
    watcher.nodes_changed(vec![TestFixtures::node_a()]).await;

    let sink = orchestrator.sink("billing").await.expect("sink provisioned");
    assert_eq!(sink.links()[0].node(), &TestFixtures::node_a());

    orchestrator.close().await;

    // after close the watcher is inert
    watcher.nodes_changed(vec![TestFixtures::node_b()]).await;
    assert!(orchestrator.sink("billing").await.is_none());
}

/// Test a failed connect leaves the business with the reachable subset
#[tokio::test]
async fn test_connect_failures_are_skipped() {
    let mut connector = MockCollectorConnector::new();
    connector.expect_connect().returning(|node| {
        if node == &TestFixtures::node_b() {
            return Err(AgentError::NodeUnreachable {
                node: node.clone(),
                message: "connection refused".to_string(),
            });
        }
        let mut pool = MockCollectorPool::new();
        pool.expect_destroy().times(1).returning(|| ());
        Ok(Box::new(pool) as Box<dyn CollectorPool>)
    });

    let mut discovery = MockDiscovery::new();
    discovery
        .expect_get_and_watch()
        .returning(|_, _| Ok(vec![TestFixtures::node_a(), TestFixtures::node_b(), TestFixtures::node_a()]));
    discovery.expect_announce_presence().returning(|_, _| Ok(()));
    discovery.expect_close().returning(|| ());

    let orchestrator = Orchestrator::new(
        TestFixtures::INSTANCE,
        OrchestratorSettings::default(),
        vec!["billing".to_string()],
        Vec::new(),
        connector,
        discovery,
    )
    .await
    .unwrap();

    let sink = orchestrator.sink("billing").await.unwrap();
    assert_eq!(sink.links().len(), 1, "duplicates collapse and B is skipped");
    assert!(!sink.is_degraded());

    orchestrator.close().await;
}
