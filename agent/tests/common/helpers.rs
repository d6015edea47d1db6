//! Test helpers and builder patterns for agent tests
//!
//! In-memory stand-ins for the queue and the collector, plus a builder that
//! wires them into an orchestrator backed by static discovery.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use agent::services::StaticDiscovery;
use agent::{
    AgentError, AgentResult, CollectorConnector, CollectorPool, Orchestrator, OrchestratorSettings, QueueConnection,
    QueuePool, Sink,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{LogEvent, NodeIdentity};

use super::fixtures::TestFixtures;

/// In-memory queue endpoint holding any number of named lists
pub struct MemoryQueuePool {
    queues: Arc<Mutex<HashMap<String, VecDeque<Vec<u8>>>>>,
    closed: Arc<AtomicBool>,
    acquires: AtomicUsize,
}

impl MemoryQueuePool {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(Mutex::new(HashMap::new())),
            closed: Arc::new(AtomicBool::new(false)),
            acquires: AtomicUsize::new(0),
        }
    }

    pub fn push(&self, queue: &str, payload: Vec<u8>) {
        self.queues.lock().entry(queue.to_string()).or_default().push_back(payload);
    }

    pub fn push_record(&self, business: &str, body: &str) {
        self.push(TestFixtures::ORDERS_QUEUE, TestFixtures::record(business, body));
    }

    pub fn pending(&self, queue: &str) -> usize {
        self.queues.lock().get(queue).map(VecDeque::len).unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn acquires(&self) -> usize {
        self.acquires.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl QueuePool for MemoryQueuePool {
    fn endpoint(&self) -> String {
        "memory:0".to_string()
    }

    async fn acquire(&self) -> AgentResult<Box<dyn QueueConnection>> {
        if self.is_closed() {
            return Err(AgentError::QueuePoolClosed {
                endpoint: self.endpoint(),
            });
        }
        self.acquires.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MemoryConnection {
            queues: Arc::clone(&self.queues),
            closed: Arc::clone(&self.closed),
        }))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct MemoryConnection {
    queues: Arc<Mutex<HashMap<String, VecDeque<Vec<u8>>>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl QueueConnection for MemoryConnection {
    async fn pop(&mut self, queue_name: &str) -> AgentResult<Option<Vec<u8>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AgentError::queue("memory:0", "pool closed"));
        }
        Ok(self.queues.lock().get_mut(queue_name).and_then(VecDeque::pop_front))
    }
}

#[derive(Default)]
struct CollectorState {
    unreachable: Mutex<HashSet<NodeIdentity>>,
    delays: Mutex<HashMap<NodeIdentity, Duration>>,
    delivered: Mutex<HashMap<NodeIdentity, Vec<LogEvent>>>,
    connects: Mutex<HashMap<NodeIdentity, usize>>,
    destroyed: Mutex<HashSet<NodeIdentity>>,
}

/// Collector connector that records every delivered event per node
///
/// Every node is reachable unless marked otherwise.
#[derive(Clone, Default)]
pub struct RecordingConnector {
    state: Arc<CollectorState>,
}

impl RecordingConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unreachable(&self, node: NodeIdentity) {
        self.state.unreachable.lock().insert(node);
    }

    /// Make every append to `node` take `delay`
    pub fn set_delay(&self, node: NodeIdentity, delay: Duration) {
        self.state.delays.lock().insert(node, delay);
    }

    pub fn delivered(&self, node: &NodeIdentity) -> Vec<LogEvent> {
        self.state.delivered.lock().get(node).cloned().unwrap_or_default()
    }

    pub fn delivered_count(&self, node: &NodeIdentity) -> usize {
        self.state.delivered.lock().get(node).map(Vec::len).unwrap_or(0)
    }

    pub fn total_delivered(&self) -> usize {
        self.state.delivered.lock().values().map(Vec::len).sum()
    }

    pub fn connects(&self, node: &NodeIdentity) -> usize {
        self.state.connects.lock().get(node).copied().unwrap_or(0)
    }

    pub fn is_destroyed(&self, node: &NodeIdentity) -> bool {
        self.state.destroyed.lock().contains(node)
    }
}

#[async_trait]
impl CollectorConnector for RecordingConnector {
    async fn connect(&self, node: &NodeIdentity) -> AgentResult<Box<dyn CollectorPool>> {
        if self.state.unreachable.lock().contains(node) {
            return Err(AgentError::NodeUnreachable {
                node: node.clone(),
                message: "connection refused".to_string(),
            });
        }
        *self.state.connects.lock().entry(node.clone()).or_default() += 1;
        Ok(Box::new(RecordingPool {
            node: node.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

struct RecordingPool {
    node: NodeIdentity,
    state: Arc<CollectorState>,
}

#[async_trait]
impl CollectorPool for RecordingPool {
    async fn append(&self, event: &LogEvent) -> AgentResult<()> {
        let delay = self.state.delays.lock().get(&self.node).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.state
            .delivered
            .lock()
            .entry(self.node.clone())
            .or_default()
            .push(event.clone());
        Ok(())
    }

    async fn destroy(&self) {
        self.state.destroyed.lock().insert(self.node.clone());
    }
}

/// A constructed orchestrator together with handles to its fakes
pub struct TestAgent {
    pub orchestrator: Orchestrator<RecordingConnector, Arc<StaticDiscovery>>,
    pub queue: Arc<MemoryQueuePool>,
    pub collector: RecordingConnector,
    pub discovery: Arc<StaticDiscovery>,
}

/// Builder pattern for creating test orchestrators with sensible defaults
pub struct OrchestratorBuilder {
    businesses: Vec<String>,
    nodes: BTreeMap<String, Vec<NodeIdentity>>,
    unreachable: Vec<NodeIdentity>,
    delays: Vec<(NodeIdentity, Duration)>,
    settings: OrchestratorSettings,
}

impl OrchestratorBuilder {
    /// Small pools and short intervals so tests settle quickly
    pub fn new() -> Self {
        Self {
            businesses: Vec::new(),
            nodes: BTreeMap::new(),
            unreachable: Vec::new(),
            delays: Vec::new(),
            settings: OrchestratorSettings {
                workers_per_pool: 2,
                sink_buffer_size: 64,
                poll_interval: Duration::from_millis(5),
                monitor_interval: Duration::from_millis(50),
            },
        }
    }

    /// Add a business with its initial node list
    pub fn with_business(mut self, business: &str, nodes: &[&str]) -> Self {
        self.businesses.push(business.to_string());
        self.nodes
            .insert(business.to_string(), nodes.iter().map(|n| TestFixtures::node(n)).collect());
        self
    }

    pub fn with_unreachable(mut self, node: &str) -> Self {
        self.unreachable.push(TestFixtures::node(node));
        self
    }

    /// Slow down every append to `node`
    pub fn with_delay(mut self, node: &str, delay: Duration) -> Self {
        self.delays.push((TestFixtures::node(node), delay));
        self
    }

    pub fn with_settings<F>(mut self, setup: F) -> Self
    where
        F: FnOnce(&mut OrchestratorSettings),
    {
        setup(&mut self.settings);
        self
    }

    pub async fn build(self) -> TestAgent {
        let queue = Arc::new(MemoryQueuePool::new());
        let collector = RecordingConnector::new();
        for node in self.unreachable {
            collector.set_unreachable(node);
        }
        for (node, delay) in self.delays {
            collector.set_delay(node, delay);
        }
        let discovery = Arc::new(StaticDiscovery::new(self.nodes));

        let queue_pool: Arc<dyn QueuePool> = queue.clone();
        let orchestrator = Orchestrator::new(
            TestFixtures::INSTANCE,
            self.settings,
            self.businesses,
            vec![(TestFixtures::ORDERS_QUEUE.to_string(), queue_pool)],
            collector.clone(),
            Arc::clone(&discovery),
        )
        .await
        .expect("orchestrator construction");

        TestAgent {
            orchestrator,
            queue,
            collector,
            discovery,
        }
    }

    /// Build and start
    pub async fn start(self) -> TestAgent {
        let agent = self.build().await;
        agent.orchestrator.start().await.expect("orchestrator start");
        agent
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub const SETTLE_TIMEOUT: Duration = Duration::from_secs(3);

    /// Poll `condition` until it holds or the settle timeout passes
    pub async fn wait_until<F>(mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + Self::SETTLE_TIMEOUT;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        condition()
    }

    pub fn link_nodes(sink: &Sink) -> Vec<NodeIdentity> {
        sink.links().iter().map(|link| link.node().clone()).collect()
    }
}
