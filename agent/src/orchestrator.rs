//! Main orchestrator implementation
//!
//! Owns the routing state, the queue consumer pools and the monitor, and
//! coordinates provisioning with the coordination service through injected
//! collaborators.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use shared::{
    agent_debug, agent_error, agent_info, agent_warn, logging, AgentIdentity, Component, NodeIdentity,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::{
    run_worker, AgentSnapshot, Monitor, PoolLink, QueueWorkerPool, RecordRouter, RoutingState, Sink, WorkerContext,
};
use crate::error::{AgentError, AgentResult};
use crate::traits::{CollectorConnector, Discovery, NodeWatcher, QueuePool};
use crate::watcher::{DiscoveryWatcher, Provisioner};

/// Tunables for the orchestrator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub workers_per_pool: usize,
    pub sink_buffer_size: usize,
    pub poll_interval: Duration,
    pub monitor_interval: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            workers_per_pool: 10,
            sink_buffer_size: 1000,
            poll_interval: Duration::from_millis(100),
            monitor_interval: Duration::from_secs(1),
        }
    }
}

#[derive(Default)]
struct Lifecycle {
    started: bool,
    workers: Vec<JoinHandle<()>>,
    monitor: Option<Monitor>,
}

struct Inner<C, D> {
    instance: String,
    settings: OrchestratorSettings,
    businesses: Vec<String>,
    state: Arc<Mutex<RoutingState>>,
    pools: Vec<Arc<QueueWorkerPool>>,
    connector: C,
    discovery: D,
    running: Arc<AtomicBool>,
    closed: AtomicBool,
    provisioning: Mutex<()>,
    lifecycle: Mutex<Lifecycle>,
}

/// Dynamic routing orchestrator
pub struct Orchestrator<C, D>
where
    C: CollectorConnector + 'static,
    D: Discovery + 'static,
{
    inner: Arc<Inner<C, D>>,
}

impl<C, D> Orchestrator<C, D>
where
    C: CollectorConnector + 'static,
    D: Discovery + 'static,
{
    /// Construct the orchestrator and provision every business
    ///
    /// A coordination-service failure while fetching a node list is fatal.
    /// Unreachable nodes are not: the business is provisioned with whatever
    /// subset answered, possibly none.
    pub async fn new(
        instance: impl Into<String>,
        settings: OrchestratorSettings,
        businesses: Vec<String>,
        queues: Vec<(String, Arc<dyn QueuePool>)>,
        connector: C,
        discovery: D,
    ) -> AgentResult<Self> {
        let instance = instance.into();
        let pools = queues
            .into_iter()
            .map(|(queue_name, pool)| Arc::new(QueueWorkerPool::new(queue_name, pool)))
            .collect();

        let inner = Arc::new(Inner {
            instance,
            settings,
            businesses,
            state: Arc::new(Mutex::new(RoutingState::new())),
            pools,
            connector,
            discovery,
            running: Arc::new(AtomicBool::new(false)),
            closed: AtomicBool::new(false),
            provisioning: Mutex::new(()),
            lifecycle: Mutex::new(Lifecycle::default()),
        });

        let provisioner: Weak<dyn Provisioner> = Arc::downgrade(&inner) as Weak<dyn Provisioner>;
        for business in &inner.businesses {
            let watcher: Arc<dyn NodeWatcher> = Arc::new(DiscoveryWatcher::new(business.clone(), provisioner.clone()));
            inner.state.lock().await.register_watcher(business, Arc::clone(&watcher));

            let nodes = match inner.discovery.get_and_watch(business, watcher).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    agent_error!(Component::Discovery, business = %business, "❌ Node list fetch failed: {}", e);
                    inner.close().await;
                    return Err(e);
                }
            };
            if nodes.is_empty() {
                agent_warn!(Component::SourceManager, business = %business, "⚠️ No collector nodes, business is degraded");
                continue;
            }
            inner.provision_nodes(business, nodes).await;
        }

        let identity = AgentIdentity::new(local_hostname(), inner.instance.clone(), std::process::id());
        if let Err(e) = inner
            .discovery
            .announce_presence(&inner.businesses, &identity.to_string())
            .await
        {
            agent_error!(Component::Discovery, identity = %identity, "Presence announcement failed: {}", e);
        }

        agent_info!(
            Component::SourceManager,
            instance = %inner.instance,
            businesses = inner.businesses.len(),
            queues = inner.pools.len(),
            "✅ Orchestrator constructed"
        );
        Ok(Self { inner })
    }

    /// Rebuild the links and sink of `business` for a new node list
    pub async fn provision(&self, business: &str, nodes: Vec<NodeIdentity>) -> Option<Arc<Sink>> {
        self.inner.handle_provision(business, nodes).await
    }

    /// Start sinks, the monitor and the consumer workers
    pub async fn start(&self) -> AgentResult<()> {
        self.inner.start().await
    }

    /// Stop everything; safe to call more than once
    pub async fn close(&self) {
        self.inner.close().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn instance(&self) -> &str {
        &self.inner.instance
    }

    pub fn businesses(&self) -> &[String] {
        &self.inner.businesses
    }

    pub async fn sink(&self, business: &str) -> Option<Arc<Sink>> {
        self.inner.state.lock().await.sink(business)
    }

    pub async fn link(&self, node: &NodeIdentity) -> Option<Arc<PoolLink>> {
        self.inner.state.lock().await.link(node)
    }

    pub async fn snapshot(&self) -> AgentSnapshot {
        AgentSnapshot::capture(&self.inner.pools, &self.inner.state).await
    }

    /// Count of consumer tasks still alive
    pub async fn live_workers(&self) -> usize {
        let lifecycle = self.inner.lifecycle.lock().await;
        lifecycle.workers.iter().filter(|worker| !worker.is_finished()).count()
    }
}

impl<C, D> Inner<C, D>
where
    C: CollectorConnector + 'static,
    D: Discovery + 'static,
{
    async fn handle_provision(&self, business: &str, nodes: Vec<NodeIdentity>) -> Option<Arc<Sink>> {
        if self.closed.load(Ordering::Acquire) {
            agent_warn!(Component::SourceManager, business, "Orchestrator closed, ignoring provision");
            return None;
        }
        if !self.state.lock().await.is_watched(business) {
            agent_warn!(Component::SourceManager, business, "Unsupported business, ignoring provision");
            return None;
        }
        if nodes.is_empty() {
            agent_warn!(Component::SourceManager, business, "Empty node list, keeping current sink");
            return None;
        }
        self.provision_nodes(business, nodes).await
    }

    async fn provision_nodes(&self, business: &str, nodes: Vec<NodeIdentity>) -> Option<Arc<Sink>> {
        let serial = self.provisioning.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut seen = HashSet::new();
        let mut links = Vec::new();
        for node in nodes {
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(link) = self.state.lock().await.link(&node) {
                links.push(link);
                continue;
            }
            match PoolLink::create(&self.connector, node.clone()).await {
                Ok(link) => {
                    let (kept, loser) = self.state.lock().await.insert_link(link);
                    if let Some(loser) = loser {
                        loser.destroy().await;
                    }
                    links.push(kept);
                }
                Err(e) => {
                    agent_warn!(Component::SourceManager, business, node = %node, "Skipping unreachable node: {}", e);
                }
            }
        }

        let sink = Sink::new(business, links, self.settings.sink_buffer_size);
        let superseded = {
            let mut state = self.state.lock().await;
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            for link in sink.links() {
                link.attach_business(business);
            }
            state.install(Arc::clone(&sink))
        };

        if self.running.load(Ordering::Acquire) {
            sink.start();
        }
        // the superseded sink drains without the serial lock
        drop(serial);

        if sink.is_degraded() {
            agent_warn!(Component::SourceManager, business, "⚠️ No reachable collector nodes, business is degraded");
        } else {
            agent_info!(
                Component::SourceManager,
                business,
                generation = %sink.generation(),
                links = sink.links().len(),
                "📦 Provisioned sink"
            );
        }

        if let Some(old) = superseded {
            let drained = old.stop().await;
            self.detach_unused(business, &old).await;
            agent_debug!(
                Component::SourceManager,
                business,
                generation = %old.generation(),
                drained,
                "Superseded sink stopped"
            );
        }

        Some(sink)
    }

    /// Detach `business` from the links of `old` the installed sink no longer uses
    ///
    /// Runs under the state lock, which also guards attaching, so a newer
    /// provision of the same business cannot lose a link it just attached.
    async fn detach_unused(&self, business: &str, old: &Sink) {
        let state = self.state.lock().await;
        let current = state.sink(business);
        for link in old.links() {
            let still_used = current.as_ref().is_some_and(|sink| sink.has_link(link.node()));
            if !still_used {
                link.detach_business(business);
            }
        }
    }

    async fn start(&self) -> AgentResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(AgentError::Closed);
        }

        let mut lifecycle = self.lifecycle.lock().await;
        if self.closed.load(Ordering::Acquire) {
            return Err(AgentError::Closed);
        }
        if lifecycle.started {
            agent_warn!(Component::SourceManager, "Orchestrator already started");
            return Ok(());
        }
        lifecycle.started = true;
        self.running.store(true, Ordering::Release);

        for sink in self.state.lock().await.sinks() {
            sink.start();
        }

        lifecycle.monitor = Some(Monitor::spawn(
            self.pools.clone(),
            Arc::clone(&self.state),
            self.settings.monitor_interval,
        ));

        let ctx = WorkerContext {
            running: Arc::clone(&self.running),
            router: RecordRouter::new(Arc::clone(&self.state)),
            poll_interval: self.settings.poll_interval,
        };
        for pool in &self.pools {
            for worker in 0..self.settings.workers_per_pool {
                lifecycle
                    .workers
                    .push(tokio::spawn(run_worker(Arc::clone(pool), ctx.clone(), worker)));
            }
        }

        logging::log_startup(
            Component::SourceManager,
            &format!(
                "{} workers over {} queues",
                lifecycle.workers.len(),
                self.pools.len()
            ),
        );
        Ok(())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            agent_debug!(Component::SourceManager, "Orchestrator already closed");
            return;
        }
        self.running.store(false, Ordering::Release);

        // wait out an in-flight provision; later ones see the closed flag
        drop(self.provisioning.lock().await);

        let sinks = self.state.lock().await.take_sinks();
        for sink in &sinks {
            sink.stop().await;
        }

        for pool in &self.pools {
            pool.close().await;
        }

        let (workers, monitor) = {
            let mut lifecycle = self.lifecycle.lock().await;
            self.running.store(false, Ordering::Release);
            (std::mem::take(&mut lifecycle.workers), lifecycle.monitor.take())
        };
        for worker in workers {
            if let Err(e) = worker.await {
                agent_error!(Component::QueueWorker, "Worker ended abnormally: {}", e);
            }
        }
        if let Some(monitor) = monitor {
            monitor.stop().await;
        }

        let links = self.state.lock().await.take_links();
        for link in &links {
            link.destroy().await;
        }

        self.discovery.close().await;
        self.state.lock().await.clear_watchers();

        logging::log_shutdown(
            Component::SourceManager,
            &format!("{} sinks stopped, {} links destroyed", sinks.len(), links.len()),
        );
    }
}

#[async_trait]
impl<C, D> Provisioner for Inner<C, D>
where
    C: CollectorConnector + 'static,
    D: Discovery + 'static,
{
    async fn provision(&self, business: &str, nodes: Vec<NodeIdentity>) -> Option<Arc<Sink>> {
        self.handle_provision(business, nodes).await
    }
}

fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .unwrap_or_else(|| "localhost".to_string())
}
