//! Routing state and record router
//!
//! `RoutingState` is the single state object behind the orchestrator's lock:
//! the business → sink table, the node → link map and the watcher
//! registrations. It performs no I/O, so it is always held briefly.

use std::collections::HashMap;
use std::sync::Arc;

use shared::{agent_debug, agent_warn, Component, LogEvent, NodeIdentity};
use tokio::sync::Mutex;

use super::link::PoolLink;
use super::sink::Sink;
use crate::traits::NodeWatcher;

/// Reserved business that receives records with no matching sink
pub const DEFAULT_BUSINESS: &str = "default";

/// How many times a router re-resolves after hitting a stopped sink
const ROUTE_ATTEMPTS: usize = 2;

/// Outcome of a routing-table lookup
#[derive(Debug, Clone)]
pub enum Route {
    Direct(Arc<Sink>),
    Fallback(Arc<Sink>),
    Unroutable,
}

/// Outcome of delivering one record into a sink buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    FellBack,
    Dropped,
}

#[derive(Default)]
pub struct RoutingState {
    sinks: HashMap<String, Arc<Sink>>,
    links: HashMap<NodeIdentity, Arc<PoolLink>>,
    watchers: HashMap<String, Arc<dyn NodeWatcher>>,
}

impl RoutingState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the watcher for a business; reused across reprovisioning
    pub fn register_watcher(&mut self, business: &str, watcher: Arc<dyn NodeWatcher>) {
        self.watchers.insert(business.to_string(), watcher);
    }

    pub fn is_watched(&self, business: &str) -> bool {
        self.watchers.contains_key(business)
    }

    pub fn watched_businesses(&self) -> Vec<String> {
        let mut businesses: Vec<String> = self.watchers.keys().cloned().collect();
        businesses.sort();
        businesses
    }

    pub fn link(&self, node: &NodeIdentity) -> Option<Arc<PoolLink>> {
        self.links.get(node).cloned()
    }

    /// Insert a freshly created link
    ///
    /// If another provisioning call registered a link for the same node
    /// first, that link wins and the fresh one is handed back as the second
    /// element so the caller can destroy it.
    pub fn insert_link(&mut self, link: Arc<PoolLink>) -> (Arc<PoolLink>, Option<Arc<PoolLink>>) {
        match self.links.get(link.node()) {
            Some(existing) => (Arc::clone(existing), Some(link)),
            None => {
                self.links.insert(link.node().clone(), Arc::clone(&link));
                (link, None)
            }
        }
    }

    /// Swap `sink` into the table, returning the sink it supersedes
    pub fn install(&mut self, sink: Arc<Sink>) -> Option<Arc<Sink>> {
        self.sinks.insert(sink.business().to_string(), sink)
    }

    pub fn sink(&self, business: &str) -> Option<Arc<Sink>> {
        self.sinks.get(business).cloned()
    }

    /// Resolve the sink a record for `business` should go to
    pub fn resolve(&self, business: &str) -> Route {
        if let Some(sink) = self.sinks.get(business) {
            if !sink.is_stopped() {
                return Route::Direct(Arc::clone(sink));
            }
        }
        match self.sinks.get(DEFAULT_BUSINESS) {
            Some(sink) if !sink.is_stopped() => Route::Fallback(Arc::clone(sink)),
            _ => Route::Unroutable,
        }
    }

    pub fn sinks(&self) -> Vec<Arc<Sink>> {
        self.sinks.values().cloned().collect()
    }

    pub fn links(&self) -> Vec<Arc<PoolLink>> {
        self.links.values().cloned().collect()
    }

    /// Empty the sink table; used at shutdown
    pub fn take_sinks(&mut self) -> Vec<Arc<Sink>> {
        self.sinks.drain().map(|(_, sink)| sink).collect()
    }

    /// Empty the link map; used at shutdown
    pub fn take_links(&mut self) -> Vec<Arc<PoolLink>> {
        self.links.drain().map(|(_, link)| link).collect()
    }

    pub fn clear_watchers(&mut self) {
        self.watchers.clear();
    }
}

/// Routes decoded records into sinks
///
/// The lock is only held for the lookup; the send into the sink buffer,
/// which may block, happens outside it.
#[derive(Clone)]
pub struct RecordRouter {
    state: Arc<Mutex<RoutingState>>,
}

impl RecordRouter {
    pub fn new(state: Arc<Mutex<RoutingState>>) -> Self {
        Self { state }
    }

    pub async fn route(&self, business: &str, event: LogEvent) -> Delivery {
        let mut event = event;

        for _ in 0..ROUTE_ATTEMPTS {
            let route = self.state.lock().await.resolve(business);
            let (sink, outcome) = match route {
                Route::Direct(sink) => (sink, Delivery::Delivered),
                Route::Fallback(sink) => (sink, Delivery::FellBack),
                Route::Unroutable => {
                    agent_warn!(Component::QueueWorker, business, "No sink and no default sink, dropping record");
                    return Delivery::Dropped;
                }
            };

            match sink.send(event).await {
                Ok(()) => return outcome,
                Err(returned) => {
                    agent_debug!(
                        Component::QueueWorker,
                        business,
                        target = %sink.business(),
                        "Sink stopped during send, re-resolving"
                    );
                    event = returned;
                }
            }
        }

        agent_warn!(Component::QueueWorker, business, "Sink kept stopping under the router, dropping record");
        Delivery::Dropped
    }
}
