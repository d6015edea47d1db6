//! Configuration-backed discovery
//!
//! Node lists come from the config file. `update` and `reload` push changes
//! to the registered watchers the way a coordination service would.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{agent_debug, agent_info, Component, NodeIdentity};

use crate::error::AgentResult;
use crate::traits::{Discovery, NodeWatcher};

pub struct StaticDiscovery {
    nodes: Mutex<BTreeMap<String, Vec<NodeIdentity>>>,
    watchers: Mutex<HashMap<String, Arc<dyn NodeWatcher>>>,
    closed: AtomicBool,
}

impl StaticDiscovery {
    pub fn new(nodes: BTreeMap<String, Vec<NodeIdentity>>) -> Self {
        Self {
            nodes: Mutex::new(nodes),
            watchers: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn nodes(&self, business: &str) -> Vec<NodeIdentity> {
        self.nodes.lock().get(business).cloned().unwrap_or_default()
    }

    /// Replace one business's node list and notify its watcher
    ///
    /// Returns whether a watcher was notified.
    pub async fn update(&self, business: &str, nodes: Vec<NodeIdentity>) -> bool {
        self.nodes.lock().insert(business.to_string(), nodes.clone());
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        let watcher = self.watchers.lock().get(business).cloned();
        match watcher {
            Some(watcher) => {
                agent_debug!(Component::Discovery, business, nodes = nodes.len(), "Notifying watcher");
                watcher.nodes_changed(nodes).await;
                true
            }
            None => false,
        }
    }

    /// Apply a freshly loaded node table, notifying only businesses whose list changed
    pub async fn reload(&self, table: BTreeMap<String, Vec<NodeIdentity>>) -> usize {
        let current = self.nodes.lock().clone();
        let mut notified = 0;

        let mut businesses: Vec<&String> = current.keys().chain(table.keys()).collect();
        businesses.sort();
        businesses.dedup();

        for business in businesses {
            let next = table.get(business).cloned().unwrap_or_default();
            if current.get(business).map(Vec::as_slice).unwrap_or_default() == next.as_slice() {
                continue;
            }
            if self.update(business, next).await {
                notified += 1;
            }
        }

        agent_info!(Component::Discovery, notified, "🔄 Static node table reloaded");
        notified
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn NodeWatcher>,
    ) -> AgentResult<Vec<NodeIdentity>> {
        self.watchers.lock().insert(business.to_string(), watcher);
        Ok(self.nodes(business))
    }

    async fn announce_presence(&self, businesses: &[String], identity: &str) -> AgentResult<()> {
        agent_info!(Component::Discovery, identity, businesses = ?businesses, "📣 Presence announced");
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.watchers.lock().clear();
    }
}
