//! Connection pool link
//!
//! A `PoolLink` wraps the pooled connections to one collector node. It is
//! shared by every business routed to that node and tracks which businesses
//! are attached to it. Links live until the orchestrator shuts down.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use shared::{agent_debug, agent_info, Component, LogEvent, NodeIdentity};

use crate::error::{AgentError, AgentResult};
use crate::traits::{CollectorConnector, CollectorPool};

/// Point-in-time statistics for one link
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct LinkStats {
    pub node: String,
    pub businesses: Vec<String>,
    pub forwarded: u64,
    pub failed: u64,
    pub destroyed: bool,
}

pub struct PoolLink {
    node: NodeIdentity,
    pool: Box<dyn CollectorPool>,
    businesses: Mutex<BTreeSet<String>>,
    forwarded: AtomicU64,
    failed: AtomicU64,
    destroyed: AtomicBool,
}

impl PoolLink {
    pub fn new(node: NodeIdentity, pool: Box<dyn CollectorPool>) -> Self {
        Self {
            node,
            pool,
            businesses: Mutex::new(BTreeSet::new()),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Connect to `node` and wrap the resulting pool
    pub async fn create<C>(connector: &C, node: NodeIdentity) -> AgentResult<Arc<Self>>
    where
        C: CollectorConnector + ?Sized,
    {
        let pool = connector.connect(&node).await?;
        agent_info!(Component::PoolLink, node = %node, "🔗 Created pool link");
        Ok(Arc::new(Self::new(node, pool)))
    }

    pub fn node(&self) -> &NodeIdentity {
        &self.node
    }

    /// Attach a business; returns false when it was already attached
    pub fn attach_business(&self, business: &str) -> bool {
        let inserted = self.businesses.lock().insert(business.to_string());
        if inserted {
            agent_debug!(Component::PoolLink, node = %self.node, business, "Attached business");
        }
        inserted
    }

    /// Detach a business; returns false when it was not attached
    pub fn detach_business(&self, business: &str) -> bool {
        let removed = self.businesses.lock().remove(business);
        if removed {
            agent_debug!(Component::PoolLink, node = %self.node, business, "Detached business");
        }
        removed
    }

    pub fn attached_businesses(&self) -> Vec<String> {
        self.businesses.lock().iter().cloned().collect()
    }

    pub fn attached_count(&self) -> usize {
        self.businesses.lock().len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    /// Forward one event to the node
    pub async fn send(&self, event: &LogEvent) -> AgentResult<()> {
        if self.is_destroyed() {
            return Err(AgentError::PoolDestroyed {
                node: self.node.clone(),
            });
        }

        match self.pool.append(event).await {
            Ok(()) => {
                self.forwarded.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Release every pooled connection; later calls are no-ops
    pub async fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.pool.destroy().await;
        agent_info!(Component::PoolLink, node = %self.node, "🔌 Destroyed pool link");
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            node: self.node.to_string(),
            businesses: self.attached_businesses(),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            destroyed: self.is_destroyed(),
        }
    }
}

impl std::fmt::Debug for PoolLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolLink")
            .field("node", &self.node)
            .field("businesses", &self.attached_businesses())
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}
