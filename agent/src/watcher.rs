//! Discovery watcher bridge
//!
//! The coordination service calls a `DiscoveryWatcher` whenever a business's
//! node list changes. The watcher only holds a weak reference to the
//! orchestrator, so a late notification after shutdown is ignored.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use shared::{agent_debug, agent_info, Component, NodeIdentity};

use crate::core::Sink;
use crate::traits::NodeWatcher;

/// Provisioning entry point reached through a watcher
#[mockall::automock]
#[async_trait]
pub trait Provisioner: Send + Sync {
    async fn provision(&self, business: &str, nodes: Vec<NodeIdentity>) -> Option<Arc<Sink>>;
}

pub struct DiscoveryWatcher {
    business: String,
    provisioner: Weak<dyn Provisioner>,
}

impl DiscoveryWatcher {
    pub fn new(business: impl Into<String>, provisioner: Weak<dyn Provisioner>) -> Self {
        Self {
            business: business.into(),
            provisioner,
        }
    }

    pub fn business(&self) -> &str {
        &self.business
    }
}

#[async_trait]
impl NodeWatcher for DiscoveryWatcher {
    async fn nodes_changed(&self, nodes: Vec<NodeIdentity>) {
        let Some(provisioner) = self.provisioner.upgrade() else {
            agent_debug!(Component::Watcher, business = %self.business, "Orchestrator gone, ignoring node change");
            return;
        };

        agent_info!(
            Component::Watcher,
            business = %self.business,
            nodes = nodes.len(),
            "🔄 Node list changed, reprovisioning"
        );
        provisioner.provision(&self.business, nodes).await;
    }
}
