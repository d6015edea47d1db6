//! Trait definitions with mockall annotations for testing
//!
//! Every external collaborator of the agent sits behind one of these traits:
//! the source queue client, the downstream collector client and the
//! coordination service. The orchestrator only ever talks to these seams, so
//! tests can inject mocks or in-memory fakes.

use std::sync::Arc;

use async_trait::async_trait;
use shared::{LogEvent, NodeIdentity};

use crate::error::AgentResult;

/// Pooled connections to one source queue endpoint
#[mockall::automock]
#[async_trait]
pub trait QueuePool: Send + Sync {
    /// Human readable endpoint, used in logs and statistics
    fn endpoint(&self) -> String;

    /// Acquire a connection from the pool
    ///
    /// Fails once the pool has been closed.
    async fn acquire(&self) -> AgentResult<Box<dyn QueueConnection>>;

    /// Close the pool; outstanding and future acquires fail
    async fn close(&self);
}

/// One live connection to a source queue
///
/// A connection that returned an error is discarded when dropped; a healthy
/// one goes back to its pool.
#[mockall::automock]
#[async_trait]
pub trait QueueConnection: Send {
    /// Non-blocking pop keyed by queue name
    ///
    /// # Returns
    /// `Some(payload)` for a record, `None` when the queue is empty
    async fn pop(&mut self, queue_name: &str) -> AgentResult<Option<Vec<u8>>>;
}

/// Factory for pooled connections to a collector node
#[mockall::automock]
#[async_trait]
pub trait CollectorConnector: Send + Sync {
    /// Create a connection pool for `node`
    ///
    /// An unreachable node is reported as an error; the caller decides
    /// whether that is fatal.
    async fn connect(&self, node: &NodeIdentity) -> AgentResult<Box<dyn CollectorPool>>;
}

/// Pooled connections to one collector node
#[mockall::automock]
#[async_trait]
pub trait CollectorPool: Send + Sync {
    /// Deliver one event to the node
    async fn append(&self, event: &LogEvent) -> AgentResult<()>;

    /// Release every pooled connection
    async fn destroy(&self);
}

/// Callback invoked by the coordination service when a node list changes
#[mockall::automock]
#[async_trait]
pub trait NodeWatcher: Send + Sync {
    async fn nodes_changed(&self, nodes: Vec<NodeIdentity>);
}

/// Coordination service client
#[mockall::automock]
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Fetch the current node list for `business` and subscribe `watcher` to changes
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn NodeWatcher>,
    ) -> AgentResult<Vec<NodeIdentity>>;

    /// Announce this process as a consumer of `businesses`
    async fn announce_presence(&self, businesses: &[String], identity: &str) -> AgentResult<()>;

    /// Stop every subscription
    async fn close(&self);
}

#[async_trait]
impl<T: Discovery + ?Sized> Discovery for Arc<T> {
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn NodeWatcher>,
    ) -> AgentResult<Vec<NodeIdentity>> {
        (**self).get_and_watch(business, watcher).await
    }

    async fn announce_presence(&self, businesses: &[String], identity: &str) -> AgentResult<()> {
        (**self).announce_presence(businesses, identity).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}
