//! In-memory collector pools for unit tests

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{LogEvent, NodeIdentity};

use super::link::PoolLink;
use crate::error::{AgentError, AgentResult};
use crate::traits::CollectorPool;

pub type Delivered = Arc<Mutex<Vec<LogEvent>>>;

pub struct RecordingPool {
    delivered: Delivered,
}

#[async_trait]
impl CollectorPool for RecordingPool {
    async fn append(&self, event: &LogEvent) -> AgentResult<()> {
        self.delivered.lock().push(event.clone());
        Ok(())
    }

    async fn destroy(&self) {}
}

pub struct FailingPool {
    node: NodeIdentity,
}

#[async_trait]
impl CollectorPool for FailingPool {
    async fn append(&self, _event: &LogEvent) -> AgentResult<()> {
        Err(AgentError::collector(&self.node, "connection reset"))
    }

    async fn destroy(&self) {}
}

pub fn recording_link(host: &str, port: u16) -> (Arc<PoolLink>, Delivered) {
    let delivered = Delivered::default();
    let pool = RecordingPool {
        delivered: Arc::clone(&delivered),
    };
    (Arc::new(PoolLink::new(NodeIdentity::new(host, port), Box::new(pool))), delivered)
}

pub fn failing_link(host: &str, port: u16) -> Arc<PoolLink> {
    let node = NodeIdentity::new(host, port);
    Arc::new(PoolLink::new(node.clone(), Box::new(FailingPool { node })))
}
