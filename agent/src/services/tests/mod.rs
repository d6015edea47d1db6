//! Service-specific tests
//!
//! Each concrete collaborator is exercised against a local fake of the
//! remote side: a scripted RESP server, a framed collector, or wiremock.

#[cfg(test)]
mod http_discovery;

// Common test utilities for services
#[cfg(test)]
pub mod common {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use shared::NodeIdentity;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::traits::NodeWatcher;

    /// Standard timeout for async operations in tests
    pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

    /// Helper to run async operations with timeout
    pub async fn with_timeout<T, F>(future: F) -> Result<T, tokio::time::error::Elapsed>
    where
        F: std::future::Future<Output = T>,
    {
        timeout(TEST_TIMEOUT, future).await
    }

    /// Watcher that forwards every notification into a channel
    pub struct ChannelWatcher {
        tx: mpsc::UnboundedSender<Vec<NodeIdentity>>,
    }

    pub fn channel_watcher() -> (Arc<ChannelWatcher>, mpsc::UnboundedReceiver<Vec<NodeIdentity>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(ChannelWatcher { tx }), rx)
    }

    #[async_trait]
    impl NodeWatcher for ChannelWatcher {
        async fn nodes_changed(&self, nodes: Vec<NodeIdentity>) {
            let _ = self.tx.send(nodes);
        }
    }

    pub fn node(input: &str) -> NodeIdentity {
        NodeIdentity::parse(input).unwrap()
    }
}
