//! HTTP registry discovery
//!
//! Node lists are read from `GET {address}/v1/businesses/{business}/nodes`
//! and re-polled in the background; presence is announced with
//! `PUT {address}/v1/presence/{identity}`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use shared::{agent_debug, agent_info, agent_warn, Component, NodeIdentity};
use tokio::task::JoinHandle;

use crate::error::{AgentError, AgentResult};
use crate::traits::{Discovery, NodeWatcher};

/// Body of a presence announcement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Presence {
    pub businesses: Vec<String>,
    pub identity: String,
    pub registered_at: String,
}

pub struct HttpDiscovery {
    client: reqwest::Client,
    address: Url,
    poll_interval: Duration,
    pollers: Mutex<Vec<JoinHandle<()>>>,
}

impl HttpDiscovery {
    pub fn new(address: impl Into<String>, poll_interval: Duration, request_timeout: Duration) -> AgentResult<Self> {
        let address = address.into();
        let address = Url::parse(&address)
            .map_err(|e| AgentError::config(format!("discovery.address '{}': {}", address, e)))?;
        let client = reqwest::Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            client,
            address,
            poll_interval,
            pollers: Mutex::new(Vec::new()),
        })
    }

    /// Active background pollers
    pub fn poller_count(&self) -> usize {
        self.pollers.lock().iter().filter(|poller| !poller.is_finished()).count()
    }

    pub async fn fetch_nodes(&self, business: &str) -> AgentResult<Vec<NodeIdentity>> {
        fetch_nodes(&self.client, &self.address, business).await
    }
}

/// `base` with `segments` appended, each one percent-encoded
fn endpoint(base: &Url, segments: &[&str]) -> AgentResult<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| AgentError::config(format!("discovery.address '{}' cannot be a base URL", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn fetch_nodes(client: &reqwest::Client, address: &Url, business: &str) -> AgentResult<Vec<NodeIdentity>> {
    let url = endpoint(address, &["v1", "businesses", business, "nodes"])?;
    let raw: Vec<String> = client.get(url).send().await?.error_for_status()?.json().await?;

    raw.iter()
        .map(|entry| NodeIdentity::parse(entry).map_err(AgentError::from))
        .collect()
}

async fn poll_nodes(
    client: reqwest::Client,
    address: Url,
    business: String,
    watcher: Arc<dyn NodeWatcher>,
    period: Duration,
    mut last: Vec<NodeIdentity>,
) {
    last.sort();
    loop {
        tokio::time::sleep(period).await;

        match fetch_nodes(&client, &address, &business).await {
            Ok(mut nodes) => {
                nodes.sort();
                if nodes != last {
                    agent_info!(Component::Discovery, business = %business, nodes = nodes.len(), "Node list changed");
                    last = nodes.clone();
                    watcher.nodes_changed(nodes).await;
                }
            }
            Err(e) => {
                agent_warn!(Component::Discovery, business = %business, "Node poll failed, keeping last list: {}", e);
            }
        }
    }
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn get_and_watch(
        &self,
        business: &str,
        watcher: Arc<dyn NodeWatcher>,
    ) -> AgentResult<Vec<NodeIdentity>> {
        let nodes = self
            .fetch_nodes(business)
            .await
            .map_err(|e| AgentError::discovery(format!("fetching nodes for '{}': {}", business, e)))?;

        let poller = tokio::spawn(poll_nodes(
            self.client.clone(),
            self.address.clone(),
            business.to_string(),
            watcher,
            self.poll_interval,
            nodes.clone(),
        ));
        self.pollers.lock().push(poller);

        agent_debug!(Component::Discovery, business, nodes = nodes.len(), "Watching business");
        Ok(nodes)
    }

    async fn announce_presence(&self, businesses: &[String], identity: &str) -> AgentResult<()> {
        let url = endpoint(&self.address, &["v1", "presence", identity])?;
        let body = Presence {
            businesses: businesses.to_vec(),
            identity: identity.to_string(),
            registered_at: Utc::now().to_rfc3339(),
        };

        self.client.put(url).json(&body).send().await?.error_for_status()?;
        agent_info!(Component::Discovery, identity, "📣 Presence announced");
        Ok(())
    }

    async fn close(&self) {
        let pollers: Vec<JoinHandle<()>> = self.pollers.lock().drain(..).collect();
        for poller in &pollers {
            poller.abort();
        }
        for poller in pollers {
            let _ = poller.await;
        }
    }
}
