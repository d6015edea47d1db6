//! Periodic throughput and consistency monitor

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::{agent_debug, agent_warn, logging, Component};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::consumer::{QueueStats, QueueWorkerPool};
use super::link::LinkStats;
use super::routing::RoutingState;
use super::sink::SinkStats;

/// Statistics for the whole agent at one instant
#[derive(Debug, Clone, Default, Serialize)]
pub struct AgentSnapshot {
    pub queues: Vec<QueueStats>,
    pub sinks: Vec<SinkStats>,
    pub links: Vec<LinkStats>,
}

impl AgentSnapshot {
    /// Capture queue, sink and link statistics; output is sorted for stable logs
    pub async fn capture(pools: &[Arc<QueueWorkerPool>], state: &Mutex<RoutingState>) -> Self {
        let (sinks, links) = {
            let guard = state.lock().await;
            (guard.sinks(), guard.links())
        };

        let mut sinks: Vec<SinkStats> = sinks.iter().map(|sink| sink.stats()).collect();
        sinks.sort_by(|a, b| a.business.cmp(&b.business));
        let mut links: Vec<LinkStats> = links.iter().map(|link| link.stats()).collect();
        links.sort_by(|a, b| a.node.cmp(&b.node));

        Self {
            queues: pools.iter().map(|pool| pool.stats()).collect(),
            sinks,
            links,
        }
    }

    pub fn sink(&self, business: &str) -> Option<&SinkStats> {
        self.sinks.iter().find(|sink| sink.business == business)
    }

    pub fn link(&self, node: &str) -> Option<&LinkStats> {
        self.links.iter().find(|link| link.node == node)
    }

    /// Inconsistencies worth a warning
    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();
        for sink in &self.sinks {
            if sink.stopped {
                findings.push(Finding::StoppedSinkInstalled {
                    business: sink.business.clone(),
                });
            } else if sink.links == 0 {
                findings.push(Finding::DegradedSink {
                    business: sink.business.clone(),
                });
            }
        }
        for link in &self.links {
            if link.businesses.is_empty() && !link.destroyed {
                findings.push(Finding::IdleLink { node: link.node.clone() });
            }
        }
        findings
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    DegradedSink { business: String },
    StoppedSinkInstalled { business: String },
    IdleLink { node: String },
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Finding::DegradedSink { business } => write!(f, "sink '{}' has no links", business),
            Finding::StoppedSinkInstalled { business } => {
                write!(f, "stopped sink '{}' is still routable", business)
            }
            Finding::IdleLink { node } => write!(f, "link {} has no attached business", node),
        }
    }
}

/// Handle to the running monitor task
pub struct Monitor {
    shutdown_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

impl Monitor {
    pub fn spawn(pools: Vec<Arc<QueueWorkerPool>>, state: Arc<Mutex<RoutingState>>, period: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let handle = tokio::spawn(run_monitor(pools, state, period, shutdown_rx));
        Self { shutdown_tx, handle }
    }

    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.handle.await {
            agent_warn!(Component::Monitor, "Monitor task ended abnormally: {}", e);
        }
    }
}

async fn run_monitor(
    pools: Vec<Arc<QueueWorkerPool>>,
    state: Arc<Mutex<RoutingState>>,
    period: Duration,
    mut shutdown_rx: mpsc::Receiver<()>,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // the first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => break,
            _ = ticker.tick() => report(&pools, &state).await,
        }
    }

    agent_debug!(Component::Monitor, "Monitor stopped");
}

async fn report(pools: &[Arc<QueueWorkerPool>], state: &Mutex<RoutingState>) {
    for pool in pools {
        let throughput = pool.take_throughput();
        let stats = pool.stats();
        tracing::info!(
            target: logging::THROUGHPUT_TARGET,
            component = %Component::Monitor,
            timestamp = logging::format_timestamp(),
            queue = %stats.queue_name,
            endpoint = %stats.endpoint,
            throughput,
            malformed = stats.malformed,
            dropped = stats.dropped,
            "📊 Queue throughput"
        );
    }

    let snapshot = AgentSnapshot::capture(pools, state).await;
    for sink in &snapshot.sinks {
        agent_debug!(
            Component::Monitor,
            business = %sink.business,
            buffered = sink.buffered,
            forwarded = sink.forwarded,
            failed = sink.failed,
            dropped = sink.dropped,
            "Sink stats"
        );
    }
    for finding in snapshot.findings() {
        agent_warn!(Component::Monitor, "⚠️ {}", finding);
    }
}
