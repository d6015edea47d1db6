//! Per-business sink
//!
//! A `Sink` owns one business's bounded buffer and a dispatch loop that
//! drains it into the business's links. Senders block while the buffer is
//! full; that is the agent's backpressure path.
//!
//! Distribution is round-robin: each record starts at the next link in
//! rotation and fails over through the remaining links in the same order.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use shared::{agent_debug, agent_error, agent_info, agent_warn, Component, LogEvent, NodeIdentity};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::link::PoolLink;

/// Point-in-time statistics for one sink
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SinkStats {
    pub business: String,
    pub generation: String,
    pub links: usize,
    pub buffered: usize,
    pub forwarded: u64,
    pub failed: u64,
    pub dropped: u64,
    pub stopped: bool,
}

pub struct Sink {
    business: String,
    generation: Uuid,
    links: Vec<Arc<PoolLink>>,
    capacity: usize,
    sender: mpsc::Sender<LogEvent>,
    receiver: Mutex<Option<mpsc::Receiver<LogEvent>>>,
    stop_signal: Mutex<Option<oneshot::Sender<()>>>,
    dispatch: Mutex<Option<JoinHandle<usize>>>,
    stop_gate: tokio::sync::Mutex<()>,
    stopped: AtomicBool,
    next_link: AtomicUsize,
    forwarded: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Sink {
    /// Build a sink over `links` with a buffer of `capacity` records
    pub fn new(business: impl Into<String>, links: Vec<Arc<PoolLink>>, capacity: usize) -> Arc<Self> {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);

        Arc::new(Self {
            business: business.into(),
            generation: Uuid::new_v4(),
            links,
            capacity,
            sender,
            receiver: Mutex::new(Some(receiver)),
            stop_signal: Mutex::new(None),
            dispatch: Mutex::new(None),
            stop_gate: tokio::sync::Mutex::new(()),
            stopped: AtomicBool::new(false),
            next_link: AtomicUsize::new(0),
            forwarded: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    pub fn business(&self) -> &str {
        &self.business
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn links(&self) -> &[Arc<PoolLink>] {
        &self.links
    }

    pub fn has_link(&self, node: &NodeIdentity) -> bool {
        self.links.iter().any(|link| link.node() == node)
    }

    /// A sink without links drops everything it receives
    pub fn is_degraded(&self) -> bool {
        self.links.is_empty()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn is_started(&self) -> bool {
        self.dispatch.lock().is_some()
    }

    /// Launch the dispatch loop
    ///
    /// Returns false when the sink was already started or has been stopped.
    pub fn start(self: &Arc<Self>) -> bool {
        let mut receiver = self.receiver.lock();
        if self.is_stopped() {
            return false;
        }
        let Some(rx) = receiver.take() else {
            return false;
        };

        let (stop_tx, stop_rx) = oneshot::channel();
        let sink = Arc::clone(self);
        let handle = tokio::spawn(async move { sink.dispatch_loop(rx, stop_rx).await });

        *self.stop_signal.lock() = Some(stop_tx);
        *self.dispatch.lock() = Some(handle);

        agent_info!(
            Component::Sink,
            business = %self.business,
            generation = %self.generation,
            links = self.links.len(),
            "▶️ Sink started"
        );
        true
    }

    /// Blocking send into the buffer
    ///
    /// Hands the event back when the sink is stopped, so the caller can
    /// re-route it.
    pub async fn send(&self, event: LogEvent) -> Result<(), LogEvent> {
        if self.is_stopped() {
            return Err(event);
        }
        self.sender.send(event).await.map_err(|rejected| rejected.0)
    }

    /// Stop the sink
    ///
    /// Marks it stopped, releases every blocked sender, forwards whatever is
    /// already buffered and waits for the dispatch loop to exit. Returns the
    /// number of buffered records flushed. Repeated calls return 0.
    pub async fn stop(&self) -> usize {
        let _gate = self.stop_gate.lock().await;
        self.stopped.store(true, Ordering::Release);

        let unstarted = self.receiver.lock().take();
        let handle = self.dispatch.lock().take();

        let drained = if let Some(rx) = unstarted {
            self.drain(rx).await
        } else if let Some(handle) = handle {
            if let Some(stop_tx) = self.stop_signal.lock().take() {
                let _ = stop_tx.send(());
            }
            match handle.await {
                Ok(drained) => drained,
                Err(e) => {
                    agent_error!(Component::Sink, business = %self.business, "Dispatch loop panicked: {}", e);
                    0
                }
            }
        } else {
            return 0;
        };

        agent_info!(
            Component::Sink,
            business = %self.business,
            generation = %self.generation,
            drained,
            "⏹️ Sink stopped"
        );
        drained
    }

    pub fn stats(&self) -> SinkStats {
        SinkStats {
            business: self.business.clone(),
            generation: self.generation.to_string(),
            links: self.links.len(),
            buffered: self.capacity.saturating_sub(self.sender.capacity()),
            forwarded: self.forwarded.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            stopped: self.is_stopped(),
        }
    }

    async fn dispatch_loop(
        self: Arc<Self>,
        mut rx: mpsc::Receiver<LogEvent>,
        mut stop_rx: oneshot::Receiver<()>,
    ) -> usize {
        loop {
            tokio::select! {
                biased;
                _ = &mut stop_rx => break,
                event = rx.recv() => match event {
                    Some(event) => self.forward(event).await,
                    None => break,
                },
            }
        }
        self.drain(rx).await
    }

    async fn drain(&self, mut rx: mpsc::Receiver<LogEvent>) -> usize {
        rx.close();
        let mut drained = 0;
        while let Some(event) = rx.recv().await {
            self.forward(event).await;
            drained += 1;
        }
        drained
    }

    async fn forward(&self, event: LogEvent) {
        let count = self.links.len();
        if count == 0 {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            agent_warn!(Component::Sink, business = %self.business, "No links available, dropping record");
            return;
        }

        let start = self.next_link.fetch_add(1, Ordering::Relaxed);
        for offset in 0..count {
            let link = &self.links[(start + offset) % count];
            match link.send(&event).await {
                Ok(()) => {
                    self.forwarded.fetch_add(1, Ordering::Relaxed);
                    return;
                }
                Err(e) => {
                    agent_debug!(
                        Component::Sink,
                        business = %self.business,
                        node = %link.node(),
                        "Link send failed, trying next: {}",
                        e
                    );
                }
            }
        }

        self.failed.fetch_add(1, Ordering::Relaxed);
        agent_error!(
            Component::Sink,
            business = %self.business,
            links = count,
            "❌ Every link failed, record not delivered"
        );
    }
}

impl std::fmt::Debug for Sink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sink")
            .field("business", &self.business)
            .field("generation", &self.generation)
            .field("links", &self.links.len())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}
