//! Queue consumer pool
//!
//! Each `QueueWorkerPool` pairs a queue name with one pooled queue client.
//! The orchestrator spawns a fixed number of worker loops per pool; every
//! loop pops, decodes and routes records until the running flag drops.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shared::{agent_debug, agent_info, agent_warn, decode_record, Component};

use super::routing::{Delivery, RecordRouter};
use crate::traits::{QueueConnection, QueuePool};

/// Throughput and drop counters for one queue pool
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct QueueStats {
    pub queue_name: String,
    pub endpoint: String,
    pub consumed: u64,
    pub throughput: u64,
    pub malformed: u64,
    pub dropped: u64,
}

pub struct QueueWorkerPool {
    queue_name: String,
    pool: Arc<dyn QueuePool>,
    last_value: AtomicU64,
    curr_value: AtomicU64,
    malformed: AtomicU64,
    dropped: AtomicU64,
}

impl QueueWorkerPool {
    pub fn new(queue_name: impl Into<String>, pool: Arc<dyn QueuePool>) -> Self {
        Self {
            queue_name: queue_name.into(),
            pool,
            last_value: AtomicU64::new(0),
            curr_value: AtomicU64::new(0),
            malformed: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn endpoint(&self) -> String {
        self.pool.endpoint()
    }

    pub fn consumed(&self) -> u64 {
        self.curr_value.load(Ordering::Relaxed)
    }

    /// Records consumed since the previous call
    pub fn take_throughput(&self) -> u64 {
        let curr = self.curr_value.load(Ordering::Relaxed);
        let last = self.last_value.swap(curr, Ordering::Relaxed);
        curr.saturating_sub(last)
    }

    /// Counters without resetting the throughput window
    pub fn stats(&self) -> QueueStats {
        let consumed = self.consumed();
        QueueStats {
            queue_name: self.queue_name.clone(),
            endpoint: self.endpoint(),
            consumed,
            throughput: consumed.saturating_sub(self.last_value.load(Ordering::Relaxed)),
            malformed: self.malformed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Everything a worker loop needs besides its pool
#[derive(Clone)]
pub struct WorkerContext {
    pub running: Arc<AtomicBool>,
    pub router: RecordRouter,
    pub poll_interval: Duration,
}

/// One consumer loop
///
/// Transport errors drop the connection and reacquire on the next pass
/// without backoff. An empty pop, or a failure to acquire a connection at
/// all, sleeps for the poll interval.
pub async fn run_worker(pool: Arc<QueueWorkerPool>, ctx: WorkerContext, worker: usize) {
    let queue_name = pool.queue_name().to_string();
    let mut conn: Option<Box<dyn QueueConnection>> = None;

    agent_debug!(Component::QueueWorker, queue = %queue_name, worker, "Worker started");

    while ctx.running.load(Ordering::Acquire) {
        let Some(connection) = conn.as_mut() else {
            match pool.pool.acquire().await {
                Ok(fresh) => conn = Some(fresh),
                Err(e) => {
                    agent_warn!(Component::QueueWorker, queue = %queue_name, worker, "Acquire failed: {}", e);
                    tokio::time::sleep(ctx.poll_interval).await;
                }
            }
            continue;
        };

        let popped = connection.pop(&queue_name).await;
        let payload = match popped {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                tokio::time::sleep(ctx.poll_interval).await;
                continue;
            }
            Err(e) => {
                agent_warn!(Component::QueueWorker, queue = %queue_name, worker, "LPOP failed, reconnecting: {}", e);
                conn = None;
                continue;
            }
        };

        pool.curr_value.fetch_add(1, Ordering::Relaxed);

        let (business, event) = decode_record(&payload);
        let Some(event) = event else {
            pool.malformed.fetch_add(1, Ordering::Relaxed);
            agent_debug!(Component::QueueWorker, queue = %queue_name, bytes = payload.len(), "Malformed record dropped");
            continue;
        };

        if ctx.router.route(&business, event).await == Delivery::Dropped {
            pool.dropped.fetch_add(1, Ordering::Relaxed);
            agent_warn!(Component::QueueWorker, queue = %queue_name, business = %business, "Record dropped");
        }
    }

    drop(conn);
    agent_info!(Component::QueueWorker, queue = %queue_name, worker, "REDIS-POP|EXIT");
}
