//! Core routing machinery: links, sinks, routing state, consumers and the monitor

pub mod consumer;
pub mod link;
pub mod monitor;
pub mod routing;
pub mod sink;

#[cfg(test)]
pub(crate) mod testing;

pub use consumer::{run_worker, QueueStats, QueueWorkerPool, WorkerContext};
pub use link::{LinkStats, PoolLink};
pub use monitor::{AgentSnapshot, Finding, Monitor};
pub use routing::{Delivery, RecordRouter, Route, RoutingState, DEFAULT_BUSINESS};
pub use sink::{Sink, SinkStats};
