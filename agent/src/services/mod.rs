//! Service implementations
//!
//! Concrete clients for the queue, the collector and the coordination
//! service. The orchestrator only sees them through the traits.

pub mod http_discovery;
pub mod redis_queue;
pub mod static_discovery;
pub mod tcp_collector;

#[cfg(test)]
mod tests;

pub use http_discovery::{HttpDiscovery, Presence};
pub use redis_queue::RedisQueuePool;
pub use static_discovery::StaticDiscovery;
pub use tcp_collector::{TcpCollectorConnector, TcpCollectorPool};
