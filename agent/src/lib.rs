//! Log-shipping agent
//!
//! Drains records from source queues, routes each one by its business tag
//! and forwards it to the collector nodes currently assigned to that
//! business. Node assignments come from a coordination service and can
//! change at runtime; the orchestrator reprovisions connection pools and
//! sinks without stopping the consumers.

pub mod config;
pub mod core;
pub mod error;
pub mod orchestrator;
pub mod services;
pub mod traits;
pub mod watcher;

// Re-export commonly used types
pub use config::{AgentConfig, CollectorConfig, DiscoveryConfig, QueueEndpointConfig};
pub use core::{AgentSnapshot, Delivery, PoolLink, Sink, DEFAULT_BUSINESS};
pub use error::{AgentError, AgentResult};
pub use orchestrator::{Orchestrator, OrchestratorSettings};
pub use traits::{CollectorConnector, CollectorPool, Discovery, NodeWatcher, QueueConnection, QueuePool};
pub use watcher::{DiscoveryWatcher, Provisioner};
