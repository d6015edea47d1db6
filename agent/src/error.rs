//! Agent-specific error types

use shared::{NodeIdentity, SharedError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Queue operation failed on {endpoint}: {message}")]
    QueueError { endpoint: String, message: String },

    #[error("Queue pool closed: {endpoint}")]
    QueuePoolClosed { endpoint: String },

    #[error("Collector node unreachable: {node}: {message}")]
    NodeUnreachable { node: NodeIdentity, message: String },

    #[error("Collector send failed to {node}: {message}")]
    CollectorSendFailed { node: NodeIdentity, message: String },

    #[error("Collector pool destroyed: {node}")]
    PoolDestroyed { node: NodeIdentity },

    #[error("Discovery error: {message}")]
    DiscoveryError { message: String },

    #[error("Configuration error: {field}")]
    ConfigurationError { field: String },

    #[error("Orchestrator is closed")]
    Closed,

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Binary serialization error: {message}")]
    SerializationError { message: String },
}

impl AgentError {
    pub fn config(field: impl Into<String>) -> Self {
        Self::ConfigurationError { field: field.into() }
    }

    pub fn queue(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        Self::QueueError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    pub fn discovery(message: impl Into<String>) -> Self {
        Self::DiscoveryError { message: message.into() }
    }

    pub fn collector(node: &NodeIdentity, message: impl Into<String>) -> Self {
        Self::CollectorSendFailed {
            node: node.clone(),
            message: message.into(),
        }
    }
}

pub type AgentResult<T> = Result<T, AgentError>;
