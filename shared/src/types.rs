//! Core shared types and identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::{SharedError, SharedResult};

/// Stable identity of one downstream collector instance
///
/// Serialized as `host:port` so node lists read naturally in configuration
/// files and coordination-service payloads.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct NodeIdentity {
    host: String,
    port: u16,
}

impl NodeIdentity {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Parse a `host:port` string
    pub fn parse(input: &str) -> SharedResult<Self> {
        let invalid = || SharedError::InvalidNodeIdentity {
            input: input.to_string(),
        };

        let (host, port) = input.trim().rsplit_once(':').ok_or_else(invalid)?;
        if host.is_empty() {
            return Err(invalid());
        }
        let port = port.parse::<u16>().map_err(|_| invalid())?;

        Ok(Self::new(host, port))
    }
}

impl fmt::Display for NodeIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for NodeIdentity {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for NodeIdentity {
    type Error = SharedError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<NodeIdentity> for String {
    fn from(node: NodeIdentity) -> Self {
        node.to_string()
    }
}

/// Subsystem tag attached to every log event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Component {
    SourceManager,
    Sink,
    QueueWorker,
    Watcher,
    PoolLink,
    Monitor,
    Discovery,
    Queue,
    Collector,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Component::SourceManager => "source_manager",
            Component::Sink => "sink",
            Component::QueueWorker => "queue_worker",
            Component::Watcher => "watcher",
            Component::PoolLink => "pool_link",
            Component::Monitor => "monitor",
            Component::Discovery => "discovery",
            Component::Queue => "queue",
            Component::Collector => "collector",
        };
        f.write_str(name)
    }
}

/// Identity announced to the coordination service
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentIdentity {
    pub hostname: String,
    pub instance: String,
    pub pid: u32,
}

impl AgentIdentity {
    pub fn new(hostname: impl Into<String>, instance: impl Into<String>, pid: u32) -> Self {
        Self {
            hostname: hostname.into(),
            instance: instance.into(),
            pid,
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}:{}", self.hostname, self.instance, self.pid)
    }
}
