//! Agent configuration
//!
//! Loaded from a TOML file; every tunable has a default so a minimal file
//! only names businesses, queues and the discovery backend.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use shared::NodeIdentity;

use crate::error::{AgentError, AgentResult};
use crate::orchestrator::OrchestratorSettings;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Instance name, used for the log directory and presence identity
    #[serde(default = "default_instance")]
    pub instance: String,

    /// Base log directory; stdout only when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,

    #[serde(default)]
    pub log_level: Option<String>,

    pub businesses: Vec<String>,

    #[serde(default = "default_workers_per_pool")]
    pub workers_per_pool: usize,

    /// Sleep after an empty pop, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_sink_buffer_size")]
    pub sink_buffer_size: usize,

    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,

    #[serde(default)]
    pub queues: Vec<QueueEndpointConfig>,

    #[serde(default)]
    pub collector: CollectorConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEndpointConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_queue_connections")]
    pub max_connections: usize,
    pub queue_name: String,
}

impl QueueEndpointConfig {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CollectorConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_collector_connections")]
    pub max_connections: usize,
}

impl CollectorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_connections: default_collector_connections(),
        }
    }
}

/// Coordination service backend
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscoveryConfig {
    /// Fixed node lists, reloadable from the config file
    Static {
        #[serde(default)]
        nodes: BTreeMap<String, Vec<NodeIdentity>>,
    },
    /// Registry reached over HTTP
    Http {
        address: String,
        #[serde(default = "default_discovery_poll_secs")]
        poll_interval_secs: u64,
    },
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        DiscoveryConfig::Static { nodes: BTreeMap::new() }
    }
}

fn default_instance() -> String {
    "agent".to_string()
}
fn default_workers_per_pool() -> usize {
    10
}
fn default_poll_interval_ms() -> u64 {
    100
}
fn default_sink_buffer_size() -> usize {
    1000
}
fn default_monitor_interval_secs() -> u64 {
    1
}
fn default_timeout_secs() -> u64 {
    5
}
fn default_queue_connections() -> usize {
    16
}
fn default_collector_connections() -> usize {
    8
}
fn default_discovery_poll_secs() -> u64 {
    5
}

impl AgentConfig {
    /// Read, parse and validate a config file
    pub fn load(path: &Path) -> AgentResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> AgentResult<Self> {
        let config: AgentConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AgentResult<()> {
        if self.businesses.is_empty() {
            return Err(AgentError::config("businesses must not be empty"));
        }
        if self.businesses.iter().any(|business| business.trim().is_empty()) {
            return Err(AgentError::config("businesses must not contain empty names"));
        }
        if self.queues.is_empty() {
            return Err(AgentError::config("at least one [[queues]] entry is required"));
        }
        if self.workers_per_pool == 0 {
            return Err(AgentError::config("workers_per_pool must be greater than zero"));
        }
        if self.sink_buffer_size == 0 {
            return Err(AgentError::config("sink_buffer_size must be greater than zero"));
        }
        if self.monitor_interval_secs == 0 {
            return Err(AgentError::config("monitor_interval_secs must be greater than zero"));
        }

        for queue in &self.queues {
            if queue.queue_name.trim().is_empty() {
                return Err(AgentError::config(format!("queues[{}].queue_name must not be empty", queue.endpoint())));
            }
            if queue.max_connections == 0 {
                return Err(AgentError::config(format!("queues[{}].max_connections must be greater than zero", queue.endpoint())));
            }
            if queue.timeout_secs == 0 {
                return Err(AgentError::config(format!("queues[{}].timeout_secs must be greater than zero", queue.endpoint())));
            }
        }

        if self.collector.max_connections == 0 {
            return Err(AgentError::config("collector.max_connections must be greater than zero"));
        }
        if self.collector.timeout_secs == 0 {
            return Err(AgentError::config("collector.timeout_secs must be greater than zero"));
        }

        if let DiscoveryConfig::Http { address, poll_interval_secs } = &self.discovery {
            if address.trim().is_empty() {
                return Err(AgentError::config("discovery.address must not be empty"));
            }
            if *poll_interval_secs == 0 {
                return Err(AgentError::config("discovery.poll_interval_secs must be greater than zero"));
            }
        }

        Ok(())
    }

    pub fn settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            workers_per_pool: self.workers_per_pool,
            sink_buffer_size: self.sink_buffer_size,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            monitor_interval: Duration::from_secs(self.monitor_interval_secs),
        }
    }

    /// Static node lists, if the static backend is configured
    pub fn static_nodes(&self) -> Option<&BTreeMap<String, Vec<NodeIdentity>>> {
        match &self.discovery {
            DiscoveryConfig::Static { nodes } => Some(nodes),
            DiscoveryConfig::Http { .. } => None,
        }
    }
}
