//! Main entry point for the agent binary
//!
//! Wires the Redis queue client, the TCP collector client and the configured
//! discovery backend into the orchestrator, then runs until signalled.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use agent::services::{HttpDiscovery, RedisQueuePool, StaticDiscovery, TcpCollectorConnector};
use agent::{AgentConfig, AgentResult, Discovery, DiscoveryConfig, Orchestrator, QueuePool};
use shared::{agent_info, agent_warn, logging, Component};

/// Log-shipping agent: routes queued records to collector nodes by business
#[derive(Parser)]
#[command(name = "agent")]
#[command(about = "Drains log queues and ships records to collector nodes per business")]
pub struct Args {
    /// Path to the TOML configuration file
    #[arg(long, env = "AGENT_CONFIG", default_value = "agent.toml")]
    pub config: PathBuf,

    /// Instance name (overrides the config file)
    #[arg(long, env = "AGENT_INSTANCE")]
    pub instance: Option<String>,

    /// Base log directory (overrides the config file)
    #[arg(long, env = "AGENT_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "AGENT_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Validate the configuration and exit
    #[arg(long)]
    pub check: bool,
}

#[tokio::main]
async fn main() -> AgentResult<()> {
    dotenv::dotenv().ok();
    let args = Args::parse();

    let mut config = AgentConfig::load(&args.config)?;
    if let Some(instance) = args.instance.clone() {
        config.instance = instance;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir.clone();
    }
    if args.log_level.is_some() {
        config.log_level = args.log_level.clone();
    }

    if args.check {
        println!("✅ {} is valid", args.config.display());
        return Ok(());
    }

    let log_dir = match &config.log_dir {
        Some(base) => Some(logging::prepare_log_dir(base, &config.instance)?),
        None => None,
    };
    logging::init_tracing(config.log_level.as_deref(), log_dir.as_deref())?;
    logging::log_startup(
        Component::SourceManager,
        &format!("instance '{}', {} businesses", config.instance, config.businesses.len()),
    );

    let queues: Vec<(String, Arc<dyn QueuePool>)> = config
        .queues
        .iter()
        .map(|queue| {
            let pool: Arc<dyn QueuePool> =
                Arc::new(RedisQueuePool::new(queue.endpoint(), queue.timeout(), queue.max_connections));
            (queue.queue_name.clone(), pool)
        })
        .collect();

    let connector = TcpCollectorConnector::new(config.collector.timeout(), config.collector.max_connections);

    let mut reloader: Option<Arc<StaticDiscovery>> = None;
    let discovery: Arc<dyn Discovery> = match &config.discovery {
        DiscoveryConfig::Static { nodes } => {
            let backend = Arc::new(StaticDiscovery::new(nodes.clone()));
            reloader = Some(Arc::clone(&backend));
            backend
        }
        DiscoveryConfig::Http {
            address,
            poll_interval_secs,
        } => Arc::new(HttpDiscovery::new(
            address.clone(),
            Duration::from_secs(*poll_interval_secs),
            config.collector.timeout(),
        )?),
    };

    let orchestrator = Orchestrator::new(
        config.instance.clone(),
        config.settings(),
        config.businesses.clone(),
        queues,
        connector,
        discovery,
    )
    .await?;

    if let Err(e) = orchestrator.start().await {
        orchestrator.close().await;
        return Err(e);
    }

    let waited = wait_for_shutdown(&args.config, reloader).await;
    orchestrator.close().await;
    logging::log_shutdown(Component::SourceManager, "signal received");
    waited
}

#[cfg(unix)]
async fn wait_for_shutdown(config_path: &Path, reloader: Option<Arc<StaticDiscovery>>) -> AgentResult<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    let mut hangup = signal(SignalKind::hangup())?;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                agent_info!(Component::SourceManager, "🛑 Interrupted, shutting down");
                return Ok(());
            }
            _ = terminate.recv() => {
                agent_info!(Component::SourceManager, "🛑 SIGTERM received, shutting down");
                return Ok(());
            }
            _ = hangup.recv() => reload_static_nodes(config_path, reloader.as_deref()).await,
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown(_config_path: &Path, _reloader: Option<Arc<StaticDiscovery>>) -> AgentResult<()> {
    tokio::signal::ctrl_c().await?;
    agent_info!(Component::SourceManager, "🛑 Interrupted, shutting down");
    Ok(())
}

/// Re-read the config file and push changed static node lists to the watchers
#[cfg_attr(not(unix), allow(dead_code))]
async fn reload_static_nodes(config_path: &Path, reloader: Option<&StaticDiscovery>) {
    let Some(discovery) = reloader else {
        agent_warn!(Component::Discovery, "SIGHUP ignored, discovery is not static");
        return;
    };

    match AgentConfig::load(config_path) {
        Ok(config) => match config.static_nodes() {
            Some(nodes) => {
                discovery.reload(nodes.clone()).await;
            }
            None => {
                agent_warn!(Component::Discovery, "Reloaded config no longer uses static discovery");
            }
        },
        Err(e) => {
            agent_warn!(Component::Discovery, "Config reload failed, keeping current nodes: {}", e);
        }
    }
}
