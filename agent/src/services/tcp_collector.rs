//! TCP collector client
//!
//! Frames are a big-endian `u32` length followed by a bincode `LogEvent`.
//! The collector answers each frame with a single status byte, `0` for
//! success.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{agent_debug, Component, LogEvent, NodeIdentity};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::time::timeout;

use crate::error::{AgentError, AgentResult};
use crate::traits::{CollectorConnector, CollectorPool};

/// Status byte sent back by the collector for an accepted frame
pub const ACK_OK: u8 = 0;

/// Largest frame a collector will accept
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Creates `TcpCollectorPool`s
#[derive(Debug, Clone)]
pub struct TcpCollectorConnector {
    timeout: Duration,
    max_connections: usize,
}

impl TcpCollectorConnector {
    pub fn new(timeout: Duration, max_connections: usize) -> Self {
        Self {
            timeout,
            max_connections: max_connections.max(1),
        }
    }
}

#[async_trait]
impl CollectorConnector for TcpCollectorConnector {
    /// Dials the node once so an unreachable node fails here
    async fn connect(&self, node: &NodeIdentity) -> AgentResult<Box<dyn CollectorPool>> {
        let stream = dial(node, self.timeout).await.map_err(|e| AgentError::NodeUnreachable {
            node: node.clone(),
            message: e.to_string(),
        })?;

        Ok(Box::new(TcpCollectorPool {
            node: node.clone(),
            timeout: self.timeout,
            max_idle: self.max_connections,
            permits: Semaphore::new(self.max_connections),
            idle: Mutex::new(vec![stream]),
            destroyed: AtomicBool::new(false),
        }))
    }
}

pub struct TcpCollectorPool {
    node: NodeIdentity,
    timeout: Duration,
    max_idle: usize,
    permits: Semaphore,
    idle: Mutex<Vec<TcpStream>>,
    destroyed: AtomicBool,
}

impl TcpCollectorPool {
    async fn checkout(&self) -> AgentResult<TcpStream> {
        let parked = self.idle.lock().pop();
        match parked {
            Some(stream) => Ok(stream),
            None => dial(&self.node, self.timeout).await,
        }
    }

    fn checkin(&self, stream: TcpStream) {
        if self.destroyed.load(Ordering::Acquire) {
            return;
        }
        let mut idle = self.idle.lock();
        if idle.len() < self.max_idle {
            idle.push(stream);
        }
    }
}

#[async_trait]
impl CollectorPool for TcpCollectorPool {
    async fn append(&self, event: &LogEvent) -> AgentResult<()> {
        if self.destroyed.load(Ordering::Acquire) {
            return Err(AgentError::PoolDestroyed { node: self.node.clone() });
        }

        let frame = encode_frame(event)?;
        // at most max_connections streams are checked out at once
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| AgentError::PoolDestroyed { node: self.node.clone() })?;
        let mut stream = self.checkout().await?;

        let exchange = async {
            stream.write_all(&frame).await?;
            let mut ack = [0u8; 1];
            stream.read_exact(&mut ack).await?;
            Ok::<u8, std::io::Error>(ack[0])
        };

        let outcome = timeout(self.timeout, exchange).await;
        match outcome {
            Ok(Ok(ACK_OK)) => {
                self.checkin(stream);
                Ok(())
            }
            Ok(Ok(status)) => Err(AgentError::collector(&self.node, format!("rejected with status {}", status))),
            Ok(Err(e)) => {
                agent_debug!(Component::Collector, node = %self.node, "Dropping broken connection: {}", e);
                Err(AgentError::collector(&self.node, e.to_string()))
            }
            Err(_) => Err(AgentError::collector(&self.node, "timed out waiting for ack")),
        }
    }

    async fn destroy(&self) {
        self.destroyed.store(true, Ordering::Release);
        self.permits.close();
        self.idle.lock().clear();
    }
}

async fn dial(node: &NodeIdentity, deadline: Duration) -> AgentResult<TcpStream> {
    let stream = timeout(deadline, TcpStream::connect((node.host(), node.port())))
        .await
        .map_err(|_| AgentError::collector(node, "connect timed out"))??;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Length-prefixed bincode frame for one event
pub fn encode_frame(event: &LogEvent) -> AgentResult<Vec<u8>> {
    let body = bincode::serialize(event).map_err(|e| AgentError::SerializationError {
        message: e.to_string(),
    })?;
    let len = u32::try_from(body.len()).map_err(|_| AgentError::SerializationError {
        message: format!("frame of {} bytes is too large", body.len()),
    })?;

    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame as sent by `TcpCollectorPool::append`
pub async fn read_frame<R>(reader: &mut R) -> AgentResult<LogEvent>
where
    R: AsyncRead + Unpin,
{
    let mut len_bytes = [0u8; 4];
    reader.read_exact(&mut len_bytes).await?;
    let len = u32::from_be_bytes(len_bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(AgentError::SerializationError {
            message: format!("frame of {} bytes exceeds limit", len),
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    bincode::deserialize(&body).map_err(|e| AgentError::SerializationError {
        message: e.to_string(),
    })
}

/// Answer one frame
pub async fn write_ack<W>(writer: &mut W, status: u8) -> AgentResult<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&[status]).await?;
    Ok(())
}
