//! Redis list queue client
//!
//! Speaks just enough RESP to issue `LPOP` over plain TCP. Connections are
//! capped by a semaphore and healthy ones are parked for reuse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use shared::{agent_debug, agent_info, Component};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;

use crate::error::{AgentError, AgentResult};
use crate::traits::{QueueConnection, QueuePool};

type Stream = BufReader<TcpStream>;

/// Largest bulk reply accepted from the server
pub const MAX_BULK_LEN: usize = 64 * 1024 * 1024;

struct PoolShared {
    endpoint: String,
    timeout: Duration,
    max_idle: usize,
    permits: Arc<Semaphore>,
    idle: Mutex<Vec<Stream>>,
    closed: AtomicBool,
}

/// Connection pool for one Redis endpoint
pub struct RedisQueuePool {
    shared: Arc<PoolShared>,
}

impl RedisQueuePool {
    pub fn new(endpoint: impl Into<String>, timeout: Duration, max_connections: usize) -> Self {
        let max_connections = max_connections.max(1);
        Self {
            shared: Arc::new(PoolShared {
                endpoint: endpoint.into(),
                timeout,
                max_idle: (max_connections / 2).max(1),
                permits: Arc::new(Semaphore::new(max_connections)),
                idle: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Connections currently parked for reuse
    pub fn idle_connections(&self) -> usize {
        self.shared.idle.lock().len()
    }

    async fn dial(&self) -> AgentResult<Stream> {
        let endpoint = &self.shared.endpoint;
        let stream = timeout(self.shared.timeout, TcpStream::connect(endpoint.as_str()))
            .await
            .map_err(|_| AgentError::queue(endpoint.clone(), "connect timed out"))?
            .map_err(|e| AgentError::queue(endpoint.clone(), e.to_string()))?;
        stream.set_nodelay(true)?;
        agent_debug!(Component::Queue, endpoint = %endpoint, "Opened queue connection");
        Ok(BufReader::new(stream))
    }
}

#[async_trait]
impl QueuePool for RedisQueuePool {
    fn endpoint(&self) -> String {
        self.shared.endpoint.clone()
    }

    async fn acquire(&self) -> AgentResult<Box<dyn QueueConnection>> {
        let closed = || AgentError::QueuePoolClosed {
            endpoint: self.shared.endpoint.clone(),
        };
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(closed());
        }

        let permit = Arc::clone(&self.shared.permits)
            .acquire_owned()
            .await
            .map_err(|_| closed())?;

        let parked = self.shared.idle.lock().pop();
        let stream = match parked {
            Some(stream) => stream,
            None => self.dial().await?,
        };

        Ok(Box::new(RedisConnection {
            stream: Some(stream),
            shared: Arc::clone(&self.shared),
            healthy: true,
            _permit: permit,
        }))
    }

    async fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shared.permits.close();
        self.shared.idle.lock().clear();
        agent_info!(Component::Queue, endpoint = %self.shared.endpoint, "Queue pool closed");
    }
}

/// One pooled connection; returned to the pool on drop unless it failed
pub struct RedisConnection {
    stream: Option<Stream>,
    shared: Arc<PoolShared>,
    healthy: bool,
    _permit: OwnedSemaphorePermit,
}

impl RedisConnection {
    async fn lpop(&mut self, queue_name: &str) -> AgentResult<Option<Vec<u8>>> {
        let endpoint = self.shared.endpoint.clone();
        let deadline = self.shared.timeout;
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| AgentError::queue(endpoint.clone(), "connection already released"))?;

        let command = lpop_command(queue_name);
        timeout(deadline, stream.get_mut().write_all(&command))
            .await
            .map_err(|_| AgentError::queue(endpoint.clone(), "write timed out"))??;

        timeout(deadline, read_bulk_reply(stream, &endpoint))
            .await
            .map_err(|_| AgentError::queue(endpoint.clone(), "read timed out"))?
    }
}

#[async_trait]
impl QueueConnection for RedisConnection {
    async fn pop(&mut self, queue_name: &str) -> AgentResult<Option<Vec<u8>>> {
        let result = self.lpop(queue_name).await;
        if result.is_err() {
            self.healthy = false;
        }
        result
    }
}

impl Drop for RedisConnection {
    fn drop(&mut self) {
        let Some(stream) = self.stream.take() else {
            return;
        };
        if !self.healthy || self.shared.closed.load(Ordering::Acquire) {
            return;
        }
        let mut idle = self.shared.idle.lock();
        if idle.len() < self.shared.max_idle {
            idle.push(stream);
        }
    }
}

fn lpop_command(queue_name: &str) -> Vec<u8> {
    format!(
        "*2\r\n$4\r\nLPOP\r\n${}\r\n{}\r\n",
        queue_name.len(),
        queue_name
    )
    .into_bytes()
}

/// Read one reply to `LPOP`: a bulk string, a null, or an error
async fn read_bulk_reply(stream: &mut Stream, endpoint: &str) -> AgentResult<Option<Vec<u8>>> {
    let mut header = String::new();
    if stream.read_line(&mut header).await? == 0 {
        return Err(AgentError::queue(endpoint, "connection closed by server"));
    }
    let header = header.trim_end_matches(['\r', '\n']);
    let unexpected = || AgentError::queue(endpoint, format!("unexpected reply '{}'", header));

    let kind = header.as_bytes().first().copied().ok_or_else(unexpected)?;
    let rest = header.get(1..).ok_or_else(unexpected)?;
    match kind {
        b'$' => {
            let len: i64 = rest
                .parse()
                .map_err(|_| AgentError::queue(endpoint, format!("bad bulk length '{}'", rest)))?;
            if len < 0 {
                return Ok(None);
            }
            let len = usize::try_from(len)
                .ok()
                .filter(|len| *len <= MAX_BULK_LEN)
                .ok_or_else(|| AgentError::queue(endpoint, format!("bulk length {} exceeds {}", rest, MAX_BULK_LEN)))?;
            let mut payload = vec![0u8; len + 2];
            stream.read_exact(&mut payload).await?;
            payload.truncate(len);
            Ok(Some(payload))
        }
        b'_' => Ok(None),
        b'*' if rest == "-1" => Ok(None),
        b'-' => Err(AgentError::queue(endpoint, rest.to_string())),
        _ => Err(unexpected()),
    }
}
