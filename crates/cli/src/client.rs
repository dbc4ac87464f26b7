//! Client for the Artifactor master

use artifactor_common::protocol::{self, Request, Response};
use artifactor_common::{ArtifactorConfig, Error, Map, Result, Value};
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

/// Per-request timeout unless overridden
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection to a master.
///
/// Requests are serialized over one connection; the client can be shared
/// between tasks behind an `Arc`.
pub struct ArtifactorClient {
    addr: String,
    stream: Mutex<Framed<TcpStream, LengthDelimitedCodec>>,
    timeout: Duration,
}

impl ArtifactorClient {
    /// Connect to `addr` (`host:port`)
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        debug!(addr, "Connected to artifactor");
        Ok(Self {
            addr: addr.to_string(),
            stream: Mutex::new(Framed::new(stream, protocol::codec())),
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Connect to the server named by `server_address`/`server_port`
    pub async fn from_config(config: &ArtifactorConfig) -> Result<Self> {
        if config.server_port == 0 {
            return Err(Error::MissingConfig(
                "server_port must be set to reach the artifactor".to_string(),
            ));
        }
        Self::connect(&config.server_addr()).await
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    /// Queue `event` on the master. Returns once the master has accepted it.
    pub async fn fire_hook(&self, event: &str, kwargs: Map) -> Result<()> {
        match self.request(&Request::fire(event, kwargs, false)).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Fire `event` and wait for its final event-local data
    pub async fn fire_hook_with_result(&self, event: &str, kwargs: Map) -> Result<Map> {
        match self.request(&Request::fire(event, kwargs, true)).await? {
            Response::Value(Value::Map(local)) => Ok(local),
            other => Err(unexpected(other)),
        }
    }

    pub async fn ping(&self) -> Result<()> {
        match self.request(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    /// Check if the master is answering
    pub async fn health_check(&self) -> bool {
        self.ping().await.is_ok()
    }

    /// Ask the master to stop once queued dispatches have run
    pub async fn terminate(&self) -> Result<()> {
        match self.request(&Request::Shutdown).await? {
            Response::Ack => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    async fn request(&self, request: &Request) -> Result<Response> {
        let payload = protocol::encode(request)?;
        let mut stream = self.stream.lock().await;

        let exchange = async {
            stream.send(payload).await?;
            match stream.next().await {
                Some(frame) => protocol::decode::<Response>(&frame?),
                None => Err(Error::Protocol("connection closed by artifactor".to_string())),
            }
        };
        let response = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| Error::Timeout {
                seconds: self.timeout.as_secs(),
            })??;

        match response {
            Response::Error(message) => Err(Error::Remote(message)),
            response => Ok(response),
        }
    }
}

fn unexpected(response: Response) -> Error {
    Error::Protocol(format!("unexpected response: {:?}", response))
}

/// Parse a `key=value` argument, reading the value as a YAML scalar
pub fn parse_kwarg(raw: &str) -> std::result::Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{}'", raw))?;
    if key.is_empty() {
        return Err(format!("empty key in '{}'", raw));
    }
    let value = match serde_yaml::from_str::<serde_yaml::Value>(value) {
        Ok(parsed) if !parsed.is_mapping() && !parsed.is_sequence() => Value::from(parsed),
        _ => Value::from(value),
    };
    Ok((key.to_string(), value))
}
