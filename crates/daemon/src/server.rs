//! Loopback server
//!
//! Connections are served concurrently, but every dispatch goes through one
//! queue drained by a single thread that owns the engine, so hooks never
//! interleave.

use crate::dispatcher::Artifactor;
use artifactor_common::protocol::{self, Request, Response};
use artifactor_common::{Error, Map, Result, Value};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{lookup_host, TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio_util::codec::Framed;
use tracing::{debug, error, info, warn};

/// Requests waiting for the dispatch thread
const QUEUE_DEPTH: usize = 1024;

enum Job {
    Fire {
        event: String,
        kwargs: Map,
        reply: Option<oneshot::Sender<Response>>,
    },
    Shutdown {
        reply: oneshot::Sender<Response>,
    },
}

/// Bound server, ready to run
pub struct Server {
    listener: TcpListener,
    addr: SocketAddr,
    engine: Artifactor,
}

impl Server {
    /// Bind the configured address and publish the bound port to the engine.
    ///
    /// Only loopback addresses are accepted; anything else is rejected
    /// before a socket is opened.
    pub async fn bind(mut engine: Artifactor) -> Result<Self> {
        let requested = engine.config().server_addr();
        let candidates: Vec<SocketAddr> = lookup_host(&requested).await?.collect();
        if candidates.is_empty() {
            return Err(Error::Protocol(format!("cannot resolve {}", requested)));
        }
        if let Some(outside) = candidates.iter().find(|a| !a.ip().is_loopback()) {
            return Err(Error::Protocol(format!(
                "refusing to listen on non-loopback address {}",
                outside
            )));
        }
        let listener = TcpListener::bind(candidates.as_slice()).await?;
        let addr = listener.local_addr()?;
        engine.publish_server_address(addr);
        info!(%addr, "Artifactor server bound");
        Ok(Self {
            listener,
            addr,
            engine,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Engine access before serving starts
    pub fn engine_mut(&mut self) -> &mut Artifactor {
        &mut self.engine
    }

    /// Serve until a `Shutdown` request is handled or a fatal dispatch error occurs
    pub async fn run(self) -> Result<()> {
        let Server {
            listener, engine, ..
        } = self;
        let (queue, jobs) = mpsc::channel::<Job>(QUEUE_DEPTH);
        let (done_tx, mut done) = oneshot::channel::<Result<()>>();

        std::thread::Builder::new()
            .name("artifactor-dispatch".into())
            .spawn(move || {
                let _ = done_tx.send(dispatch_loop(engine, jobs));
            })?;

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            debug!(%peer, "Accepted connection");
                            let queue = queue.clone();
                            tokio::spawn(async move {
                                if let Err(e) = serve_connection(stream, peer, queue).await {
                                    warn!(%peer, error = %e, "Connection closed with error");
                                }
                            });
                        }
                        Err(e) => warn!(error = %e, "Failed to accept connection"),
                    }
                }
                finished = &mut done => {
                    return match finished {
                        Ok(result) => result,
                        Err(_) => Err(Error::Protocol(
                            "dispatch thread exited unexpectedly".into(),
                        )),
                    };
                }
            }
        }
    }
}

fn dispatch_loop(mut engine: Artifactor, mut jobs: mpsc::Receiver<Job>) -> Result<()> {
    while let Some(job) = jobs.blocking_recv() {
        match job {
            Job::Fire {
                event,
                kwargs,
                reply,
            } => {
                let response = match engine.fire_hook(&event, kwargs) {
                    Ok(local) => Response::Value(Value::Map(local)),
                    Err(err) if err.is_fatal() => {
                        error!(event = %event, error = %err, "Fatal error, stopping server");
                        if let Some(reply) = reply {
                            let _ = reply.send(Response::Error(err.to_string()));
                        }
                        return Err(err);
                    }
                    Err(err) => Response::Error(err.to_string()),
                };
                if let Some(reply) = reply {
                    let _ = reply.send(response);
                }
            }
            Job::Shutdown { reply } => {
                info!("Shutdown requested, stopping server");
                let _ = reply.send(Response::Ack);
                return Ok(());
            }
        }
    }
    Ok(())
}

async fn serve_connection(
    stream: TcpStream,
    peer: SocketAddr,
    queue: mpsc::Sender<Job>,
) -> Result<()> {
    let mut framed = Framed::new(stream, protocol::codec());

    while let Some(frame) = framed.next().await {
        let frame = frame?;
        let response = match protocol::decode::<Request>(&frame) {
            Ok(request) => {
                debug!(%peer, request = request.label(), "Received request");
                handle_request(request, &queue).await
            }
            Err(e) => {
                warn!(%peer, error = %e, "Malformed request");
                Response::Error(format!("malformed request: {}", e))
            }
        };
        framed.send(protocol::encode(&response)?).await?;
    }
    debug!(%peer, "Connection closed");
    Ok(())
}

async fn handle_request(request: Request, queue: &mpsc::Sender<Job>) -> Response {
    let stopped = || Response::Error("dispatcher is not running".to_string());
    match request {
        Request::Ping => Response::Pong,
        Request::FireHook {
            event,
            kwargs,
            want_result: false,
        } => {
            let job = Job::Fire {
                event,
                kwargs,
                reply: None,
            };
            match queue.send(job).await {
                Ok(()) => Response::Ack,
                Err(_) => stopped(),
            }
        }
        Request::FireHook { event, kwargs, .. } => {
            let (reply, response) = oneshot::channel();
            let job = Job::Fire {
                event,
                kwargs,
                reply: Some(reply),
            };
            if queue.send(job).await.is_err() {
                return stopped();
            }
            response.await.unwrap_or_else(|_| stopped())
        }
        Request::Shutdown => {
            let (reply, response) = oneshot::channel();
            if queue.send(Job::Shutdown { reply }).await.is_err() {
                return stopped();
            }
            response.await.unwrap_or_else(|_| stopped())
        }
    }
}
