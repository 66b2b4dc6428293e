//! TCP command server.
//!
//! One task per client connection reads request lines, runs each request
//! on the blocking pool (the engine waits on a lock) and writes the
//! response line back. Requests on one connection are answered in order.

use crate::dispatcher::CommandDispatcher;
use crate::error::{DaemonError, Result};
use crate::protocol::{ErrorBody, Response};
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Accepts orchestrator connections until cancelled.
pub struct Server {
    listener: TcpListener,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
    max_line_bytes: usize,
}

impl Server {
    /// Binds the listening socket.
    pub async fn bind(
        addr: SocketAddr,
        dispatcher: Arc<CommandDispatcher>,
        max_line_bytes: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            DaemonError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind {}: {}", addr, e),
            ))
        })?;
        Ok(Self {
            listener,
            dispatcher,
            shutdown: CancellationToken::new(),
            max_line_bytes,
        })
    }

    /// Address actually bound (useful with port 0).
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Token that stops the accept loop and every connection task.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Runs the accept loop.
    pub async fn run(self) -> Result<()> {
        info!("Listening for commands on {}", self.local_addr()?);

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    info!("Command server shutting down");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        info!("Client connected from {}", peer);
                        let dispatcher = Arc::clone(&self.dispatcher);
                        let shutdown = self.shutdown.child_token();
                        let max_line_bytes = self.max_line_bytes;
                        tokio::spawn(async move {
                            if let Err(e) =
                                serve_connection(stream, dispatcher, shutdown, max_line_bytes).await
                            {
                                warn!("Connection from {} ended with error: {}", peer, e);
                            }
                            debug!("Client {} disconnected", peer);
                        });
                    }
                    Err(e) => warn!("Failed to accept connection: {}", e),
                },
            }
        }

        Ok(())
    }
}

/// Binds and runs a server in a background task.
///
/// Returns the bound address, the shutdown token and the task handle.
pub async fn spawn_server(
    addr: SocketAddr,
    dispatcher: Arc<CommandDispatcher>,
    max_line_bytes: usize,
) -> Result<(SocketAddr, CancellationToken, tokio::task::JoinHandle<Result<()>>)> {
    let server = Server::bind(addr, dispatcher, max_line_bytes).await?;
    let local = server.local_addr()?;
    let token = server.shutdown_token();
    let handle = tokio::spawn(server.run());
    Ok((local, token, handle))
}

async fn serve_connection(
    stream: TcpStream,
    dispatcher: Arc<CommandDispatcher>,
    shutdown: CancellationToken,
    max_line_bytes: usize,
) -> Result<()> {
    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(max_line_bytes));
    // After a decode error the stream yields one `None` before resuming.
    let mut resync = false;

    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = framed.next() => next,
        };

        let response = match next {
            None if resync => {
                resync = false;
                continue;
            }
            None => break,
            Some(Ok(line)) if line.trim().is_empty() => continue,
            Some(Ok(line)) => {
                resync = false;
                let dispatcher = Arc::clone(&dispatcher);
                tokio::task::spawn_blocking(move || dispatcher.dispatch_line(&line))
                    .await
                    .map_err(|e| DaemonError::Protocol(format!("request task failed: {}", e)))?
            }
            Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                warn!("Discarding request line longer than {} bytes", max_line_bytes);
                resync = true;
                Response::failure(
                    Value::Null,
                    ErrorBody::malformed(format!(
                        "request line exceeds {} bytes",
                        max_line_bytes
                    )),
                )
            }
            Some(Err(e)) => return Err(e.into()),
        };

        let encoded = serde_json::to_string(&response)
            .map_err(|e| DaemonError::Protocol(format!("cannot encode response: {}", e)))?;
        framed.send(encoded).await?;
    }

    Ok(())
}
