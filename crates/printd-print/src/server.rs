// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Loopback TCP listener for plain line protocols (the socket probe).
//
// The listener runs an accept loop in its own task until `stop` is called.
// Each connection is handed to a `ConnectionHandler` in a separate task, so
// one slow client never blocks another.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use printd_core::error::{PrintdError, Result};
use printd_core::types::ServerStatus;

/// Serves one accepted connection.
pub trait ConnectionHandler: Send + Sync + 'static {
    fn handle(
        &self,
        stream: TcpStream,
        peer: SocketAddr,
    ) -> impl Future<Output = Result<()>> + Send;
}

pub struct LocalServer {
    /// Name used in logs (`http`, `socket`).
    name: &'static str,
    /// Requested bind address; port 0 picks a free port.
    addr: SocketAddr,
    /// Address actually bound while running.
    local_addr: Option<SocketAddr>,
    status: ServerStatus,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
}

impl LocalServer {
    /// Create a server in `Stopped` state.
    pub fn new(name: &'static str, addr: SocketAddr) -> Self {
        Self {
            name,
            addr,
            local_addr: None,
            status: ServerStatus::Stopped,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// The bound address, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind and start accepting connections.
    ///
    /// # Errors
    ///
    /// Returns `Server` if the address is in use or cannot be bound.
    pub async fn start<H: ConnectionHandler>(&mut self, handler: Arc<H>) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(server = self.name, "already running");
            return Ok(());
        }
        self.status = ServerStatus::Starting;

        let listener = match TcpListener::bind(self.addr).await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(PrintdError::Server(format!("{} bind {}: {e}", self.name, self.addr)));
            }
        };
        let local_addr = listener.local_addr()?;
        info!(server = self.name, addr = %local_addr, "listening");

        let shutdown = Arc::clone(&self.shutdown_signal);
        let connections = Arc::clone(&self.active_connections);
        let name = self.name;
        self.task_handle = Some(tokio::spawn(async move {
            accept_loop(name, listener, shutdown, connections, handler).await;
        }));
        self.local_addr = Some(local_addr);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting and wait for the accept loop to exit. Connections
    /// already being served run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }
        info!(server = self.name, "stopping");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| PrintdError::Server(format!("{} task join: {e}", self.name)))?;
        }
        self.local_addr = None;
        self.status = ServerStatus::Stopped;
        info!(server = self.name, "stopped");
        Ok(())
    }
}

async fn accept_loop<H: ConnectionHandler>(
    name: &'static str,
    listener: TcpListener,
    shutdown: Arc<Notify>,
    connections: Arc<AtomicU32>,
    handler: Arc<H>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!(server = name, "accept loop received shutdown signal");
                break;
            }

            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(server = name, peer = %peer, "connection accepted");
                    let handler = Arc::clone(&handler);
                    let connections = Arc::clone(&connections);
                    tokio::spawn(async move {
                        connections.fetch_add(1, Ordering::Relaxed);
                        if let Err(e) = handler.handle(stream, peer).await {
                            warn!(server = name, peer = %peer, error = %e, "connection handler error");
                        }
                        connections.fetch_sub(1, Ordering::Relaxed);
                    });
                }
                Err(e) => error!(server = name, error = %e, "failed to accept connection"),
            }
        }
    }
}
