//! TCP server endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::command::CommandRegistry;
use crate::config::ServerConfig;
use crate::connection::ConnectionTable;
use crate::error::Result;
use crate::pool::Pool;

use super::events::{EventHub, TransportEvent};
use super::{run_connection, LoopExit, RecvContext};

/// Lifecycle state of a [`TcpServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Stopped,
    Starting,
    Listening,
}

/// Accepts TCP connections and runs the frame protocol over each.
///
/// The server owns its command registry and connection table. `start` is
/// re-entrant: calling it while already listening returns the bound
/// address without side effects.
pub struct TcpServer {
    config: ServerConfig,
    registry: Arc<CommandRegistry>,
    connections: Arc<ConnectionTable>,
    events: Arc<EventHub>,
    pool: Arc<Pool<RecvContext>>,
    state: Mutex<ServerState>,
    local_addr: Mutex<Option<SocketAddr>>,
    shutdown: Mutex<Option<watch::Sender<bool>>>,
    start_lock: tokio::sync::Mutex<()>,
}

impl TcpServer {
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(CommandRegistry::new());
        // Built-in liveness probe. The read loop already refreshes
        // activity; the handler exists so pings route somewhere instead
        // of logging as unknown.
        registry
            .register_raw("Ping", |conn, _body| async move {
                conn.touch();
                Ok(())
            })
            .ok();

        let pool_config = config.transport.clone();
        Self {
            config,
            registry,
            connections: Arc::new(ConnectionTable::new()),
            events: Arc::new(EventHub::new()),
            pool: Arc::new(Pool::new(move || RecvContext::new(&pool_config))),
            state: Mutex::new(ServerState::Stopped),
            local_addr: Mutex::new(None),
            shutdown: Mutex::new(None),
            start_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Command registry for this server.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Live connections accepted by this server.
    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Subscribe to lifecycle and traffic events.
    pub fn events(&self) -> tokio::sync::mpsc::UnboundedReceiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ServerState {
        *self.lock_state()
    }

    /// Address the server is listening on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bind, listen and start accepting connections.
    ///
    /// Returns the bound address. A second call while listening is a
    /// no-op returning the same address; a call racing another `start`
    /// waits for that one to bind first.
    pub async fn start(&self) -> Result<SocketAddr> {
        let _starting = self.start_lock.lock().await;
        if self.state() == ServerState::Listening {
            if let Some(addr) = self.local_addr() {
                return Ok(addr);
            }
        }
        *self.lock_state() = ServerState::Starting;

        let listener = match self.bind_listener() {
            Ok(listener) => listener,
            Err(e) => {
                *self.lock_state() = ServerState::Stopped;
                return Err(e);
            }
        };
        let addr = listener.local_addr()?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        *self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(shutdown_tx);
        *self
            .local_addr
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(addr);
        *self.lock_state() = ServerState::Listening;

        info!(%addr, "server listening");

        let registry = Arc::clone(&self.registry);
        let connections = Arc::clone(&self.connections);
        let events = Arc::clone(&self.events);
        let pool = Arc::clone(&self.pool);
        let transport = self.config.transport.clone();
        tokio::spawn(accept_loop(
            listener,
            shutdown_rx,
            registry,
            connections,
            events,
            pool,
            transport,
        ));

        Ok(addr)
    }

    /// Stop accepting and close every live connection.
    pub fn stop(&self) {
        let shutdown = self
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(tx) = shutdown {
            let _ = tx.send(true);
        }
        for conn in self.connections.connections() {
            conn.close();
        }
        *self.lock_state() = ServerState::Stopped;
        info!("server stopped");
    }

    fn bind_listener(&self) -> Result<TcpListener> {
        let socket = if self.config.bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.set_keepalive(true)?;
        socket.bind(self.config.bind_addr)?;
        Ok(socket.listen(self.config.backlog)?)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for TcpServer {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn accept_loop(
    listener: TcpListener,
    mut shutdown: watch::Receiver<bool>,
    registry: Arc<CommandRegistry>,
    connections: Arc<ConnectionTable>,
    events: Arc<EventHub>,
    pool: Arc<Pool<RecvContext>>,
    transport: crate::config::TransportConfig,
) {
    loop {
        tokio::select! {
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, remote_addr)) => {
                    let registry = Arc::clone(&registry);
                    let connections = Arc::clone(&connections);
                    let events = Arc::clone(&events);
                    let pool = Arc::clone(&pool);
                    let transport = transport.clone();
                    tokio::spawn(async move {
                        serve_connection(
                            stream,
                            remote_addr,
                            registry,
                            connections,
                            events,
                            pool,
                            transport,
                        )
                        .await;
                    });
                }
                Err(e) => {
                    // Transient accept failures (fd exhaustion, aborted
                    // handshakes) must not kill the listener.
                    warn!(error = %e, "accept failed");
                }
            },
        }
    }
    debug!("accept loop exited");
}

async fn serve_connection(
    stream: TcpStream,
    remote_addr: SocketAddr,
    registry: Arc<CommandRegistry>,
    connections: Arc<ConnectionTable>,
    events: Arc<EventHub>,
    pool: Arc<Pool<RecvContext>>,
    transport: crate::config::TransportConfig,
) {
    let _ = stream.set_nodelay(true);
    let (mut reader, writer) = stream.into_split();

    let conn = super::new_connection(writer, remote_addr, &transport);
    connections.insert(Arc::clone(&conn));
    events.emit(TransportEvent::Connected(Arc::clone(&conn)));
    info!(connection = %conn.id(), %remote_addr, "connection accepted");

    let mut ctx = pool.take();
    let exit = run_connection(&conn, &mut reader, &registry, &events, &mut ctx).await;

    connections.remove_if_same(&conn.id(), &conn);
    conn.close();
    conn.shutdown_writer().await;
    if let Some(peer) = conn.peer() {
        peer.remove_connection_if_same(conn.transport_name(), &conn);
    }
    events.emit(TransportEvent::Disconnected(Arc::clone(&conn)));
    pool.release(ctx);
    info!(connection = %conn.id(), faulted = (exit == LoopExit::Faulted), "connection closed");
}
