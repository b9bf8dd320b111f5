//! TCP client endpoint.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::net::TcpSocket;
use tracing::{info, warn};

use crate::command::CommandRegistry;
use crate::config::ClientConfig;
use crate::connection::Connection;
use crate::error::Result;

use super::events::{EventHub, TransportEvent};
use super::{run_connection, LoopExit, RecvContext};

/// Lifecycle state of a [`TcpClient`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Disconnected,
    Connecting,
    Connected,
    /// The connection ended on a protocol, crypto or I/O error. A new
    /// `connect` call leaves this state.
    Faulted,
}

/// Dials a single frame-protocol connection.
///
/// The client owns its own command registry for frames the remote pushes
/// back. There is no automatic reconnection; a dropped connection stays
/// dropped until `connect` is called again.
pub struct TcpClient {
    config: ClientConfig,
    registry: Arc<CommandRegistry>,
    events: Arc<EventHub>,
    state: Arc<Mutex<ClientState>>,
    connection: Mutex<Option<Arc<Connection>>>,
}

impl TcpClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            registry: Arc::new(CommandRegistry::new()),
            events: Arc::new(EventHub::new()),
            state: Arc::new(Mutex::new(ClientState::Disconnected)),
            connection: Mutex::new(None),
        }
    }

    /// Command registry for server-pushed frames.
    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    /// Subscribe to lifecycle and traffic events.
    pub fn events(&self) -> tokio::sync::mpsc::UnboundedReceiver<TransportEvent> {
        self.events.subscribe()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ClientState {
        *lock(&self.state)
    }

    /// Connection handle while connected.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Dial `addr` and start the receive loop.
    ///
    /// Returns the live connection handle. Calling while already
    /// connected returns the existing handle.
    pub async fn connect(&self, addr: SocketAddr) -> Result<Arc<Connection>> {
        {
            let mut state = lock(&self.state);
            if *state == ClientState::Connected {
                if let Some(conn) = self.connection() {
                    return Ok(conn);
                }
            }
            *state = ClientState::Connecting;
        }

        let stream = match self.dial(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                *lock(&self.state) = ClientState::Disconnected;
                return Err(e);
            }
        };
        let _ = stream.set_nodelay(true);
        let (mut reader, writer) = stream.into_split();

        let conn = super::new_connection(writer, addr, &self.config.transport);
        *self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::clone(&conn));
        *lock(&self.state) = ClientState::Connected;
        self.events
            .emit(TransportEvent::Connected(Arc::clone(&conn)));
        info!(connection = %conn.id(), remote = %addr, "client connected");

        let registry = Arc::clone(&self.registry);
        let events = Arc::clone(&self.events);
        let state = Arc::clone(&self.state);
        let transport = self.config.transport.clone();
        let loop_conn = Arc::clone(&conn);
        tokio::spawn(async move {
            let mut ctx = RecvContext::new(&transport);
            let exit = run_connection(&loop_conn, &mut reader, &registry, &events, &mut ctx).await;

            loop_conn.close();
            loop_conn.shutdown_writer().await;
            {
                let mut state = lock(&state);
                // A reconnect may already have replaced this connection.
                if *state == ClientState::Connected || *state == ClientState::Connecting {
                    *state = match exit {
                        LoopExit::Clean => ClientState::Disconnected,
                        LoopExit::Faulted => ClientState::Faulted,
                    };
                }
            }
            if exit == LoopExit::Faulted {
                warn!(connection = %loop_conn.id(), "client connection faulted");
            }
            events.emit(TransportEvent::Disconnected(Arc::clone(&loop_conn)));
        });

        Ok(conn)
    }

    /// Close the current connection, if any.
    pub fn disconnect(&self) {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(conn) = conn {
            conn.close();
        }
        *lock(&self.state) = ClientState::Disconnected;
    }

    async fn dial(&self, addr: SocketAddr) -> Result<tokio::net::TcpStream> {
        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_keepalive(true)?;
        Ok(socket.connect(addr).await?)
    }
}

impl Drop for TcpClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn lock(state: &Mutex<ClientState>) -> std::sync::MutexGuard<'_, ClientState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
