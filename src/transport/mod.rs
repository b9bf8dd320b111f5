//! TCP transport endpoints.
//!
//! [`TcpServer`] accepts connections; [`TcpClient`] dials one. Both run
//! the same per-connection read loop: bytes are reassembled into frames,
//! each frame is surfaced as a [`TransportEvent::Receive`] and then
//! dispatched to the registered command. Frames on one connection are
//! handled strictly in arrival order; handlers that want concurrency
//! spawn their own tasks.

pub mod client;
pub mod events;
pub mod server;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::{debug, warn};

use crate::command::CommandRegistry;
use crate::config::TransportConfig;
use crate::connection::Connection;
use crate::pool::Reusable;
use crate::protocol::{Envelope, Reassembler};

pub use client::{ClientState, TcpClient};
pub use events::{EventHub, TransportEvent};
pub use server::{ServerState, TcpServer};

/// Pooled per-connection receive state.
pub(crate) struct RecvContext {
    read_buf: Vec<u8>,
    reassembler: Reassembler,
}

impl RecvContext {
    pub(crate) fn new(config: &TransportConfig) -> Self {
        Self {
            read_buf: vec![0; config.read_buffer_size],
            reassembler: Reassembler::with_policy(config.ring_capacity, config.allow_overwrite),
        }
    }
}

impl Reusable for RecvContext {
    fn reset(&mut self) {
        self.reassembler.reset();
    }
}

/// Wrap a write half into a connection handle configured per the
/// transport settings, including any initial envelope keys.
pub(crate) fn new_connection(
    writer: OwnedWriteHalf,
    remote_addr: SocketAddr,
    config: &TransportConfig,
) -> Arc<Connection> {
    let conn = Connection::new(
        writer,
        config.transport_name.clone(),
        remote_addr,
        config.send_timeout,
    );
    if let Some(keys) = &config.encryption {
        conn.set_envelope(Envelope::from_keys(keys.clone()));
    }
    conn
}

/// How a connection's read loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopExit {
    /// Remote EOF or a local close.
    Clean,
    /// Stream desync, crypto failure or I/O error.
    Faulted,
}

/// Read, reassemble and dispatch until the connection ends.
///
/// Socket teardown and event emission for the disconnect itself are the
/// caller's job.
pub(crate) async fn run_connection(
    conn: &Arc<Connection>,
    reader: &mut OwnedReadHalf,
    registry: &CommandRegistry,
    events: &EventHub,
    ctx: &mut RecvContext,
) -> LoopExit {
    loop {
        let n = tokio::select! {
            _ = conn.closed() => return LoopExit::Clean,
            read = reader.read(&mut ctx.read_buf) => match read {
                Ok(0) => return LoopExit::Clean,
                Ok(n) => n,
                Err(e) => {
                    debug!(connection = %conn.id(), error = %e, "socket read failed");
                    return LoopExit::Faulted;
                }
            },
        };

        conn.stats().record_received_bytes(n);
        conn.touch();

        let frames = match ctx.reassembler.push(&ctx.read_buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                warn!(connection = %conn.id(), error = %e, "stream desynchronized");
                events.emit(TransportEvent::Error {
                    connection: Some(Arc::clone(conn)),
                    error: e.to_string(),
                });
                return LoopExit::Faulted;
            }
        };

        for frame in frames {
            conn.stats().record_received_frame();
            if dispatch_frame(conn, registry, events, frame).await == LoopExit::Faulted {
                return LoopExit::Faulted;
            }
        }
    }
}

/// Route one verified frame to its command handler.
///
/// Unknown commands and handler failures are logged and reported without
/// ending the connection; envelope failures and fatal handler errors end
/// it.
async fn dispatch_frame(
    conn: &Arc<Connection>,
    registry: &CommandRegistry,
    events: &EventHub,
    frame: crate::protocol::Frame,
) -> LoopExit {
    events.emit(TransportEvent::Receive {
        connection: Arc::clone(conn),
        frame: frame.clone(),
    });

    let Some(entry) = registry.resolve(frame.command_hash()) else {
        let err = crate::error::FramewireError::UnknownCommand(*frame.command_hash());
        warn!(connection = %conn.id(), "{err}, frame dropped");
        events.emit(TransportEvent::Error {
            connection: Some(Arc::clone(conn)),
            error: err.to_string(),
        });
        return LoopExit::Clean;
    };

    let body = match conn.open_body(frame.body()) {
        Ok(body) => body,
        Err(e) => {
            warn!(connection = %conn.id(), command = %entry.name, error = %e, "envelope open failed");
            events.emit(TransportEvent::Error {
                connection: Some(Arc::clone(conn)),
                error: e.to_string(),
            });
            return LoopExit::Faulted;
        }
    };

    match entry
        .command
        .execute(Arc::clone(conn), Bytes::from(body))
        .await
    {
        Ok(()) => LoopExit::Clean,
        Err(e) => {
            warn!(connection = %conn.id(), command = %entry.name, error = %e, "command failed");
            let fatal = e.is_fatal();
            events.emit(TransportEvent::Error {
                connection: Some(Arc::clone(conn)),
                error: e.to_string(),
            });
            if fatal {
                LoopExit::Faulted
            } else {
                LoopExit::Clean
            }
        }
    }
}
