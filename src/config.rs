//! Runtime configuration.

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::envelope::EnvelopeKeys;
use crate::protocol::reassembler::DEFAULT_CAPACITY;

/// Tuning knobs shared by server and client connections.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Logical transport name connections report, e.g. `"tcp"`.
    pub transport_name: String,
    /// Size of the per-read scratch buffer.
    pub read_buffer_size: usize,
    /// Reassembly ring capacity; also the hard cap on frame size.
    pub ring_capacity: usize,
    /// Let the reassembly ring evict its oldest bytes when full.
    /// Eviction mid-frame desynchronizes the stream; leave off unless
    /// frames are known to fit and loss is acceptable.
    pub allow_overwrite: bool,
    /// How long a send waits for exclusive writer access before failing.
    pub send_timeout: Duration,
    /// Initial envelope keys for every connection. `None` means plain
    /// bodies until [`Connection::set_envelope`](crate::Connection::set_envelope)
    /// installs keys, e.g. after a handshake.
    pub encryption: Option<EnvelopeKeys>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            transport_name: "tcp".to_string(),
            read_buffer_size: 64 * 1024,
            ring_capacity: DEFAULT_CAPACITY,
            allow_overwrite: false,
            send_timeout: Duration::from_secs(5),
            encryption: None,
        }
    }
}

/// Configuration for a [`TcpServer`](crate::transport::TcpServer).
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind and listen on.
    pub bind_addr: SocketAddr,
    /// Listen backlog.
    pub backlog: u32,
    pub transport: TransportConfig,
}

impl ServerConfig {
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            backlog: 1024,
            transport: TransportConfig::default(),
        }
    }
}

/// Configuration for a [`TcpClient`](crate::transport::TcpClient).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub transport: TransportConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let cfg = TransportConfig::default();
        assert_eq!(cfg.transport_name, "tcp");
        assert!(cfg.read_buffer_size > 0);
        assert!(cfg.ring_capacity >= cfg.read_buffer_size);
        assert!(!cfg.allow_overwrite);
        assert!(cfg.send_timeout > Duration::ZERO);
        assert!(cfg.encryption.is_none());
    }
}
