//! Binary wire protocol and connection runtime for pluggable session
//! servers.
//!
//! Framewire frames application payloads with a fixed 16-byte header
//! carrying a length, a truncated SHA-1 command hash and a truncated
//! SHA-1 body checksum, then runs that protocol over TCP in both
//! directions. Payloads are MessagePack by default, optionally
//! RSA-encrypted per connection, and inbound frames are routed to async
//! command handlers by their hash.
//!
//! # Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use framewire::{ClientConfig, ServerConfig, TcpClient, TcpServer};
//! use framewire::serializer::MsgPackSerializer;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Chat {
//!     from: String,
//!     text: String,
//! }
//!
//! # async fn run() -> framewire::Result<()> {
//! let server = TcpServer::new(ServerConfig::new("127.0.0.1:9000".parse().unwrap()));
//! server.registry().register_typed(
//!     "Chat",
//!     MsgPackSerializer,
//!     |conn: Arc<framewire::Connection>, msg: Chat| async move {
//!         conn.send("Chat", &Chat { from: "server".into(), text: msg.text }).await
//!     },
//! )?;
//! let addr = server.start().await?;
//!
//! let client = TcpClient::new(ClientConfig::default());
//! let conn = client.connect(addr).await?;
//! conn.send("Chat", &Chat { from: "client".into(), text: "hi".into() }).await?;
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod peer;
pub mod pool;
pub mod protocol;
pub mod serializer;
pub mod transport;

pub use command::{Command, CommandRegistry};
pub use config::{ClientConfig, ServerConfig, TransportConfig};
pub use connection::{Connection, ConnectionTable, TransportStats};
pub use error::{FramewireError, Result};
pub use peer::Peer;
pub use protocol::{Envelope, Frame};
pub use transport::{ClientState, ServerState, TcpClient, TcpServer, TransportEvent};
