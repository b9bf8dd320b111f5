//! Peers: application-level identity over one or more connections.
//!
//! A peer groups the connections belonging to a single remote party, at
//! most one per transport. Binding a connection to a peer rebinds its id
//! to the peer's connection id, so application code addresses the peer
//! rather than whichever socket currently carries it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::connection::{Connection, ConnectionTable};
use crate::error::{FramewireError, Result};

pub struct Peer {
    application_id: String,
    connection_id: String,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
}

impl Peer {
    /// Create a peer for an application-level identity with a fresh
    /// connection id.
    pub fn new(application_id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            application_id: application_id.into(),
            connection_id: Uuid::new_v4().to_string(),
            connections: Mutex::new(HashMap::new()),
        })
    }

    /// Application-level identity, e.g. an account or session id.
    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    /// Id this peer's connections are keyed under in their tables.
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Bind a connection to this peer.
    ///
    /// If the peer already holds a connection on the same transport, the
    /// old one is closed and replaced. The connection is rebound in
    /// `table` under this peer's connection id and gains a backref to the
    /// peer.
    pub fn add_connection(self: &Arc<Self>, table: &ConnectionTable, conn: &Arc<Connection>) {
        let mut connections = self.lock();
        if let Some(old) = connections.remove(conn.transport_name()) {
            debug!(
                peer = %self.application_id,
                transport = conn.transport_name(),
                "replacing existing peer connection"
            );
            table.remove_if_same(&old.id(), &old);
            old.close();
        }

        table.change_id(&conn.id(), &self.connection_id);
        conn.set_peer(self);
        connections.insert(conn.transport_name().to_string(), Arc::clone(conn));
    }

    /// Drop a connection from this peer without closing it.
    pub fn remove_connection(&self, transport_name: &str) -> Option<Arc<Connection>> {
        self.lock().remove(transport_name)
    }

    /// Drop the connection for `transport_name` only if it is still the
    /// given handle.
    ///
    /// Teardown of a replaced connection must not evict its successor.
    pub fn remove_connection_if_same(&self, transport_name: &str, conn: &Arc<Connection>) -> bool {
        let mut connections = self.lock();
        match connections.get(transport_name) {
            Some(current) if Arc::ptr_eq(current, conn) => {
                connections.remove(transport_name);
                true
            }
            _ => false,
        }
    }

    /// Connection currently carried by the named transport.
    pub fn connection(&self, transport_name: &str) -> Option<Arc<Connection>> {
        self.lock().get(transport_name).cloned()
    }

    /// Number of transports this peer is reachable over.
    pub fn connection_count(&self) -> usize {
        self.lock().len()
    }

    /// Serialize and send a payload over the named transport.
    ///
    /// Fails with [`FramewireError::NotConnected`] when the peer holds no
    /// connection for that transport.
    pub async fn send<T: Serialize>(
        &self,
        transport_name: &str,
        command: &str,
        payload: &T,
    ) -> Result<()> {
        let conn = self
            .connection(transport_name)
            .ok_or(FramewireError::NotConnected)?;
        conn.send(command, payload).await
    }

    /// Close every connection the peer holds.
    pub fn disconnect_all(&self) {
        for conn in self.lock().values() {
            conn.close();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Drop for Peer {
    fn drop(&mut self) {
        self.disconnect_all();
    }
}

impl std::fmt::Debug for Peer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Peer")
            .field("application_id", &self.application_id)
            .field("connection_id", &self.connection_id)
            .field("connections", &self.connection_count())
            .finish()
    }
}
