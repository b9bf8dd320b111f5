//! Connection handles and the connection table.
//!
//! A [`Connection`] is the shared handle for one live socket. The read
//! loop owns the read half; the handle owns the write half behind an
//! async mutex so concurrent senders serialize whole frames. Handles are
//! reference-counted and safe to hold across the connection's lifetime;
//! sends after disconnect fail with [`FramewireError::NotConnected`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, Weak};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::watch;
use uuid::Uuid;

use crate::error::{FramewireError, Result};
use crate::peer::Peer;
use crate::protocol::{wire_format, Envelope};
use crate::serializer::{MsgPackSerializer, Serializer};

/// Byte and frame counters for one connection.
#[derive(Debug, Default)]
pub struct TransportStats {
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    frames_sent: AtomicU64,
    frames_received: AtomicU64,
}

impl TransportStats {
    pub(crate) fn record_sent(&self, bytes: usize) {
        self.bytes_sent.fetch_add(bytes as u64, Ordering::Relaxed);
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_received_bytes(&self, bytes: usize) {
        self.bytes_received.fetch_add(bytes as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_received_frame(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent.load(Ordering::Relaxed)
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received.load(Ordering::Relaxed)
    }

    pub fn frames_sent(&self) -> u64 {
        self.frames_sent.load(Ordering::Relaxed)
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }
}

/// Shared handle for one live socket connection.
pub struct Connection {
    id: RwLock<String>,
    transport_name: String,
    remote_addr: SocketAddr,
    stats: TransportStats,
    last_activity: RwLock<Instant>,
    peer: Mutex<Weak<Peer>>,
    connected: AtomicBool,
    serializer_name: RwLock<&'static str>,
    envelope: RwLock<Envelope>,
    writer: tokio::sync::Mutex<OwnedWriteHalf>,
    send_timeout: Duration,
    closed_tx: watch::Sender<bool>,
}

impl Connection {
    /// Wrap the write half of a freshly accepted or dialed socket.
    ///
    /// The connection starts with a random id, a plain envelope and no
    /// peer.
    pub fn new(
        writer: OwnedWriteHalf,
        transport_name: String,
        remote_addr: SocketAddr,
        send_timeout: Duration,
    ) -> Arc<Self> {
        let (closed_tx, _) = watch::channel(false);
        Arc::new(Self {
            id: RwLock::new(Uuid::new_v4().to_string()),
            transport_name,
            remote_addr,
            stats: TransportStats::default(),
            last_activity: RwLock::new(Instant::now()),
            peer: Mutex::new(Weak::new()),
            connected: AtomicBool::new(true),
            serializer_name: RwLock::new(MsgPackSerializer.name()),
            envelope: RwLock::new(Envelope::Plain),
            writer: tokio::sync::Mutex::new(writer),
            send_timeout,
            closed_tx,
        })
    }

    /// Current connection id. Reassigned when the connection is bound to
    /// a peer.
    pub fn id(&self) -> String {
        self.read_lock(&self.id).clone()
    }

    pub(crate) fn set_id(&self, id: &str) {
        *self.write_lock(&self.id) = id.to_string();
    }

    /// Name of the transport that produced this connection.
    pub fn transport_name(&self) -> &str {
        &self.transport_name
    }

    /// Remote socket address.
    pub fn remote_addr(&self) -> SocketAddr {
        self.remote_addr
    }

    /// Traffic counters.
    pub fn stats(&self) -> &TransportStats {
        &self.stats
    }

    /// Instant of the last send or receive on this connection.
    pub fn last_activity(&self) -> Instant {
        *self.read_lock(&self.last_activity)
    }

    /// Record activity now.
    pub fn touch(&self) {
        *self.write_lock(&self.last_activity) = Instant::now();
    }

    /// Peer this connection belongs to, if it has been bound.
    pub fn peer(&self) -> Option<Arc<Peer>> {
        self.lock(&self.peer).upgrade()
    }

    pub(crate) fn set_peer(&self, peer: &Arc<Peer>) {
        *self.lock(&self.peer) = Arc::downgrade(peer);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Install the body envelope, typically after a key exchange.
    pub fn set_envelope(&self, envelope: Envelope) {
        *self.write_lock(&self.envelope) = envelope;
    }

    /// Whether outbound bodies are currently encrypted.
    pub fn is_sealed(&self) -> bool {
        self.read_lock(&self.envelope).is_sealed()
    }

    /// Format last used to serialize a payload on this connection.
    pub fn serializer_name(&self) -> &'static str {
        *self.read_lock(&self.serializer_name)
    }

    /// Serialize a payload with the default MessagePack format and send
    /// it under `command`.
    pub async fn send<T: Serialize>(&self, command: &str, payload: &T) -> Result<()> {
        self.send_with(&MsgPackSerializer, command, payload).await
    }

    /// Serialize a payload with an explicit serializer and send it under
    /// `command`.
    pub async fn send_with<S: Serializer, T: Serialize>(
        &self,
        serializer: &S,
        command: &str,
        payload: &T,
    ) -> Result<()> {
        let body = serializer.serialize(payload)?;
        *self.write_lock(&self.serializer_name) = serializer.name();
        self.send_body(command, &body).await
    }

    /// Send pre-serialized body bytes under `command`.
    ///
    /// The body is sealed by the envelope, framed and written as one
    /// contiguous frame. Waits up to the configured send timeout for
    /// exclusive writer access and fails with
    /// [`FramewireError::SendBusy`] past it.
    pub async fn send_body(&self, command: &str, body: &[u8]) -> Result<()> {
        if !self.is_connected() {
            return Err(FramewireError::NotConnected);
        }
        let sealed = self.read_lock(&self.envelope).seal(body)?;
        let wire = wire_format::encode(&sealed, command)?;

        let mut writer = tokio::time::timeout(self.send_timeout, self.writer.lock())
            .await
            .map_err(|_| FramewireError::SendBusy(self.send_timeout))?;
        if !self.is_connected() {
            return Err(FramewireError::NotConnected);
        }
        writer.write_all(&wire).await?;

        self.stats.record_sent(wire.len());
        self.touch();
        Ok(())
    }

    /// Recover an inbound wire body through the envelope.
    pub(crate) fn open_body(&self, body: &[u8]) -> Result<Vec<u8>> {
        self.read_lock(&self.envelope).open(body)
    }

    /// Mark the connection closed and wake its read loop.
    ///
    /// Safe to call from any context and idempotent. The read loop
    /// performs the actual socket teardown.
    pub fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
        // send_replace updates the value even with no live receivers, so
        // a later closed() call still observes the shutdown.
        self.closed_tx.send_replace(true);
    }

    /// Resolve once [`close`](Self::close) has been called.
    pub(crate) async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    /// Shut down the write half, flushing buffered bytes if possible.
    pub(crate) async fn shutdown_writer(&self) {
        if let Ok(mut writer) =
            tokio::time::timeout(self.send_timeout, self.writer.lock()).await
        {
            let _ = writer.shutdown().await;
        }
    }

    fn read_lock<'a, T>(&self, lock: &'a RwLock<T>) -> std::sync::RwLockReadGuard<'a, T> {
        lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_lock<'a, T>(&self, lock: &'a RwLock<T>) -> std::sync::RwLockWriteGuard<'a, T> {
        lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock<'a, T>(&self, lock: &'a Mutex<T>) -> std::sync::MutexGuard<'a, T> {
        lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id())
            .field("transport", &self.transport_name)
            .field("remote_addr", &self.remote_addr)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Live connections indexed by id.
///
/// Each transport endpoint owns one table, so ids are unique within a
/// transport.
#[derive(Default)]
pub struct ConnectionTable {
    map: DashMap<String, Arc<Connection>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, conn: Arc<Connection>) {
        self.map.insert(conn.id(), conn);
    }

    pub fn get(&self, id: &str) -> Option<Arc<Connection>> {
        self.map.get(id).map(|entry| Arc::clone(entry.value()))
    }

    pub fn remove(&self, id: &str) -> Option<Arc<Connection>> {
        self.map.remove(id).map(|(_, conn)| conn)
    }

    /// Remove `id` only if it still maps to the given handle.
    ///
    /// Guards teardown against racing with a rebind that reused the id
    /// for a newer connection.
    pub fn remove_if_same(&self, id: &str, conn: &Arc<Connection>) -> bool {
        self.map
            .remove_if(id, |_, existing| Arc::ptr_eq(existing, conn))
            .is_some()
    }

    /// Rebind a connection from `old_id` to `new_id`, updating both the
    /// table key and the connection's own id.
    pub fn change_id(&self, old_id: &str, new_id: &str) -> bool {
        match self.map.remove(old_id) {
            Some((_, conn)) => {
                conn.set_id(new_id);
                self.map.insert(new_id.to_string(), conn);
                true
            }
            None => false,
        }
    }

    /// Close and drop the connection registered under `id`.
    pub fn disconnect(&self, id: &str) -> bool {
        match self.remove(id) {
            Some(conn) => {
                conn.close();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Snapshot of every live connection.
    pub fn connections(&self) -> Vec<Arc<Connection>> {
        self.map
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::{TcpListener, TcpStream};

    async fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let dialed = TcpStream::connect(addr).await.unwrap();
        let (accepted, _) = listener.accept().await.unwrap();
        (dialed, accepted)
    }

    async fn test_connection(send_timeout: Duration) -> (Arc<Connection>, TcpStream) {
        let (dialed, accepted) = socket_pair().await;
        let remote = dialed.peer_addr().unwrap();
        let (_reader, writer) = dialed.into_split();
        (
            Connection::new(writer, "tcp".to_string(), remote, send_timeout),
            accepted,
        )
    }

    #[tokio::test]
    async fn send_guard_times_out_when_writer_held() {
        let (conn, _other) = test_connection(Duration::from_millis(20)).await;

        let guard = conn.writer.lock().await;
        let err = conn.send_body("Echo", b"blocked").await.unwrap_err();
        assert!(matches!(err, FramewireError::SendBusy(_)));
        drop(guard);

        conn.send_body("Echo", b"through").await.unwrap();
        assert_eq!(conn.stats().frames_sent(), 1);
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let (conn, _other) = test_connection(Duration::from_secs(1)).await;
        conn.close();
        assert!(!conn.is_connected());
        assert!(matches!(
            conn.send_body("Echo", b"late").await,
            Err(FramewireError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn serializer_name_tracks_last_send() {
        let (conn, _other) = test_connection(Duration::from_secs(1)).await;
        assert_eq!(conn.serializer_name(), "msgpack");
        conn.send("Echo", &42u32).await.unwrap();
        assert_eq!(conn.serializer_name(), "msgpack");
    }

    #[tokio::test]
    async fn table_change_id_rebinds() {
        let (conn, _other) = test_connection(Duration::from_secs(1)).await;
        let table = ConnectionTable::new();
        table.insert(Arc::clone(&conn));
        let original = conn.id();

        assert!(table.change_id(&original, "peer-1"));
        assert_eq!(conn.id(), "peer-1");
        assert!(table.get(&original).is_none());
        assert!(Arc::ptr_eq(&table.get("peer-1").unwrap(), &conn));

        assert!(!table.change_id("no-such-id", "peer-2"));
    }

    #[tokio::test]
    async fn table_remove_if_same_guards_rebinds() {
        let (first, _a) = test_connection(Duration::from_secs(1)).await;
        let (second, _b) = test_connection(Duration::from_secs(1)).await;
        second.set_id(&first.id());

        let table = ConnectionTable::new();
        table.insert(Arc::clone(&second));

        assert!(!table.remove_if_same(&first.id(), &first));
        assert_eq!(table.len(), 1);
        assert!(table.remove_if_same(&second.id(), &second));
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn table_disconnect_closes() {
        let (conn, _other) = test_connection(Duration::from_secs(1)).await;
        let table = ConnectionTable::new();
        table.insert(Arc::clone(&conn));

        assert!(table.disconnect(&conn.id()));
        assert!(!conn.is_connected());
        assert!(table.is_empty());
        assert!(!table.disconnect(&conn.id()));
    }
}
