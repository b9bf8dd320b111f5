//! Command handlers and dispatch.
//!
//! Inbound frames are routed by the 6-byte command hash in their header.
//! A [`Command`] reacts to a frame body on a specific connection;
//! [`TypedCommand`] pairs a handler with a serializer so payload decoding
//! happens before user code runs, and [`RawCommand`] hands the body bytes
//! over untouched.

pub mod registry;

use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::connection::Connection;
use crate::error::Result;
use crate::serializer::Serializer;

pub use registry::{CommandEntry, CommandRegistry};

/// Boxed future returned by command execution.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A handler invoked for frames carrying its registered command name.
///
/// Execution is awaited inline by the connection's read loop, so frames
/// on one connection are always handled sequentially and in arrival
/// order. Long-running work should be spawned by the handler itself.
pub trait Command: Send + Sync + 'static {
    /// Handle one frame body on the given connection.
    fn execute(&self, connection: Arc<Connection>, body: Bytes) -> BoxFuture<'static, Result<()>>;
}

/// Adapts a typed async handler into a [`Command`].
///
/// Deserializes the body with the serializer chosen at registration and
/// invokes the handler with the typed payload. Decode failures surface
/// as errors without reaching the handler.
pub struct TypedCommand<S, T, F, Fut>
where
    S: Serializer,
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Connection>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    serializer: S,
    handler: F,
    _payload: PhantomData<fn() -> T>,
    _future: PhantomData<fn() -> Fut>,
}

impl<S, T, F, Fut> TypedCommand<S, T, F, Fut>
where
    S: Serializer,
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Connection>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(serializer: S, handler: F) -> Self {
        Self {
            serializer,
            handler,
            _payload: PhantomData,
            _future: PhantomData,
        }
    }
}

impl<S, T, F, Fut> Command for TypedCommand<S, T, F, Fut>
where
    S: Serializer,
    T: DeserializeOwned + Send + 'static,
    F: Fn(Arc<Connection>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn execute(&self, connection: Arc<Connection>, body: Bytes) -> BoxFuture<'static, Result<()>> {
        match self.serializer.deserialize::<T>(&body) {
            Ok(payload) => Box::pin((self.handler)(connection, payload)),
            Err(e) => Box::pin(async move { Err(e) }),
        }
    }
}

/// Adapts a raw async handler into a [`Command`].
///
/// The handler receives the body bytes exactly as carried by the frame.
pub struct RawCommand<F, Fut>
where
    F: Fn(Arc<Connection>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    handler: F,
    _future: PhantomData<fn() -> Fut>,
}

impl<F, Fut> RawCommand<F, Fut>
where
    F: Fn(Arc<Connection>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _future: PhantomData,
        }
    }
}

impl<F, Fut> Command for RawCommand<F, Fut>
where
    F: Fn(Arc<Connection>, Bytes) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    fn execute(&self, connection: Arc<Connection>, body: Bytes) -> BoxFuture<'static, Result<()>> {
        Box::pin((self.handler)(connection, body))
    }
}
