//! Command registration and lookup.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;

use crate::error::{FramewireError, Result};
use crate::protocol::digest::{self, DIGEST_LEN};
use crate::serializer::Serializer;

use super::{Command, RawCommand, TypedCommand};

/// A registered command: its name plus the handler to invoke.
#[derive(Clone)]
pub struct CommandEntry {
    /// Original command name, kept for diagnostics.
    pub name: String,
    /// Handler invoked for matching frames.
    pub command: Arc<dyn Command>,
}

/// Maps 6-byte command hashes to handlers.
///
/// Registration is append-only: commands are installed during setup and
/// never replaced, so a hash resolves to the same handler for the life
/// of the registry. Lookup runs on every inbound frame.
#[derive(Default)]
pub struct CommandRegistry {
    entries: RwLock<HashMap<[u8; DIGEST_LEN], CommandEntry>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler under a command name.
    ///
    /// # Errors
    ///
    /// Fails with [`FramewireError::EmptyCommandName`] for an empty name
    /// and [`FramewireError::DuplicateCommand`] when the name's hash is
    /// already taken, whether by the same name or a colliding one.
    pub fn register(&self, name: &str, command: Arc<dyn Command>) -> Result<()> {
        if name.is_empty() {
            return Err(FramewireError::EmptyCommandName);
        }
        let hash = digest::command_hash(name);
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(existing) = entries.get(&hash) {
            return Err(FramewireError::DuplicateCommand(format!(
                "{name} collides with registered command {}",
                existing.name
            )));
        }
        entries.insert(
            hash,
            CommandEntry {
                name: name.to_string(),
                command,
            },
        );
        Ok(())
    }

    /// Register a typed handler: the body is deserialized with
    /// `serializer` before the handler runs.
    pub fn register_typed<S, T, F, Fut>(&self, name: &str, serializer: S, handler: F) -> Result<()>
    where
        S: Serializer,
        T: DeserializeOwned + Send + 'static,
        F: Fn(Arc<crate::connection::Connection>, T) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.register(name, Arc::new(TypedCommand::new(serializer, handler)))
    }

    /// Register a raw handler that receives the body bytes untouched.
    pub fn register_raw<F, Fut>(&self, name: &str, handler: F) -> Result<()>
    where
        F: Fn(Arc<crate::connection::Connection>, bytes::Bytes) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.register(name, Arc::new(RawCommand::new(handler)))
    }

    /// Look up the handler for a frame's command hash.
    pub fn resolve(&self, hash: &[u8; DIGEST_LEN]) -> Option<CommandEntry> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(hash)
            .cloned()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::MsgPackSerializer;

    #[test]
    fn register_and_resolve() {
        let registry = CommandRegistry::new();
        registry
            .register_raw("Echo", |_conn, _body| async { Ok(()) })
            .unwrap();

        let entry = registry.resolve(&digest::command_hash("Echo")).unwrap();
        assert_eq!(entry.name, "Echo");
        assert!(registry.resolve(&digest::command_hash("Other")).is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let registry = CommandRegistry::new();
        registry
            .register_raw("Echo", |_conn, _body| async { Ok(()) })
            .unwrap();
        let err = registry
            .register_raw("Echo", |_conn, _body| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, FramewireError::DuplicateCommand(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn empty_name_rejected() {
        let registry = CommandRegistry::new();
        let err = registry
            .register_raw("", |_conn, _body| async { Ok(()) })
            .unwrap_err();
        assert!(matches!(err, FramewireError::EmptyCommandName));
    }

    #[test]
    fn typed_registration_resolves() {
        #[derive(serde::Deserialize)]
        struct Ping {
            #[allow(dead_code)]
            seq: u32,
        }

        let registry = CommandRegistry::new();
        registry
            .register_typed("Ping", MsgPackSerializer, |_conn, _payload: Ping| async {
                Ok(())
            })
            .unwrap();
        assert!(registry.resolve(&digest::command_hash("Ping")).is_some());
    }
}
