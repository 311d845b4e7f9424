//! Storage backends for the persistence engine.
//!
//! These traits handle the "how" of storage (files vs. key-value), while
//! [`PersistenceEngine`](crate::persistence::PersistenceEngine) handles the
//! "what": encoding, fallback and reconciliation.

pub mod fs;
pub mod kv;

use std::sync::Arc;

use crate::error::Result;
use crate::types::DocumentId;

pub use fs::FsStore;
pub use kv::MemoryKv;

/// Durable, record-per-document store (a directory of text files).
pub trait DurableStore: Send + Sync {
    /// Create the backing container. Must be idempotent.
    fn provision(&self) -> Result<()>;

    /// Names of all document records currently stored.
    fn list_names(&self) -> Result<Vec<String>>;

    /// Raw text of one record.
    fn read(&self, name: &str) -> Result<String>;

    /// Write `contents` under `name`, replacing any other record that holds
    /// the same document id. Must not leave a partially written record.
    fn write(&self, id: &DocumentId, name: &str, contents: &str) -> Result<()>;

    /// Remove every record for `id`. Returns `true` if anything was removed.
    fn remove(&self, id: &DocumentId) -> Result<bool>;
}

/// Ephemeral string key-value store (browser-local storage semantics).
pub trait EphemeralStore: Send + Sync {
    /// Fetch the value under `key`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Replace the value under `key`.
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

impl<T: DurableStore + ?Sized> DurableStore for Arc<T> {
    fn provision(&self) -> Result<()> {
        (**self).provision()
    }

    fn list_names(&self) -> Result<Vec<String>> {
        (**self).list_names()
    }

    fn read(&self, name: &str) -> Result<String> {
        (**self).read(name)
    }

    fn write(&self, id: &DocumentId, name: &str, contents: &str) -> Result<()> {
        (**self).write(id, name, contents)
    }

    fn remove(&self, id: &DocumentId) -> Result<bool> {
        (**self).remove(id)
    }
}

impl<T: EphemeralStore + ?Sized> EphemeralStore for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        (**self).set(key, value)
    }
}
