//! In-process key-value store used as the ephemeral mirror.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use super::EphemeralStore;
use crate::error::{QuillError, Result, StoreKind};

/// Thread-safe string map; contents vanish with the process.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryKv {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `get` fail, simulating an unavailable store.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::Relaxed);
    }

    /// Make every subsequent `set` fail (e.g. quota exceeded).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::Relaxed);
    }

    /// Number of keys held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no keys are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl EphemeralStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>> {
        if self.fail_reads.load(Ordering::Relaxed) {
            return Err(QuillError::unavailable(StoreKind::Ephemeral, "simulated read failure"));
        }
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::Relaxed) {
            return Err(QuillError::unavailable(StoreKind::Ephemeral, "simulated write failure"));
        }
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_replaces_wholesale() {
        let kv = MemoryKv::new();
        assert!(kv.is_empty());
        kv.set("ns", "[1]").expect("set");
        kv.set("ns", "[2]").expect("set");
        assert_eq!(kv.get("ns").expect("get").as_deref(), Some("[2]"));
        assert_eq!(kv.len(), 1);
        assert_eq!(kv.get("other").expect("get"), None);
    }

    #[test]
    fn simulated_failures() {
        let kv = MemoryKv::new();
        kv.set_fail_writes(true);
        assert!(kv.set("ns", "x").is_err());
        kv.set_fail_writes(false);
        kv.set("ns", "x").expect("set");

        kv.set_fail_reads(true);
        assert!(matches!(
            kv.get("ns"),
            Err(QuillError::StoreUnavailable { store: StoreKind::Ephemeral, .. })
        ));
    }
}
