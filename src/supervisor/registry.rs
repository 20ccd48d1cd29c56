//! Name → pid table of live worker processes.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Registry of running worker processes, shared by all supervisors of a
/// leader.
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    entries: Mutex<BTreeMap<String, Option<u32>>>,
}

impl ProcessRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, BTreeMap<String, Option<u32>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record that `name` runs as `pid`.
    pub fn register(&self, name: &str, pid: Option<u32>) {
        debug!(worker = name, ?pid, "process registered");
        self.entries().insert(name.to_owned(), pid);
    }

    /// Forget `name` if it is still registered under `pid`.
    pub fn deregister(&self, name: &str, pid: Option<u32>) {
        let mut entries = self.entries();
        if entries.get(name) == Some(&pid) {
            entries.remove(name);
            debug!(worker = name, ?pid, "process deregistered");
        }
    }

    /// Pid registered for `name`.
    #[must_use]
    pub fn pid(&self, name: &str) -> Option<u32> {
        self.entries().get(name).copied().flatten()
    }

    /// Whether `name` has a live process.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.entries().contains_key(name)
    }

    /// Registered names in order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.entries().keys().cloned().collect()
    }
}
