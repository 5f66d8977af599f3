// Per-path advisory locks held in process memory.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

use super::PathLock;

/// One mutex per relative path, created on demand and dropped once nobody
/// waits on it anymore.
#[derive(Debug, Default)]
pub struct KeyedPathLock {
    slots: DashMap<String, Arc<Mutex<()>>>,
}

impl KeyedPathLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of paths that currently have a lock slot.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl PathLock for KeyedPathLock {
    fn try_execute(&self, rel: &str, timeout: Duration, f: &mut dyn FnMut()) -> bool {
        let slot = self
            .slots
            .entry(rel.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let acquired = match slot.try_lock_for(timeout) {
            Some(_guard) => {
                f();
                true
            }
            None => false,
        };

        drop(slot);
        // The map holds one reference; anything above that is a waiter.
        self.slots.remove_if(rel, |_, s| Arc::strong_count(s) == 1);
        acquired
    }
}
