//! Lazily created per-key state behind individual locks.

use compact_str::CompactString;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

pub(crate) struct KeyedState<S> {
    slots: RwLock<HashMap<CompactString, Arc<Mutex<S>>>>,
}

impl<S> Default for KeyedState<S> {
    fn default() -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
        }
    }
}

impl<S> KeyedState<S> {
    /// Run `f` on the state for `key`, creating it with `init` on first use.
    ///
    /// The map lock is released before `f` runs; only the key's own lock is
    /// held while the state is mutated.
    pub(crate) fn with<R>(
        &self,
        key: &str,
        init: impl FnOnce() -> S,
        f: impl FnOnce(&mut S) -> R,
    ) -> R {
        let slot = self.slot(key, init);
        let mut state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut state)
    }

    /// Read the state for `key` without creating it.
    pub(crate) fn peek<R>(&self, key: &str, f: impl FnOnce(&S) -> R) -> Option<R> {
        let slot = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()?;
        let state = slot.lock().unwrap_or_else(PoisonError::into_inner);
        Some(f(&state))
    }

    pub(crate) fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop every key for which `keep` returns false.
    pub(crate) fn retain(&self, mut keep: impl FnMut(&S) -> bool) {
        self.slots
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, slot| keep(&slot.lock().unwrap_or_else(PoisonError::into_inner)));
    }

    fn slot(&self, key: &str, init: impl FnOnce() -> S) -> Arc<Mutex<S>> {
        if let Some(slot) = self
            .slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
        {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            slots
                .entry(CompactString::from(key))
                .or_insert_with(|| Arc::new(Mutex::new(init()))),
        )
    }
}
