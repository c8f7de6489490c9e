//! Correlation registry
//!
//! Bounded map from [`CorrelationToken`] to the pending operation. Tokens
//! carry the registry epoch; [`Registry::clear`] bumps it so completions for
//! dropped entries can never match a later operation.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use contracts::CorrelationToken;

use crate::error::DataExportError;

struct Inner<V> {
    epoch: u32,
    entries: BTreeMap<CorrelationToken, V>,
}

/// Fixed-capacity correlation registry
///
/// Holds references only; dropping an entry never finalizes the value.
pub struct Registry<V> {
    inner: Mutex<Inner<V>>,
    next_sequence: AtomicU64,
    capacity: usize,
}

impl<V> Registry<V> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                epoch: 0,
                entries: BTreeMap::new(),
            }),
            next_sequence: AtomicU64::new(1),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Issue a token unique among all tokens of this registry
    pub fn issue_token(&self) -> CorrelationToken {
        let epoch = self.lock().epoch;
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        CorrelationToken::new(epoch, sequence)
    }

    /// Register `value` under `token`
    ///
    /// # Errors
    /// - `RegistryFull` when every slot is taken
    /// - `DuplicateToken` when `token` is already present
    /// - `StaleToken` when `token` predates the last [`clear`](Self::clear)
    pub fn insert(&self, token: CorrelationToken, value: V) -> Result<(), DataExportError> {
        let mut inner = self.lock();
        if token.epoch() != inner.epoch {
            return Err(DataExportError::StaleToken {
                token,
                epoch: inner.epoch,
            });
        }
        if inner.entries.contains_key(&token) {
            return Err(DataExportError::DuplicateToken { token });
        }
        if inner.entries.len() >= self.capacity {
            return Err(DataExportError::RegistryFull {
                capacity: self.capacity,
            });
        }
        inner.entries.insert(token, value);
        Ok(())
    }

    /// Remove and return the entry for `token`
    pub fn remove(&self, token: CorrelationToken) -> Option<V> {
        self.lock().entries.remove(&token)
    }

    /// Oldest outstanding token
    pub fn peek(&self) -> Option<CorrelationToken> {
        self.lock().entries.keys().next().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Drop every entry and start a new epoch
    ///
    /// Returns the dropped values so the caller can decide what happens to them.
    pub fn clear(&self) -> Vec<V> {
        let mut inner = self.lock();
        inner.epoch = inner.epoch.wrapping_add(1);
        std::mem::take(&mut inner.entries).into_values().collect()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
