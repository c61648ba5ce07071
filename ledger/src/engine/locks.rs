//! Per-account mutual exclusion.
//!
//! One `Mutex<()>` per account id, created on first use and shared through
//! an `Arc` so the table's shard lock is never held while waiting. A slot
//! is dropped from the table by [`AccountLocks::release`] once nobody holds
//! a handle to it, so the table only tracks accounts that are in use.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::vault::UserId;

/// Lock table keyed by account id.
#[derive(Debug, Default)]
pub struct AccountLocks {
    slots: DashMap<UserId, Arc<Mutex<()>>>,
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// The lock slot of `user_id`, created if missing.
    pub fn slot(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.slots.entry(user_id).or_default().clone()
    }

    /// Evicts the slot of `user_id` if no handle to it is left.
    ///
    /// Call after dropping the handle returned by [`slot`](Self::slot).
    /// `remove_if` runs under the shard lock, and handing out a new handle
    /// needs that same lock, so a slot is never evicted while shared.
    pub fn release(&self, user_id: UserId) {
        self.slots
            .remove_if(&user_id, |_, slot| Arc::strong_count(slot) == 1);
    }

    /// Number of slots currently tracked.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Waits up to `timeout` for `slot`. `None` if it stayed busy.
pub fn acquire(slot: &Mutex<()>, timeout: Duration) -> Option<MutexGuard<'_, ()>> {
    slot.try_lock_for(timeout)
}
