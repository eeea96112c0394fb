// SPDX-License-Identifier: GPL-3.0-only

//! Latest-wins frame handoff
//!
//! A size-1 slot that overwrites on push. The producer (sensor) never blocks
//! and never builds a backlog: if the consumer is still busy converting the
//! previous frame, the waiting frame is replaced by the newer one.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct Slot<T> {
    item: Option<T>,
    closed: bool,
}

/// Single-slot mailbox with overwrite-on-push semantics
pub struct FrameMailbox<T> {
    slot: Mutex<Slot<T>>,
    available: Condvar,
    replaced: AtomicU64,
}

impl<T> FrameMailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                item: None,
                closed: false,
            }),
            available: Condvar::new(),
            replaced: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slot<T>> {
        self.slot.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Store `item`, replacing any unconsumed one
    ///
    /// Returns `true` if an older item was discarded. Pushing to a closed
    /// mailbox drops the item.
    pub fn push(&self, item: T) -> bool {
        let mut slot = self.lock();
        if slot.closed {
            return false;
        }
        let replaced = slot.item.replace(item).is_some();
        if replaced {
            self.replaced.fetch_add(1, Ordering::Relaxed);
        }
        drop(slot);
        self.available.notify_one();
        replaced
    }

    /// Take the current item without waiting
    pub fn try_take(&self) -> Option<T> {
        self.lock().item.take()
    }

    /// Wait up to `timeout` for an item
    ///
    /// Returns `None` on timeout or once the mailbox is closed and empty.
    pub fn take_timeout(&self, timeout: Duration) -> Option<T> {
        let slot = self.lock();
        let (mut slot, _) = self
            .available
            .wait_timeout_while(slot, timeout, |s| s.item.is_none() && !s.closed)
            .unwrap_or_else(|e| e.into_inner());
        slot.item.take()
    }

    /// Close the mailbox, dropping any waiting item and waking the consumer
    pub fn close(&self) {
        let mut slot = self.lock();
        slot.closed = true;
        slot.item = None;
        drop(slot);
        self.available.notify_all();
    }

    /// Reopen a closed mailbox (used when a session is restarted)
    pub fn reopen(&self) {
        self.lock().closed = false;
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of items discarded because a newer one arrived first
    pub fn replaced_count(&self) -> u64 {
        self.replaced.load(Ordering::Relaxed)
    }
}

impl<T> Default for FrameMailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
