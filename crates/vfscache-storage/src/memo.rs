//! Compute-once cell for lazily derived node state
//!
//! A value moves `Unknown -> Pending -> Computed` and never back out of
//! `Computed`. Callers that find the cell `Pending` through
//! [`Memo::get_or_compute`] wait for the owner to finish; callers that must
//! not block (the async aggregator) use [`Memo::try_begin`] and
//! [`Memo::complete`] instead.

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

/// Observable state of a [`Memo`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "value", rename_all = "snake_case")]
pub enum MemoState<T> {
    Unknown,
    Pending,
    Computed(T),
}

impl<T> MemoState<T> {
    pub const fn is_computed(&self) -> bool {
        matches!(self, Self::Computed(_))
    }
}

/// A value computed at most once, shared between threads
#[derive(Debug)]
pub struct Memo<T> {
    state: Mutex<MemoState<T>>,
    ready: Condvar,
}

impl<T> Default for Memo<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Puts an abandoned `Pending` cell back to `Unknown` if the computation
/// unwinds
struct PendingGuard<'a, T> {
    memo: &'a Memo<T>,
}

impl<T> Drop for PendingGuard<'_, T> {
    fn drop(&mut self) {
        let mut state = self.memo.state.lock();
        if matches!(*state, MemoState::Pending) {
            *state = MemoState::Unknown;
        }
        drop(state);
        self.memo.ready.notify_all();
    }
}

impl<T> Memo<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoState::Unknown),
            ready: Condvar::new(),
        }
    }

    /// Claim the computation: `Unknown -> Pending`
    ///
    /// Returns false when another caller already claimed or finished it.
    pub fn try_begin(&self) -> bool {
        let mut state = self.state.lock();
        if matches!(*state, MemoState::Unknown) {
            *state = MemoState::Pending;
            true
        } else {
            false
        }
    }

    /// Publish the value, waking any waiters
    ///
    /// Returns false, leaving the first value in place, when the cell was
    /// already computed.
    pub fn complete(&self, value: T) -> bool {
        let mut state = self.state.lock();
        if state.is_computed() {
            return false;
        }
        *state = MemoState::Computed(value);
        drop(state);
        self.ready.notify_all();
        true
    }
}

impl<T: Clone> Memo<T> {
    /// Snapshot of the current state
    pub fn state(&self) -> MemoState<T> {
        self.state.lock().clone()
    }

    /// The value, if computed
    pub fn get(&self) -> Option<T> {
        match &*self.state.lock() {
            MemoState::Computed(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Return the value, computing it first if nobody has
    ///
    /// Blocks while another caller holds the cell `Pending`. `compute` runs
    /// without the lock held.
    pub fn get_or_compute(&self, compute: impl FnOnce() -> T) -> T {
        let mut state = self.state.lock();
        loop {
            if let MemoState::Computed(value) = &*state {
                return value.clone();
            }
            if matches!(*state, MemoState::Unknown) {
                break;
            }
            self.ready.wait(&mut state);
        }
        *state = MemoState::Pending;
        drop(state);

        let guard = PendingGuard { memo: self };
        let value = compute();
        self.complete(value.clone());
        drop(guard);
        value
    }
}
