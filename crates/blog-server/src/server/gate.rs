//! Write serialization gates.
//!
//! A [`MutationGate`] serializes one kind of write (update or delete) across
//! the whole collection. The gate is taken on the worker thread, only around
//! the storage calls that make up the write, and it does not take part in the
//! cancellation race: a write that has entered the gate runs until storage
//! returns.

use parking_lot::Mutex;

/// Kind of write a gate serializes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MutationKind {
    Update,
    Delete,
}

impl MutationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// Mutual exclusion for one kind of write.
pub struct MutationGate {
    kind: MutationKind,
    lock: Mutex<()>,
}

impl MutationGate {
    pub const fn new(kind: MutationKind) -> Self {
        Self {
            kind,
            lock: Mutex::new(()),
        }
    }

    pub const fn kind(&self) -> MutationKind {
        self.kind
    }

    /// Runs `write` while holding the gate, blocking the current thread until
    /// the gate is free.
    pub fn run<T>(&self, write: impl FnOnce() -> T) -> T {
        let _held = match self.lock.try_lock() {
            Some(held) => held,
            None => {
                tracing::trace!("Waiting for the {} gate", self.kind.as_str());
                self.lock.lock()
            }
        };
        write()
    }
}
