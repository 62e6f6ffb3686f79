//! # Double-Buffered Snapshot Exchange
//!
//! Hands immutable snapshots from a producer thread to a consumer thread.
//!
//! ```text
//!                    ┌─────────────────────────────┐
//!                    │       SnapshotBuffer<T>     │
//!                    │                             │
//!                    │  ┌─────────┐  ┌─────────┐  │
//!                    │  │ Slot A  │  │ Slot B  │  │
//!                    │  └────┬────┘  └────┬────┘  │
//!                    │       │            │       │
//!                    │  ┌────┴────────────┴────┐  │
//!                    │  │  Atomic front (0/1)  │  │
//!                    │  └──────────────────────┘  │
//!                    └─────────────────────────────┘
//!                              │
//!              ┌───────────────┴───────────────┐
//!              ▼                               ▼
//!      ┌──────────────┐                ┌──────────────┐
//!      │  publish()   │                │   claim()    │
//!      │ (writes back)│                │ (reads front)│
//!      └──────────────┘                └──────────────┘
//! ```
//!
//! A claim holds an `Arc` to the snapshot, not a lock, so the producer can
//! publish the next snapshot while a consumer still reads the previous one.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

/// Double-buffered slot pair for publishing snapshots across threads.
#[derive(Debug)]
pub struct SnapshotBuffer<T> {
    slots: [RwLock<Option<Arc<T>>>; 2],
    /// Index of the slot readers see. The back slot is `front ^ 1`.
    front: AtomicUsize,
    generation: AtomicU64,
    claims: Arc<AtomicUsize>,
}

impl<T> SnapshotBuffer<T> {
    /// Creates an empty buffer (generation 0, nothing published).
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: [RwLock::new(None), RwLock::new(None)],
            front: AtomicUsize::new(0),
            generation: AtomicU64::new(0),
            claims: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Writes `value` into the back slot and makes it the front.
    ///
    /// Publishing `None` is how a producer says "no snapshot this frame".
    /// Returns the generation of the newly published snapshot.
    pub fn publish(&self, value: Option<T>) -> u64 {
        let back = self.front.load(Ordering::Acquire) ^ 1;
        *self.slots[back].write() = value.map(Arc::new);
        self.front.store(back, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Takes a shared view of the current front snapshot.
    #[must_use]
    pub fn claim(&self) -> SnapshotClaim<T> {
        self.claims.fetch_add(1, Ordering::AcqRel);
        let front = self.front.load(Ordering::Acquire);
        let snapshot = self.slots[front].read().clone();
        SnapshotClaim {
            snapshot,
            generation: self.generation.load(Ordering::Acquire),
            claims: Arc::clone(&self.claims),
        }
    }

    /// Number of snapshots published so far.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Number of claims currently alive.
    #[inline]
    #[must_use]
    pub fn active_claims(&self) -> usize {
        self.claims.load(Ordering::Acquire)
    }
}

impl<T> Default for SnapshotBuffer<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-only view of a published snapshot.
///
/// Dropping the claim releases it.
#[derive(Debug)]
pub struct SnapshotClaim<T> {
    snapshot: Option<Arc<T>>,
    generation: u64,
    claims: Arc<AtomicUsize>,
}

impl<T> SnapshotClaim<T> {
    /// Generation of the buffer when this claim was taken.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// The claimed snapshot, if one was published.
    #[inline]
    #[must_use]
    pub fn get(&self) -> Option<&T> {
        self.snapshot.as_deref()
    }

    /// Returns true if nothing was published for this generation.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.snapshot.is_none()
    }
}

impl<T> Deref for SnapshotClaim<T> {
    type Target = Option<Arc<T>>;

    fn deref(&self) -> &Self::Target {
        &self.snapshot
    }
}

impl<T> Drop for SnapshotClaim<T> {
    fn drop(&mut self) {
        self.claims.fetch_sub(1, Ordering::AcqRel);
    }
}
