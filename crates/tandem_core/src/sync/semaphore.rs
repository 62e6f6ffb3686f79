//! # Counting Semaphore
//!
//! The single primitive the frame handshake is built from.
//!
//! ```text
//!   release()  ──► count += 1 ──► wake one waiter
//!   acquire()  ──► wait until count > 0 ──► count -= 1
//!   close()    ──► wake everyone; waiters with no permit get `Closed`
//! ```
//!
//! Permits that were released before `close()` are still handed out, so a
//! peer that signals and then shuts down never loses its last signal.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::error::SyncError;

#[derive(Debug)]
struct Permits {
    count: usize,
    closed: bool,
}

/// Counting semaphore with close and deadline support.
///
/// All semaphores start with zero permits.
#[derive(Debug)]
pub struct Semaphore {
    name: &'static str,
    permits: Mutex<Permits>,
    available: Condvar,
}

impl Semaphore {
    /// Creates an open semaphore with no permits.
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            permits: Mutex::new(Permits {
                count: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Name used in errors and logs.
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Adds one permit and wakes a single waiter.
    pub fn release(&self) {
        let mut permits = self.permits.lock();
        permits.count += 1;
        drop(permits);
        self.available.notify_one();
    }

    /// Blocks until a permit is available, then takes it.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the semaphore is closed and empty.
    pub fn acquire(&self) -> Result<(), SyncError> {
        let mut permits = self.permits.lock();
        loop {
            if permits.count > 0 {
                permits.count -= 1;
                return Ok(());
            }
            if permits.closed {
                return Err(SyncError::Closed { name: self.name });
            }
            self.available.wait(&mut permits);
        }
    }

    /// Like [`acquire`](Self::acquire), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Closed`] if the semaphore is closed and empty,
    /// or [`SyncError::TimedOut`] once the deadline passes.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<(), SyncError> {
        let start = Instant::now();
        let deadline = start + timeout;
        let mut permits = self.permits.lock();
        loop {
            if permits.count > 0 {
                permits.count -= 1;
                return Ok(());
            }
            if permits.closed {
                return Err(SyncError::Closed { name: self.name });
            }
            if self.available.wait_until(&mut permits, deadline).timed_out() && permits.count == 0 {
                return Err(SyncError::TimedOut {
                    name: self.name,
                    waited: start.elapsed(),
                });
            }
        }
    }

    /// Takes a permit if one is available right now.
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut permits = self.permits.lock();
        if permits.count > 0 {
            permits.count -= 1;
            true
        } else {
            false
        }
    }

    /// Number of permits currently available.
    #[must_use]
    pub fn available(&self) -> usize {
        self.permits.lock().count
    }

    /// Closes the semaphore and wakes every waiter. Idempotent.
    pub fn close(&self) {
        let mut permits = self.permits.lock();
        if permits.closed {
            return;
        }
        permits.closed = true;
        drop(permits);
        self.available.notify_all();
    }

    /// Returns true once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.permits.lock().closed
    }
}
