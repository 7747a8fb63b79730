//! Launch-once primitive for the dataset publisher.

use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;

/// Marks whether the publisher has been launched, and wakes it when it is.
///
/// The flag goes from unset to set exactly once and is never cleared. The
/// compare-and-set is the single decision point: whichever caller wins it
/// signals the waiting worker, every later caller observes "already set".
///
/// A second flag records that a worker has taken the launch, so at most one
/// publisher ever streams the dataset per guard.
pub struct LaunchGuard {
    launched: AtomicBool,
    claimed: AtomicBool,
    start: Signal<CriticalSectionRawMutex, ()>,
}

impl LaunchGuard {
    /// Creates an unset guard.
    pub const fn new() -> Self {
        Self {
            launched: AtomicBool::new(false),
            claimed: AtomicBool::new(false),
            start: Signal::new(),
        }
    }

    /// Sets the guard and releases the worker. Returns `false` if the guard
    /// was already set, in which case nothing happens.
    pub fn try_launch(&self) -> bool {
        let won = self
            .launched
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            self.start.signal(());
        }
        won
    }

    /// Whether [`try_launch`](Self::try_launch) has succeeded.
    pub fn is_launched(&self) -> bool {
        self.launched.load(Ordering::Acquire)
    }

    /// Reserves the single worker slot. Returns `false` for every caller
    /// after the first, whether or not the first worker has finished.
    pub fn claim_worker(&self) -> bool {
        !self.claimed.swap(true, Ordering::AcqRel)
    }

    /// Resolves once [`try_launch`](Self::try_launch) has succeeded.
    pub async fn launched(&self) {
        self.start.wait().await;
    }
}

impl Default for LaunchGuard {
    fn default() -> Self {
        Self::new()
    }
}
