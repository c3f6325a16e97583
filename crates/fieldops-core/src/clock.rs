//! Injectable wall clock.
//!
//! Every expiry and warranty decision reads time through [`Clock`] so tests
//! can move time forward instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::db::unix_timestamp;

/// Source of the current time, in Unix seconds.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_secs(&self) -> i64;
}

/// The real system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> i64 {
        unix_timestamp()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub const fn new(start_secs: i64) -> Self {
        Self {
            now: AtomicI64::new(start_secs),
        }
    }

    pub fn set(&self, secs: i64) {
        self.now.store(secs, Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}
