//! Wall-clock abstraction so "now" can be pinned in tests.

use super::UnixSecs;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> UnixSecs;
}

/// The system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> UnixSecs {
        UnixSecs::new(chrono::Utc::now().timestamp())
    }
}

/// A settable clock for deterministic tests.
#[derive(Debug, Default)]
pub struct FixedClock(AtomicI64);

impl FixedClock {
    pub fn new(now: UnixSecs) -> Self {
        FixedClock(AtomicI64::new(now.as_i64()))
    }

    pub fn set(&self, now: UnixSecs) {
        self.0.store(now.as_i64(), Ordering::SeqCst);
    }

    pub fn advance(&self, secs: i64) {
        self.0.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> UnixSecs {
        UnixSecs::new(self.0.load(Ordering::SeqCst))
    }
}
