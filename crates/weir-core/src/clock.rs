//! Wall-clock abstraction
//!
//! Ledger state is derived lazily from "now", so the source of time is
//! injected. Production code uses [`SystemClock`]; tests and the scenario
//! replayer drive a [`ManualClock`].

use std::sync::Arc;

use crate::types::Timestamp;

/// Source of the current unix time in seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Timestamp;
}

/// Reads the operating system clock
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// Manually driven clock. Clones share the same underlying time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    time: Arc<parking_lot::Mutex<Timestamp>>,
}

impl ManualClock {
    /// Create a clock frozen at `time`
    pub fn new(time: Timestamp) -> Self {
        Self {
            time: Arc::new(parking_lot::Mutex::new(time)),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, time: Timestamp) {
        *self.time.lock() = time;
    }

    /// Move forward by `secs`, returning the new time
    pub fn advance(&self, secs: i64) -> Timestamp {
        let mut time = self.time.lock();
        *time = time.saturating_add(secs);
        *time
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        *self.time.lock()
    }
}

impl<C: Clock + ?Sized> Clock for Arc<C> {
    fn now(&self) -> Timestamp {
        (**self).now()
    }
}
