//! Time source for the dispute windows.
//!
//! Windows are compared against a clock supplied by the environment. The
//! clock must never go backwards; [`ManualClock`] enforces that in tests.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use chrono::{DateTime, Utc};

/// A monotonically non-decreasing time source.
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock advanced by hand, with one-second resolution.
///
/// Clones share the same underlying time, so a test can hold one handle
/// while a component owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    secs: Arc<AtomicI64>,
}

impl ManualClock {
    #[must_use]
    pub fn starting_at(unix_secs: i64) -> Self {
        Self {
            secs: Arc::new(AtomicI64::new(unix_secs)),
        }
    }

    /// Move time forward by `secs`.
    pub fn advance(&self, secs: u32) {
        self.secs.fetch_add(i64::from(secs), Ordering::SeqCst);
    }

    /// Jump to `unix_secs`. Requests to move backwards are ignored.
    pub fn set(&self, unix_secs: i64) {
        self.secs.fetch_max(unix_secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let secs = self.secs.load(Ordering::SeqCst);
        DateTime::from_timestamp(secs, 0).unwrap_or_default()
    }
}
