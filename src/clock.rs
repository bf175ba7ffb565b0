use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Local};

use crate::model::{DateKey, Ms};

/// Source of "now". Injected into the engine so cache staleness and
/// date-based sweeps are testable.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> Ms;

    /// The calendar day bookings are judged against.
    fn today(&self) -> DateKey {
        let now = DateTime::from_timestamp_millis(self.now_ms()).unwrap_or_default();
        DateKey::new(now.date_naive())
    }
}

/// Wall clock; `today` follows the host's local zone.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        Local::now().timestamp_millis()
    }

    fn today(&self) -> DateKey {
        DateKey::new(Local::now().date_naive())
    }
}

/// Hand-driven clock. `today` is the UTC date of the current instant.
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Ms) -> Self {
        Self {
            now: AtomicI64::new(now),
        }
    }

    pub fn set(&self, now: Ms) {
        self.now.store(now, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Ms) {
        self.now.fetch_add(by, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> Ms {
        self.now.load(Ordering::SeqCst)
    }
}
