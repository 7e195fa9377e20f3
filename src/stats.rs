use serde::{Deserialize, Serialize};
use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub updates: u32,
    pub alerts: u32,
    pub errors: u32,
}

impl core::fmt::Display for StatsSnapshot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "updates={} alerts={} errors={}",
            self.updates, self.alerts, self.errors
        )
    }
}

/// Device counters. Wrap on overflow.
///
/// All three live under one small lock so a snapshot is consistent; the
/// lock is never held for more than a few increments, which keeps it safe
/// to take from the fire path.
#[derive(Debug, Default)]
pub struct StatsCounter {
    counters: Mutex<StatsSnapshot>,
}

impl StatsCounter {
    pub fn new() -> Self {
        Self::default()
    }

    fn update(&self, f: impl FnOnce(&mut StatsSnapshot)) {
        let mut counters = self.counters.lock();
        f(&mut counters);
    }

    /// Counts one pushed sample, and one alert if it carried the flag.
    pub fn record_sample(&self, alert: bool) {
        self.update(|c| {
            c.updates = c.updates.wrapping_add(1);
            if alert {
                c.alerts = c.alerts.wrapping_add(1);
            }
        });
    }

    pub fn record_error(&self) {
        self.update(|c| c.errors = c.errors.wrapping_add(1));
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        *self.counters.lock()
    }
}
