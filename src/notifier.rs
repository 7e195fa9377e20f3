//! Buffer lock domain: the sample ring, the shutdown flag and the condition
//! variable readers sleep on.
//!
//! Critical sections here are short and never suspend (other than the
//! condvar wait itself), so the fire path may push from its timer thread
//! without blocking behind configuration writes.

use crate::error::DeviceError;
use crate::ring::RingBuffer;
use crate::sample::Sample;
use serde::{Deserialize, Serialize};
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Non-blocking readiness bits, the equivalent of a poll mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Readiness {
    pub readable: bool,
    pub alert_pending: bool,
    pub closed: bool,
}

impl Readiness {
    pub const READABLE: u32 = 1 << 0;
    pub const ALERT_PENDING: u32 = 1 << 1;
    pub const CLOSED: u32 = 1 << 2;

    pub fn bits(self) -> u32 {
        let mut bits = 0;
        if self.readable {
            bits |= Self::READABLE;
        }
        if self.alert_pending {
            bits |= Self::ALERT_PENDING;
        }
        if self.closed {
            bits |= Self::CLOSED;
        }
        bits
    }
}

/// How long a consumer is willing to wait for a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    NonBlocking,
    Forever,
    Timeout(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferStatus {
    pub buffered: usize,
    pub alerts_buffered: usize,
    pub capacity: usize,
}

#[derive(Debug, Default)]
struct BufferDomain {
    ring: RingBuffer,
    closed: bool,
}

impl BufferDomain {
    fn readiness(&self) -> Readiness {
        Readiness {
            readable: self.ring.has_data(),
            alert_pending: self.ring.alert_count() > 0,
            closed: self.closed,
        }
    }

    fn ready(&self) -> bool {
        self.ring.has_data() || self.closed
    }
}

#[derive(Debug, Default)]
pub struct EventNotifier {
    domain: Mutex<BufferDomain>,
    readable: Condvar,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferDomain> {
        self.domain.lock()
    }

    /// Stores a sample without waking anyone; callers follow up with
    /// [`notify_all`](Self::notify_all). Returns the evicted sample when the
    /// ring was full.
    ///
    /// Refused with `Closed` once [`close`](Self::close) has run; the check
    /// and the store happen under one lock acquisition.
    pub fn push(&self, sample: Sample) -> Result<Option<Sample>, DeviceError> {
        let mut domain = self.lock();
        if domain.closed {
            return Err(DeviceError::Closed);
        }
        Ok(domain.ring.push(sample))
    }

    /// Wakes every suspended reader.
    pub fn notify_all(&self) {
        self.readable.notify_all();
    }

    pub fn pop(&self) -> Option<Sample> {
        self.lock().ring.pop()
    }

    pub fn has_data(&self) -> bool {
        self.lock().ring.has_data()
    }

    pub fn poll_readiness(&self) -> Readiness {
        self.lock().readiness()
    }

    pub fn status(&self) -> BufferStatus {
        let domain = self.lock();
        BufferStatus {
            buffered: domain.ring.len(),
            alerts_buffered: domain.ring.alert_count(),
            capacity: domain.ring.capacity(),
        }
    }

    /// Suspends until a sample is buffered or the notifier is closed.
    pub fn wait_for_readable(&self) -> Readiness {
        let mut guard = self.lock();
        self.readable.wait_while(&mut guard, |domain| !domain.ready());
        guard.readiness()
    }

    /// Bounded [`wait_for_readable`](Self::wait_for_readable); `None` on
    /// timeout.
    pub fn wait_for_readable_timeout(&self, timeout: Duration) -> Option<Readiness> {
        let mut guard = self.lock();
        let result = self
            .readable
            .wait_while_for(&mut guard, |domain| !domain.ready(), timeout);
        if result.timed_out() {
            None
        } else {
            Some(guard.readiness())
        }
    }

    /// Pops one sample, waiting according to `wait`.
    ///
    /// Buffered data is always drained before `Closed` is reported. The
    /// check-and-pop happens under one lock acquisition so concurrent
    /// readers each consume a distinct sample.
    pub fn take(&self, wait: Wait) -> Result<Sample, DeviceError> {
        let deadline = match wait {
            Wait::Timeout(timeout) => Instant::now() + timeout,
            Wait::NonBlocking | Wait::Forever => Instant::now(),
        };

        let mut guard = self.lock();
        loop {
            if let Some(sample) = guard.ring.pop() {
                return Ok(sample);
            }
            if guard.closed {
                return Err(DeviceError::Closed);
            }

            match wait {
                Wait::NonBlocking => return Err(DeviceError::WouldBlock),
                Wait::Forever => self.readable.wait(&mut guard),
                Wait::Timeout(_) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(DeviceError::TimedOut);
                    }
                    self.readable.wait_for(&mut guard, remaining);
                }
            }
        }
    }

    /// Sets the permanent shutdown condition and wakes all waiters.
    pub fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
