//! Fixed-capacity sample FIFO with overwrite-oldest eviction.
//!
//! Not synchronized on its own; the owning [`EventNotifier`] keeps it
//! behind the buffer lock.
//!
//! [`EventNotifier`]: crate::notifier::EventNotifier

use crate::sample::Sample;

/// Number of samples held before the oldest is overwritten.
pub const RING_DEPTH: usize = 64;

#[derive(Debug)]
pub struct RingBuffer {
    slots: [Sample; RING_DEPTH],
    head: usize,
    tail: usize,
    count: usize,
    alert_count: usize,
    pending: bool,
}

impl RingBuffer {
    pub fn new() -> Self {
        Self {
            slots: [Sample::default(); RING_DEPTH],
            head: 0,
            tail: 0,
            count: 0,
            alert_count: 0,
            pending: false,
        }
    }

    /// Appends `sample`, evicting and returning the oldest entry when full.
    pub fn push(&mut self, sample: Sample) -> Option<Sample> {
        let evicted = if self.count == RING_DEPTH {
            let oldest = self.slots[self.tail];
            self.tail = (self.tail + 1) % RING_DEPTH;
            if oldest.is_alert() {
                self.alert_count -= 1;
            }
            Some(oldest)
        } else {
            self.count += 1;
            None
        };

        self.slots[self.head] = sample;
        self.head = (self.head + 1) % RING_DEPTH;
        if sample.is_alert() {
            self.alert_count += 1;
        }
        self.pending = true;

        debug_assert!(
            self.alert_count <= self.count,
            "Alert count {} exceeds buffered count {}",
            self.alert_count,
            self.count
        );

        evicted
    }

    /// Removes and returns the oldest sample.
    pub fn pop(&mut self) -> Option<Sample> {
        if self.count == 0 {
            return None;
        }

        let sample = self.slots[self.tail];
        self.tail = (self.tail + 1) % RING_DEPTH;
        self.count -= 1;
        if sample.is_alert() {
            self.alert_count -= 1;
        }
        if self.count == 0 {
            self.pending = false;
        }

        Some(sample)
    }

    pub fn has_data(&self) -> bool {
        self.count > 0
    }

    /// Readiness signal: set on every push, cleared once a pop drains the
    /// buffer.
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn is_full(&self) -> bool {
        self.count == RING_DEPTH
    }

    pub fn capacity(&self) -> usize {
        RING_DEPTH
    }

    /// Number of buffered samples carrying the threshold alert flag.
    pub fn alert_count(&self) -> usize {
        self.alert_count
    }

    /// Buffered samples, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Sample> + '_ {
        (0..self.count).map(move |i| &self.slots[(self.tail + i) % RING_DEPTH])
    }
}

impl Default for RingBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::SampleFlags;

    fn sample(ts: u64, alert: bool) -> Sample {
        let mut flags = SampleFlags::NEW_SAMPLE;
        if alert {
            flags = flags.with(SampleFlags::THRESHOLD_ALERT);
        }
        Sample {
            timestamp_ns: ts,
            temp_mc: 40_000,
            flags,
        }
    }

    fn true_alert_count(ring: &RingBuffer) -> usize {
        ring.iter().filter(|s| s.is_alert()).count()
    }

    #[test]
    fn test_empty_pop() {
        let mut ring = RingBuffer::new();
        assert!(!ring.has_data());
        assert_eq!(ring.pop(), None);
        assert!(!ring.is_pending());
    }

    #[test]
    fn test_fifo_order() {
        let mut ring = RingBuffer::new();
        for ts in 0..5 {
            assert_eq!(ring.push(sample(ts, false)), None);
        }
        for ts in 0..5 {
            assert_eq!(ring.pop().map(|s| s.timestamp_ns), Some(ts));
        }
        assert!(ring.is_empty());
    }

    #[test]
    fn test_overwrite_oldest() {
        let mut ring = RingBuffer::new();
        for ts in 0..RING_DEPTH as u64 {
            ring.push(sample(ts, false));
        }
        assert!(ring.is_full());

        let evicted = ring.push(sample(RING_DEPTH as u64, false));
        assert_eq!(evicted.map(|s| s.timestamp_ns), Some(0));
        assert_eq!(ring.len(), RING_DEPTH);

        let kept: Vec<u64> = ring.iter().map(|s| s.timestamp_ns).collect();
        let expected: Vec<u64> = (1..=RING_DEPTH as u64).collect();
        assert_eq!(kept, expected);
    }

    #[test]
    fn test_alert_accounting_through_eviction() {
        let mut ring = RingBuffer::new();
        for ts in 0..(RING_DEPTH as u64 * 3) {
            ring.push(sample(ts, ts % 3 == 0));
            assert_eq!(ring.alert_count(), true_alert_count(&ring));
        }
        while ring.pop().is_some() {
            assert_eq!(ring.alert_count(), true_alert_count(&ring));
        }
        assert_eq!(ring.alert_count(), 0);
    }

    #[test]
    fn test_pending_cleared_when_drained() {
        let mut ring = RingBuffer::new();
        ring.push(sample(1, false));
        ring.push(sample(2, true));
        assert!(ring.is_pending());

        ring.pop();
        assert!(ring.is_pending());
        ring.pop();
        assert!(!ring.is_pending());
    }
}
