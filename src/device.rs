//! Device façade: one simulated sensor instance.
//!
//! Lock domains, in the order they may be nested:
//!
//! - config (`ConfigStore::write_lock`): configuration writes only.
//! - buffer (`EventNotifier`): ring, shutdown flag, reader wakeups.
//! - stats (`StatsCounter`): counter increments and snapshots.
//!
//! The fire path takes the buffer and stats locks and reads configuration
//! through atomics. It never touches the config lock.

use crate::config::{ConfigSnapshot, ConfigStore, InitialConfig, SamplingUpdate};
use crate::error::DeviceError;
use crate::generator::{SampleGenerator, SimMode, DEFAULT_SEED};
use crate::notifier::{BufferStatus, EventNotifier, Readiness, Wait};
use crate::sample::{now_ns, Sample, SAMPLE_WIRE_SIZE};
use crate::scheduler::{SampleScheduler, SchedulerStats};
use crate::stats::{StatsCounter, StatsSnapshot};
use std::io::Write;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, trace, warn};

/// How new samples are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trigger {
    /// A timer thread fires every `sampling_ms`.
    #[default]
    Periodic,
    /// Samples are only produced by [`SimTempDevice::trigger`].
    Manual,
}

/// A single configuration write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Setting {
    SamplingMs(u32),
    ThresholdMc(i32),
    Mode(String),
}

#[derive(Debug)]
struct DeviceCore {
    config: ConfigStore,
    notifier: EventNotifier,
    stats: StatsCounter,
    // Only the producer side locks this, so it is never contended by
    // configuration writers or readers.
    generator: Mutex<SampleGenerator>,
}

impl DeviceCore {
    /// Fails with `Closed` once the device has shut down; nothing is
    /// buffered or counted in that case.
    fn produce_sample(&self) -> Result<Sample, DeviceError> {
        let state = {
            let mut generator = self.generator.lock();
            self.config.advance_generator(&mut generator)
        };
        let sample = Sample::generated(now_ns(), state.last_temp_mc, self.config.threshold_mc());

        if let Some(evicted) = self.notifier.push(sample)? {
            trace!(evicted_ts = evicted.timestamp_ns, "ring full, oldest sample overwritten");
        }
        self.stats.record_sample(sample.is_alert());
        self.notifier.notify_all();

        trace!(temp_mc = sample.temp_mc, alert = sample.is_alert(), "sample produced");
        Ok(sample)
    }

    fn set_mode(&self, name: &str) -> Result<SimMode, DeviceError> {
        self.config.set_mode_name(name).map_err(|e| {
            self.stats.record_error();
            e
        })
    }
}

#[derive(Debug)]
pub struct SimTempDevice {
    id: u32,
    name: String,
    core: Arc<DeviceCore>,
    scheduler: Option<SampleScheduler>,
}

impl SimTempDevice {
    /// Creates a device sampling on its own timer.
    pub fn attach(id: u32, initial: &InitialConfig) -> Result<Self, DeviceError> {
        Self::build(id, initial, Trigger::Periodic)
    }

    /// Creates a device that only samples when [`trigger`](Self::trigger)
    /// is called.
    pub fn attach_manual(id: u32, initial: &InitialConfig) -> Result<Self, DeviceError> {
        Self::build(id, initial, Trigger::Manual)
    }

    pub fn build(id: u32, initial: &InitialConfig, trigger: Trigger) -> Result<Self, DeviceError> {
        let name = format!("simtemp{id}");
        let seed = initial
            .seed
            .unwrap_or_else(|| DEFAULT_SEED.wrapping_add(u64::from(id)));

        let core = Arc::new(DeviceCore {
            config: ConfigStore::new(),
            notifier: EventNotifier::new(),
            stats: StatsCounter::new(),
            generator: Mutex::new(SampleGenerator::new(seed)),
        });

        // Same rules as runtime writes: the interval clamps, a bad mode is
        // counted and the default kept.
        if let Some(sampling_ms) = initial.sampling_ms {
            core.config.set_sampling_ms(sampling_ms);
        }
        if let Some(threshold_mc) = initial.threshold_mc {
            core.config.set_threshold_mc(threshold_mc);
        }
        if let Some(mode) = initial.mode.as_deref() {
            if let Err(e) = core.set_mode(mode) {
                warn!(device = %name, error = %e, "ignoring invalid initial mode");
            }
        }

        let scheduler = match trigger {
            Trigger::Periodic => {
                let interval_core = Arc::clone(&core);
                let fire_core = Arc::clone(&core);
                let scheduler = SampleScheduler::start(
                    &name,
                    move || Duration::from_millis(u64::from(interval_core.config.sampling_ms())),
                    move || {
                        // Closed: shutdown is stopping the timer.
                        let _ = fire_core.produce_sample();
                    },
                )
                .map_err(DeviceError::Timer)?;
                Some(scheduler)
            }
            Trigger::Manual => None,
        };

        let config = core.config.snapshot();
        info!(
            device = %name,
            sampling_ms = config.sampling_ms,
            threshold_mc = config.threshold_mc,
            mode = %config.mode,
            "device attached"
        );

        Ok(Self {
            id,
            name,
            core,
            scheduler,
        })
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Produces one sample immediately, outside the timer schedule.
    pub fn trigger(&self) -> Result<Sample, DeviceError> {
        self.core.produce_sample()
    }

    /// Pops the oldest sample.
    ///
    /// Blocking reads suspend until a sample arrives or the device shuts
    /// down. Buffered samples are drained before `Closed` is returned.
    pub fn read(&self, blocking: bool) -> Result<Sample, DeviceError> {
        let wait = if blocking { Wait::Forever } else { Wait::NonBlocking };
        self.core.notifier.take(wait)
    }

    /// Non-blocking read in `nb` form.
    pub fn try_read(&self) -> nb::Result<Sample, DeviceError> {
        self.read(false).map_err(|e| match e {
            DeviceError::WouldBlock => nb::Error::WouldBlock,
            other => nb::Error::Other(other),
        })
    }

    /// Blocking read bounded by `timeout`.
    pub fn read_timeout(&self, timeout: Duration) -> Result<Sample, DeviceError> {
        self.core.notifier.take(Wait::Timeout(timeout))
    }

    /// Reads one sample as a wire record into `buf`. A buffer shorter than
    /// one record is rejected without consuming anything.
    pub fn read_into(&self, buf: &mut [u8], blocking: bool) -> Result<usize, DeviceError> {
        if buf.len() < SAMPLE_WIRE_SIZE {
            return Err(DeviceError::InvalidArgument(format!(
                "read buffer of {} bytes is smaller than a {SAMPLE_WIRE_SIZE}-byte sample",
                buf.len()
            )));
        }
        let sample = self.read(blocking)?;
        buf[..SAMPLE_WIRE_SIZE].copy_from_slice(&sample.to_bytes());
        Ok(SAMPLE_WIRE_SIZE)
    }

    /// Reads one sample and hands its wire record to `dst`. If the write
    /// fails the sample is lost and counted as an error.
    pub fn read_to<W: Write>(&self, dst: &mut W, blocking: bool) -> Result<Sample, DeviceError> {
        let sample = self.read(blocking)?;
        dst.write_all(&sample.to_bytes()).map_err(|e| {
            self.core.stats.record_error();
            warn!(device = %self.name, error = %e, "sample hand-off failed, sample dropped");
            DeviceError::TransferFault(e)
        })?;
        Ok(sample)
    }

    pub fn poll(&self) -> Readiness {
        self.core.notifier.poll_readiness()
    }

    pub fn wait_for_readable(&self) -> Readiness {
        self.core.notifier.wait_for_readable()
    }

    pub fn configure(&self, setting: Setting) -> Result<(), DeviceError> {
        match setting {
            Setting::SamplingMs(ms) => {
                self.set_sampling_ms(ms);
                Ok(())
            }
            Setting::ThresholdMc(mc) => {
                self.set_threshold_mc(mc);
                Ok(())
            }
            Setting::Mode(name) => self.set_mode(&name).map(|_| ()),
        }
    }

    /// Stores a clamped sampling interval and re-arms the timer so the
    /// new period applies right away.
    pub fn set_sampling_ms(&self, ms: u32) -> SamplingUpdate {
        let update = self.core.config.set_sampling_ms(ms);
        if let Some(scheduler) = &self.scheduler {
            scheduler.rearm();
        }
        update
    }

    pub fn set_threshold_mc(&self, threshold_mc: i32) {
        self.core.config.set_threshold_mc(threshold_mc);
    }

    /// Switches mode by name. Unknown names are rejected, counted in
    /// `errors`, and leave the active mode unchanged.
    pub fn set_mode(&self, name: &str) -> Result<SimMode, DeviceError> {
        self.core.set_mode(name)
    }

    pub fn sampling_ms(&self) -> u32 {
        self.core.config.sampling_ms()
    }

    pub fn threshold_mc(&self) -> i32 {
        self.core.config.threshold_mc()
    }

    pub fn mode(&self) -> SimMode {
        self.core.config.mode()
    }

    pub fn config(&self) -> ConfigSnapshot {
        self.core.config.snapshot()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.core.stats.snapshot()
    }

    pub fn buffer_status(&self) -> BufferStatus {
        self.core.notifier.status()
    }

    pub fn scheduler_stats(&self) -> Option<SchedulerStats> {
        self.scheduler.as_ref().map(SampleScheduler::stats)
    }

    pub(crate) fn record_error(&self) {
        self.core.stats.record_error();
    }

    pub fn is_closed(&self) -> bool {
        self.core.notifier.is_closed()
    }

    /// Closes the device, wakes every blocked reader and stops the timer.
    /// Returns once no sample generation is in flight.
    pub fn shutdown(&self) {
        let already_closed = self.core.notifier.is_closed();
        self.core.notifier.close();
        if let Some(scheduler) = &self.scheduler {
            scheduler.stop();
        }
        if !already_closed {
            info!(device = %self.name, stats = %self.stats(), "device shut down");
        }
    }
}

impl Drop for SimTempDevice {
    fn drop(&mut self) {
        self.shutdown();
    }
}
