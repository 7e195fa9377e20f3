//! Config lock domain.
//!
//! Writers serialize on `write_lock`, apply validation and then publish the
//! result into atomics. The fire path reads those atomics directly and must
//! never take `write_lock`, so a slow configuration write can't delay
//! sample generation.

use crate::error::{ConfigFileError, DeviceError};
use crate::generator::{GeneratorState, SampleGenerator, SimMode};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, Ordering};
use parking_lot::Mutex;
use tracing::{info, warn};

pub const SAMPLING_MS_MIN: u32 = 5;
pub const SAMPLING_MS_MAX: u32 = 5000;
pub const DEFAULT_SAMPLING_MS: u32 = 100;
pub const DEFAULT_THRESHOLD_MC: i32 = 45_000;

/// Result of a sampling interval write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingUpdate {
    pub requested: u32,
    pub applied: u32,
}

impl SamplingUpdate {
    pub fn clamped(&self) -> bool {
        self.requested != self.applied
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
    pub sampling_ms: u32,
    pub threshold_mc: i32,
    pub mode: SimMode,
}

#[derive(Debug)]
pub struct ConfigStore {
    write_lock: Mutex<()>,
    sampling_ms: AtomicU32,
    threshold_mc: AtomicI32,
    generator: AtomicU64,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self {
            write_lock: Mutex::new(()),
            sampling_ms: AtomicU32::new(DEFAULT_SAMPLING_MS),
            threshold_mc: AtomicI32::new(DEFAULT_THRESHOLD_MC),
            generator: AtomicU64::new(GeneratorState::default().pack()),
        }
    }

    pub fn sampling_ms(&self) -> u32 {
        self.sampling_ms.load(Ordering::Acquire)
    }

    pub fn threshold_mc(&self) -> i32 {
        self.threshold_mc.load(Ordering::Acquire)
    }

    pub fn mode(&self) -> SimMode {
        self.generator_state().mode
    }

    pub fn last_temp_mc(&self) -> i32 {
        self.generator_state().last_temp_mc
    }

    pub fn generator_state(&self) -> GeneratorState {
        GeneratorState::unpack(self.generator.load(Ordering::Acquire))
    }

    pub fn snapshot(&self) -> ConfigSnapshot {
        let _guard = self.write_lock.lock();
        ConfigSnapshot {
            sampling_ms: self.sampling_ms(),
            threshold_mc: self.threshold_mc(),
            mode: self.mode(),
        }
    }

    /// Stores `requested` clamped to `[SAMPLING_MS_MIN, SAMPLING_MS_MAX]`.
    /// Clamping is not an error; it only logs a warning.
    pub fn set_sampling_ms(&self, requested: u32) -> SamplingUpdate {
        let applied = requested.clamp(SAMPLING_MS_MIN, SAMPLING_MS_MAX);
        if applied != requested {
            warn!(
                requested,
                applied,
                "sampling_ms out of range [{}, {}], clamped",
                SAMPLING_MS_MIN,
                SAMPLING_MS_MAX
            );
        }

        let _guard = self.write_lock.lock();
        self.sampling_ms.store(applied, Ordering::Release);

        SamplingUpdate { requested, applied }
    }

    pub fn set_threshold_mc(&self, threshold_mc: i32) {
        let _guard = self.write_lock.lock();
        self.threshold_mc.store(threshold_mc, Ordering::Release);
    }

    /// Switches the simulation mode. Mode, last temperature and ramp
    /// direction are published in one atomic store.
    pub fn set_mode(&self, mode: SimMode) {
        let _guard = self.write_lock.lock();
        let previous = self
            .generator
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |word| {
                Some(GeneratorState::unpack(word).with_mode(mode).pack())
            })
            .unwrap_or_else(|word| word);
        let previous = GeneratorState::unpack(previous);

        if previous.mode != mode {
            info!(from = %previous.mode, to = %mode, "simulation mode changed");
        }
    }

    /// Parses and applies a mode literal. Anything other than an exact
    /// (case-insensitive) mode name is rejected and leaves the store as is.
    pub fn set_mode_name(&self, name: &str) -> Result<SimMode, DeviceError> {
        let mode = SimMode::parse(name).ok_or_else(|| {
            warn!(input = name.trim(), "rejected unknown simulation mode");
            DeviceError::Validation(format!(
                "unknown mode '{}', expected one of normal, noisy, ramp",
                name.trim()
            ))
        })?;
        self.set_mode(mode);
        Ok(mode)
    }

    /// Advances the generator by one step and returns the new state.
    ///
    /// Lock-free: a compare-and-swap loop recomputes the step if a mode
    /// switch lands in between, so the switch is never overwritten by a
    /// stale generator result.
    pub fn advance_generator(&self, generator: &mut SampleGenerator) -> GeneratorState {
        let mut current = self.generator.load(Ordering::Acquire);
        loop {
            let next = generator.step(GeneratorState::unpack(current));
            match self.generator.compare_exchange_weak(
                current,
                next.pack(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration applied when a device is attached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InitialConfig {
    pub sampling_ms: Option<u32>,
    pub threshold_mc: Option<i32>,
    pub mode: Option<String>,
    pub seed: Option<u64>,
}

impl InitialConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigFileError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::TEMP_MIN_MC;

    #[test]
    fn test_defaults() {
        let store = ConfigStore::new();
        assert_eq!(
            store.snapshot(),
            ConfigSnapshot {
                sampling_ms: 100,
                threshold_mc: 45_000,
                mode: SimMode::Normal,
            }
        );
        assert_eq!(store.last_temp_mc(), 45_000);
    }

    #[test]
    fn test_sampling_roundtrip_and_clamp() {
        let store = ConfigStore::new();
        for v in [5, 6, 100, 2500, 4999, 5000] {
            let update = store.set_sampling_ms(v);
            assert!(!update.clamped());
            assert_eq!(store.sampling_ms(), v);
        }

        assert_eq!(store.set_sampling_ms(0).applied, 5);
        assert_eq!(store.sampling_ms(), 5);
        assert_eq!(store.set_sampling_ms(4).applied, 5);
        assert!(store.set_sampling_ms(5001).clamped());
        assert_eq!(store.sampling_ms(), 5000);
    }

    #[test]
    fn test_threshold_unrestricted() {
        let store = ConfigStore::new();
        store.set_threshold_mc(-273_150);
        assert_eq!(store.threshold_mc(), -273_150);
        store.set_threshold_mc(i32::MAX);
        assert_eq!(store.threshold_mc(), i32::MAX);
    }

    #[test]
    fn test_invalid_mode_leaves_store_unchanged() {
        let store = ConfigStore::new();
        store.set_mode(SimMode::Noisy);
        let before = store.generator_state();

        assert!(matches!(store.set_mode_name("bogus"), Err(DeviceError::Validation(_))));
        assert_eq!(store.generator_state(), before);
    }

    #[test]
    fn test_ramp_switch_resets_generator() {
        let store = ConfigStore::new();
        assert_eq!(store.set_mode_name("Ramp").unwrap(), SimMode::Ramp);
        let state = store.generator_state();
        assert_eq!(state.mode, SimMode::Ramp);
        assert_eq!(state.last_temp_mc, TEMP_MIN_MC);
        assert!(state.ramp_increasing);
    }

    #[test]
    fn test_advance_generator_publishes_state() {
        let store = ConfigStore::new();
        store.set_mode(SimMode::Ramp);
        let mut generator = SampleGenerator::default();

        let next = store.advance_generator(&mut generator);
        assert_eq!(next.last_temp_mc, TEMP_MIN_MC + 800);
        assert_eq!(store.last_temp_mc(), TEMP_MIN_MC + 800);
    }

    #[test]
    fn test_initial_config_parsing() {
        let config = InitialConfig::from_json_str(
            r#"{"sampling_ms": 250, "threshold_mc": 30000, "mode": "noisy"}"#,
        )
        .unwrap();
        assert_eq!(config.sampling_ms, Some(250));
        assert_eq!(config.threshold_mc, Some(30_000));
        assert_eq!(config.mode.as_deref(), Some("noisy"));
        assert_eq!(config.seed, None);

        assert!(InitialConfig::from_json_str("{}").unwrap() == InitialConfig::default());
        assert!(InitialConfig::from_json_str(r#"{"sampling": 1}"#).is_err());
    }
}
