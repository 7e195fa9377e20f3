use serde::{Deserialize, Serialize};

pub const TEMP_MIN_MC: i32 = 20_000;
pub const TEMP_MAX_MC: i32 = 80_000;
pub const INITIAL_TEMP_MC: i32 = 45_000;

const NORMAL_JITTER_MC: i32 = 800;
const NOISY_JITTER_MC: i32 = 2_400;
const RAMP_STEP_MC: i32 = 800;

pub const DEFAULT_SEED: u64 = 0x1234_5678_9ABC_DEF0;

/// Simulation model used for the next generated sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SimMode {
    #[default]
    Normal,
    Noisy,
    Ramp,
}

impl SimMode {
    pub const ALL: [SimMode; 3] = [SimMode::Normal, SimMode::Noisy, SimMode::Ramp];

    pub fn as_str(self) -> &'static str {
        match self {
            SimMode::Normal => "normal",
            SimMode::Noisy => "noisy",
            SimMode::Ramp => "ramp",
        }
    }

    /// Case-insensitive exact match; no prefix or partial matches.
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .iter()
            .copied()
            .find(|mode| mode.as_str().eq_ignore_ascii_case(name))
    }

    fn to_raw(self) -> u8 {
        match self {
            SimMode::Normal => 0,
            SimMode::Noisy => 1,
            SimMode::Ramp => 2,
        }
    }

    fn from_raw(raw: u8) -> Self {
        match raw {
            1 => SimMode::Noisy,
            2 => SimMode::Ramp,
            _ => SimMode::Normal,
        }
    }
}

impl core::fmt::Display for SimMode {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generator state that must change together: the active mode, the last
/// emitted temperature and the ramp direction.
///
/// Packs into a single `u64` so it can live in one atomic word:
/// bits 0..32 hold `last_temp_mc`, bit 32 the ramp direction and
/// bits 40..48 the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeneratorState {
    pub mode: SimMode,
    pub last_temp_mc: i32,
    pub ramp_increasing: bool,
}

impl GeneratorState {
    pub fn new(mode: SimMode) -> Self {
        Self {
            mode,
            last_temp_mc: INITIAL_TEMP_MC,
            ramp_increasing: true,
        }
        .with_mode(mode)
    }

    /// Applies a mode switch. Entering ramp restarts the trajectory from
    /// the lower bound, heading up.
    #[must_use]
    pub fn with_mode(self, mode: SimMode) -> Self {
        if mode == SimMode::Ramp {
            Self {
                mode,
                last_temp_mc: TEMP_MIN_MC,
                ramp_increasing: true,
            }
        } else {
            Self { mode, ..self }
        }
    }

    pub fn pack(self) -> u64 {
        u64::from(self.last_temp_mc as u32)
            | (u64::from(self.ramp_increasing) << 32)
            | (u64::from(self.mode.to_raw()) << 40)
    }

    pub fn unpack(word: u64) -> Self {
        Self {
            last_temp_mc: (word & 0xFFFF_FFFF) as u32 as i32,
            ramp_increasing: (word >> 32) & 1 == 1,
            mode: SimMode::from_raw(((word >> 40) & 0xFF) as u8),
        }
    }
}

impl Default for GeneratorState {
    fn default() -> Self {
        Self::new(SimMode::Normal)
    }
}

/// Linear congruential generator; deterministic for a given seed.
#[derive(Debug, Clone)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    pub fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    fn next_random(&mut self) -> u64 {
        // Numerical Recipes parameters
        self.state = self.state.wrapping_mul(1_664_525).wrapping_add(1_013_904_223);
        self.state
    }

    pub fn next_u32(&mut self) -> u32 {
        (self.next_random() >> 32) as u32
    }

    /// Uniform integer in `[-span, +span]`.
    pub fn jitter(&mut self, span: i32) -> i32 {
        debug_assert!(span >= 0, "jitter span {} is negative", span);
        let width = (span as u32) * 2 + 1;
        (self.next_u32() % width) as i32 - span
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::new(DEFAULT_SEED)
    }
}

/// Computes the state following `state`. Only `last_temp_mc` and
/// `ramp_increasing` change; the emitted temperature is `last_temp_mc` of
/// the result.
pub fn step(state: GeneratorState, rng: &mut SimRng) -> GeneratorState {
    let prior = state.last_temp_mc;
    let mut next = state;

    match state.mode {
        SimMode::Normal => {
            next.last_temp_mc = clamp_temp(prior.saturating_add(rng.jitter(NORMAL_JITTER_MC)));
        }
        SimMode::Noisy => {
            next.last_temp_mc = clamp_temp(prior.saturating_add(rng.jitter(NOISY_JITTER_MC)));
        }
        SimMode::Ramp => {
            let raw = if state.ramp_increasing {
                prior.saturating_add(RAMP_STEP_MC)
            } else {
                prior.saturating_sub(RAMP_STEP_MC)
            };

            if raw >= TEMP_MAX_MC {
                next.last_temp_mc = TEMP_MAX_MC;
                next.ramp_increasing = false;
            } else if raw <= TEMP_MIN_MC {
                next.last_temp_mc = TEMP_MIN_MC;
                next.ramp_increasing = true;
            } else {
                next.last_temp_mc = raw;
            }
        }
    }

    debug_assert!(
        (TEMP_MIN_MC..=TEMP_MAX_MC).contains(&next.last_temp_mc),
        "Generated temperature {} outside simulation range",
        next.last_temp_mc
    );

    next
}

pub fn clamp_temp(temp_mc: i32) -> i32 {
    temp_mc.clamp(TEMP_MIN_MC, TEMP_MAX_MC)
}

/// Stateful wrapper owning the random source used by the fire path.
#[derive(Debug, Clone, Default)]
pub struct SampleGenerator {
    rng: SimRng,
}

impl SampleGenerator {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SimRng::new(seed),
        }
    }

    pub fn step(&mut self, state: GeneratorState) -> GeneratorState {
        step(state, &mut self.rng)
    }
}
