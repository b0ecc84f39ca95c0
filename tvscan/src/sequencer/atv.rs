//! Analog step search.
//!
//! `Fixed` scans a ±1.5 MHz window around every configured frequency,
//! `Auto` sweeps from min to max once, `Manual` sweeps in one direction and
//! wraps around the range until a channel is found.

use tvscan_protocol::{AtvMode, StepDirection};

pub const ATV_10KHZ: u32 = 10_000;
pub const ATV_1MHZ: u32 = 1_000_000;
/// Half width of the window searched around a fixed analog frequency.
pub const ATV_1_5MHZ: u32 = 1_500_000;

/// What happens to a frequency stepped out of `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeCheck {
    /// Clamp to the nearest bound; reaching max ends the pass.
    Clamp,
    /// Wrap to the other bound by the exceeded amount.
    Loop,
}

/// Step search state of the analog pass.
#[derive(Debug, Clone)]
pub struct AtvStepper {
    mode: AtvMode,
    direction: StepDirection,
    range_check: RangeCheck,
    min: u32,
    max: u32,
    /// Distance covered since the manual sweep started.
    swept: u64,
}

impl AtvStepper {
    pub fn new(mode: AtvMode, direction: StepDirection) -> Self {
        let (direction, range_check) = match mode {
            AtvMode::Manual => (direction, RangeCheck::Loop),
            AtvMode::Fixed | AtvMode::Auto => (StepDirection::Up, RangeCheck::Clamp),
        };
        Self {
            mode,
            direction,
            range_check,
            min: 0,
            max: 0,
            swept: 0,
        }
    }

    pub fn mode(&self) -> AtvMode {
        self.mode
    }

    pub fn range(&self) -> (u32, u32) {
        (self.min, self.max)
    }

    pub fn range_check(&self) -> RangeCheck {
        self.range_check
    }

    pub fn set_range(&mut self, min: u32, max: u32) {
        self.min = min;
        self.max = max;
        self.swept = 0;
    }

    /// Centre a ±1.5 MHz window on a fixed frequency and return where the
    /// search starts.
    pub fn window_around(&mut self, frequency: u32) -> u32 {
        self.set_range(
            frequency.saturating_sub(ATV_1_5MHZ),
            frequency.saturating_add(ATV_1_5MHZ),
        );
        self.min
    }

    /// Next frequency to try after `current`, or `None` when the pass over
    /// this range is finished.
    pub fn next_frequency(&mut self, current: u32, step: u32) -> Option<u32> {
        match self.range_check {
            RangeCheck::Clamp if current >= self.max => return None,
            RangeCheck::Loop if self.swept >= (self.max - self.min) as u64 => return None,
            _ => {}
        }
        self.swept += step as u64;
        let next = current as i64 + step as i64 * self.direction.sign();
        Some(self.check_range(next))
    }

    /// Apply the range policy to a frequency.
    pub fn check_range(&self, freq: i64) -> u32 {
        let (min, max) = (self.min as i64, self.max as i64);
        let span = max - min + 1;
        let checked = match self.range_check {
            RangeCheck::Clamp => freq.clamp(min, max),
            RangeCheck::Loop if freq > max => min + (freq - max) % span,
            RangeCheck::Loop if freq < min => max - (min - freq) % span,
            RangeCheck::Loop => freq,
        };
        checked as u32
    }
}

/// Round a locked analog carrier so that its 10 kHz group reads `.25` or
/// `.75` MHz when it is close to either.
pub fn format_frequency(freq: u32) -> u32 {
    let fraction = match (freq % ATV_1MHZ) / ATV_10KHZ {
        0..=30 => 25,
        70..=80 => 75,
        other => other,
    };
    (freq / ATV_1MHZ) * ATV_1MHZ + fraction * ATV_10KHZ
}
