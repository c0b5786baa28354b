//! Low-frequency oscillators
//!
//! The chip has two sine LFOs and two ramp LFOs. All four are advanced
//! exactly once per sample by the sample driver, no matter how often the
//! program reads them. Each keeps a latched copy of its phase from the
//! last advance, which CHO instructions read when the `REG` flag is set.
//!
//! Parameter setters never reject input. Out-of-range values are clamped
//! and the setter returns `true` so the caller can raise a diagnostic.
//!
//! # Literature
//!
//! - FV-1 datasheet, "LFO" and the WLDS/WLDR/JAM/CHO descriptions
//! - Spin Semiconductor application note AN-0001, "Basics of the LFOs"

use core::f64::consts::TAU;
use save_state_macro::{DefaultByNew, InSaveState};

/// The sample rate the chip is specified at
pub const SAMPLE_RATE: u32 = 32768;

/// Sine phase accumulator clock: the phase advances `4 * f / 2^17` turns
/// per sample at the nominal sample rate
const REFERENCE_CLOCK: f64 = 131072.0;

pub const SINE_RATE_MAX: i32 = 0x1ff;
pub const SINE_AMPLITUDE_MAX: i32 = 0x7fff;

pub const RAMP_RATE_MIN: i32 = -0x4000;
pub const RAMP_RATE_MAX: i32 = 0x7fff;
/// Ramp amplitudes in delay samples, indexed by the 2-bit WLDR field
pub const RAMP_AMPLITUDES: [i32; 4] = [4096, 2048, 1024, 512];

/// The ramp counter wraps to this value when it underflows zero
const RAMP_COUNTER_MAX: i32 = (1 << 23) - 1;

/// Selects one of the four oscillators (2-bit field in CHO, WLDS, WLDR)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LfoSelect {
    Sin0,
    Sin1,
    Rmp0,
    Rmp1,
}

impl LfoSelect {
    pub const fn from_bits(bits: u32) -> Self {
        match bits & 3 {
            0 => Self::Sin0,
            1 => Self::Sin1,
            2 => Self::Rmp0,
            _ => Self::Rmp1,
        }
    }

    pub const fn is_ramp(&self) -> bool {
        matches!(self, Self::Rmp0 | Self::Rmp1)
    }

    /// Index within its own kind, 0 or 1
    pub const fn unit(&self) -> usize {
        match self {
            Self::Sin0 | Self::Rmp0 => 0,
            Self::Sin1 | Self::Rmp1 => 1,
        }
    }

    /// Index over all four oscillators
    pub const fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for LfoSelect {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Sin0 => "SIN0",
            Self::Sin1 => "SIN1",
            Self::Rmp0 => "RMP0",
            Self::Rmp1 => "RMP1",
        })
    }
}

#[derive(Debug, Clone, InSaveState, DefaultByNew)]
pub struct SineLfo {
    angle: f64,
    latched: f64,
    rate: i32,
    amplitude: i32,
}

impl SineLfo {
    pub const fn new() -> Self {
        Self {
            angle: 0.0,
            latched: 0.0,
            rate: 0,
            amplitude: 0,
        }
    }

    /// Set the 9-bit rate, returns `true` if `raw` had to be clamped
    pub fn set_rate(&mut self, raw: i32) -> bool {
        self.rate = raw.clamp(0, SINE_RATE_MAX);
        self.rate != raw
    }

    /// Set the 15-bit amplitude, returns `true` if `raw` had to be clamped
    pub fn set_amplitude(&mut self, raw: i32) -> bool {
        self.amplitude = raw.clamp(0, SINE_AMPLITUDE_MAX);
        self.amplitude != raw
    }

    pub const fn rate(&self) -> i32 {
        self.rate
    }

    pub const fn amplitude(&self) -> i32 {
        self.amplitude
    }

    /// The rate in Hz at the nominal sample rate, at most ca. 20 Hz
    pub fn normalized_rate(&self) -> f64 {
        self.frequency(SAMPLE_RATE)
    }

    /// The rate in Hz when the chip is clocked for `sample_rate`
    pub fn frequency(&self, sample_rate: u32) -> f64 {
        f64::from(self.rate) * f64::from(sample_rate) / (REFERENCE_CLOCK * TAU)
    }

    /// Amplitude as a fraction of full scale, `[0, 1)`
    pub fn normalized_amplitude(&self) -> f64 {
        f64::from(self.amplitude) / f64::from(SINE_AMPLITUDE_MAX + 1)
    }

    pub fn advance(&mut self) {
        self.angle = (self.angle + 4.0 * self.normalized_rate() / REFERENCE_CLOCK * TAU) % TAU;
        self.latched = self.angle;
    }

    pub const fn angle(&self) -> f64 {
        self.angle
    }

    pub fn sine(&self) -> f64 {
        self.angle.sin()
    }

    pub fn cosine(&self) -> f64 {
        self.angle.cos()
    }

    pub fn latched_sine(&self) -> f64 {
        self.latched.sin()
    }

    pub fn latched_cosine(&self) -> f64 {
        self.latched.cos()
    }
}

#[derive(Debug, Clone, InSaveState, DefaultByNew)]
pub struct RampLfo {
    counter: i32,
    latched: i32,
    rate: i32,
    amplitude: i32,
}

impl RampLfo {
    pub const fn new() -> Self {
        Self {
            counter: 0,
            latched: 0,
            rate: 0,
            amplitude: RAMP_AMPLITUDES[0],
        }
    }

    /// Set the signed rate, returns `true` if `raw` had to be clamped
    pub fn set_rate(&mut self, raw: i32) -> bool {
        self.rate = raw.clamp(RAMP_RATE_MIN, RAMP_RATE_MAX);
        self.rate != raw
    }

    /// Select one of the four fixed amplitudes
    pub fn set_amplitude_index(&mut self, idx: u32) {
        self.amplitude = RAMP_AMPLITUDES[(idx & 3) as usize];
    }

    /// Set the amplitude in samples, returns `true` if `raw` is not one of
    /// [`RAMP_AMPLITUDES`]; the nearest one is used instead
    pub fn set_amplitude(&mut self, raw: i32) -> bool {
        let nearest = RAMP_AMPLITUDES
            .iter()
            .copied()
            .min_by_key(|amp| (i64::from(*amp) - i64::from(raw)).abs())
            .unwrap_or(RAMP_AMPLITUDES[0]);
        self.amplitude = nearest;
        nearest != raw
    }

    pub const fn rate(&self) -> i32 {
        self.rate
    }

    pub const fn amplitude(&self) -> i32 {
        self.amplitude
    }

    /// Count down by a quarter of the rate, wrapping to the maximum
    pub fn advance(&mut self) {
        let mut counter = self.counter - (self.rate >> 2);
        if counter < 0 {
            counter += RAMP_COUNTER_MAX + 1;
        } else if counter > RAMP_COUNTER_MAX {
            counter -= RAMP_COUNTER_MAX + 1;
        }
        self.counter = counter;
        self.latched = counter;
    }

    /// Restart the ramp, used by JAM; the latched position restarts too
    pub fn reset(&mut self) {
        self.counter = 0;
        self.latched = 0;
    }

    pub const fn counter(&self) -> i32 {
        self.counter
    }

    fn normalize(counter: i32) -> f64 {
        f64::from(counter) / f64::from(RAMP_COUNTER_MAX) * 0.5
    }

    /// Position in the ramp cycle, `[0, 0.5]`
    pub fn value(&self) -> f64 {
        Self::normalize(self.counter)
    }

    pub fn latched_value(&self) -> f64 {
        Self::normalize(self.latched)
    }
}

/// The oscillator bank
#[derive(Debug, Clone, InSaveState, DefaultByNew)]
pub struct Lfos {
    pub sin: [SineLfo; 2],
    pub rmp: [RampLfo; 2],
}

impl Lfos {
    pub const fn new() -> Self {
        Self {
            sin: [SineLfo::new(), SineLfo::new()],
            rmp: [RampLfo::new(), RampLfo::new()],
        }
    }

    /// Advance all four oscillators by one sample
    pub fn advance(&mut self) {
        self.sin.iter_mut().for_each(SineLfo::advance);
        self.rmp.iter_mut().for_each(RampLfo::advance);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sine_rate_is_bounded_to_20hz() {
        let mut lfo = SineLfo::new();
        assert!(!lfo.set_rate(SINE_RATE_MAX));
        assert!(lfo.normalized_rate() < 20.5);
        assert!(lfo.set_rate(1000));
        assert_eq!(lfo.rate(), SINE_RATE_MAX);
        assert!(lfo.set_rate(-1));
        assert_eq!(lfo.rate(), 0);
    }

    #[test]
    fn sine_completes_a_cycle_at_its_frequency() {
        let mut lfo = SineLfo::new();
        lfo.set_rate(256);
        let samples = (f64::from(SAMPLE_RATE) / lfo.normalized_rate()).round() as usize;
        for _ in 0..samples {
            lfo.advance();
        }
        assert!(lfo.sine().abs() < 1e-3);
        assert!((lfo.cosine() - 1.0).abs() < 1e-3);
    }

    #[test]
    fn sine_latches_on_advance() {
        let mut lfo = SineLfo::new();
        lfo.set_rate(100);
        lfo.advance();
        assert_eq!(lfo.latched_sine(), lfo.sine());
        assert!(lfo.sine() > 0.0);
    }

    #[test]
    fn ramp_wraps_to_maximum() {
        let mut lfo = RampLfo::new();
        lfo.set_rate(0x7fff);
        lfo.advance();
        assert_eq!(lfo.counter(), RAMP_COUNTER_MAX + 1 - (0x7fff >> 2));
        assert!(lfo.value() <= 0.5);
        assert!(lfo.latched_value() > 0.0);
        lfo.reset();
        assert_eq!(lfo.value(), 0.0);
        assert_eq!(lfo.latched_value(), 0.0);
    }

    #[test]
    fn negative_ramp_rate_counts_up() {
        let mut lfo = RampLfo::new();
        lfo.set_rate(-0x100);
        lfo.advance();
        assert_eq!(lfo.counter(), 0x40);
    }

    #[test]
    fn ramp_parameters_are_validated() {
        let mut lfo = RampLfo::new();
        assert!(lfo.set_rate(-0x8000));
        assert_eq!(lfo.rate(), RAMP_RATE_MIN);
        for amp in RAMP_AMPLITUDES {
            assert!(!lfo.set_amplitude(amp));
        }
        assert!(lfo.set_amplitude(1500));
        assert_eq!(lfo.amplitude(), 1024);
        lfo.set_amplitude_index(3);
        assert_eq!(lfo.amplitude(), 512);
    }

    #[test]
    fn ramp_value_stays_in_range() {
        let mut lfo = RampLfo::new();
        lfo.set_rate(12345);
        for _ in 0..100_000 {
            lfo.advance();
            assert!((0.0..=0.5).contains(&lfo.value()));
        }
    }
}
