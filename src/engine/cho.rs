//! CHO, the LFO driven instructions
//!
//! The oscillator value is fetched and shaped by the flags in a fixed
//! order: COS selects the cosine, REG the value latched at the last
//! advance, RPTR2 shifts a ramp by half its cycle, COMPA complements the
//! value and NA replaces it with the crossfade triangle of the ramp.
//! COMPC complements whatever is finally used as coefficient.
//!
//! Sine values are `[-1, 1]` scaled by the amplitude and move the CHO RDA
//! address by 2^14 delay samples per unit. Ramp values run from zero up to
//! `range / 4096`, so the longest ramp reads `[0, 1]`, and move the address
//! by 4096 samples per unit.

use super::{latch_acc, EngineError};
use crate::fixed::{Fixed, QFormat};
use crate::instr::{cho, Mnemonic, Operation, Role};
use crate::lfo::LfoSelect;
use crate::state::MachineState;

/// Delay samples per unit of sine value
const SINE_OFFSET_SCALE: f64 = 16384.0;
/// Delay samples per unit of ramp value
const RAMP_OFFSET_SCALE: f64 = 4096.0;

/// CHO flags that only one kind of oscillator supports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChoFlag {
    /// sine only
    Cos,
    /// ramp only
    Rptr2,
    /// ramp only
    Na,
}

impl std::fmt::Display for ChoFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(match self {
            Self::Cos => "COS",
            Self::Rptr2 => "RPTR2",
            Self::Na => "NA",
        })
    }
}

/// Keep an LFO value within `[-1, 1]`
fn checked(value: f64, what: &str) -> f64 {
    debug_assert!(
        (-1.0..=1.0).contains(&value),
        "{what} {value} outside [-1, 1]"
    );
    if (-1.0..=1.0).contains(&value) {
        value
    } else {
        tracing::warn!(value, what, "LFO value out of range");
        value.clamp(-1.0, 1.0)
    }
}

/// Complement a coefficient towards its own sign's unity
fn compc(value: f64) -> f64 {
    if value < 0.0 {
        -1.0 - value
    } else {
        1.0 - value
    }
}

/// The shaped oscillator output of one CHO instruction
struct LfoValue {
    value: f64,
    /// Delay samples CHO RDA moves per unit of `value`
    offset_scale: f64,
    /// Ramp crossfade coefficient, set with NA
    xfade: Option<f64>,
}

fn fetch(op: &Operation, state: &MachineState) -> Result<LfoValue, EngineError> {
    let lfo = LfoSelect::from_bits(op.bits(Role::Lfo));
    let flags = op.bits(Role::Flags);
    let has = |flag: u32| flags & flag != 0;
    let incompatible = |flag| EngineError::IncompatibleFlag {
        ip: state.ip,
        flag,
        lfo,
    };
    if has(cho::COS) && lfo.is_ramp() {
        return Err(incompatible(ChoFlag::Cos));
    }
    if has(cho::RPTR2) && !lfo.is_ramp() {
        return Err(incompatible(ChoFlag::Rptr2));
    }
    if has(cho::NA) && !lfo.is_ramp() {
        return Err(incompatible(ChoFlag::Na));
    }

    if !lfo.is_ramp() {
        let osc = &state.lfo.sin[lfo.unit()];
        let wave = match (has(cho::COS), has(cho::REG)) {
            (false, false) => osc.sine(),
            (true, false) => osc.cosine(),
            (false, true) => osc.latched_sine(),
            (true, true) => osc.latched_cosine(),
        };
        let mut value = wave * osc.normalized_amplitude();
        if has(cho::COMPA) {
            value = -value;
        }
        return Ok(LfoValue {
            value: checked(value, "sine"),
            offset_scale: SINE_OFFSET_SCALE,
            xfade: None,
        });
    }

    let osc = &state.lfo.rmp[lfo.unit()];
    let mut pos = if has(cho::REG) {
        osc.latched_value()
    } else {
        osc.value()
    };
    if has(cho::RPTR2) {
        pos = (pos + 0.25) % 0.5;
    }
    // `pos` is within [0, 0.5], the full ramp spans `range / 4096`
    let span = f64::from(osc.amplitude()) / RAMP_OFFSET_SCALE;
    let mut value = pos * 2.0 * span;
    if has(cho::COMPA) {
        value = span - value;
    }
    let xfade = has(cho::NA).then(|| checked(1.0 - (4.0 * pos - 1.0).abs(), "crossfade"));
    Ok(LfoValue {
        value: checked(value, "ramp"),
        offset_scale: RAMP_OFFSET_SCALE,
        xfade,
    })
}

pub(super) fn execute(op: &Operation, state: &mut MachineState) -> Result<(), EngineError> {
    let lfo = fetch(op, state)?;
    let complement = op.bits(Role::Flags) & cho::COMPC != 0;
    let coefficient = match lfo.xfade {
        Some(xfade) if complement => 1.0 - xfade,
        Some(xfade) => xfade,
        None if complement => compc(lfo.value),
        None => lfo.value,
    };
    match op.mnemonic {
        Mnemonic::ChoRda => {
            // CHO RDA - read delay memory at a modulated address
            let (offset, scale) = match lfo.xfade {
                Some(_) => (0, coefficient),
                None => {
                    let position = lfo.value * lfo.offset_scale;
                    let whole = position.floor();
                    let frac = position - whole;
                    (whole as i32, if complement { 1.0 - frac } else { frac })
                }
            };
            let base = op.bits(Role::Addr) as i32;
            state.lr = state.read_delay(base + offset);
            latch_acc(state);
            let mut t = state.lr;
            t.mult(Fixed::from_float(scale));
            state.acc.add(t);
        }
        Mnemonic::ChoSof => {
            // CHO SOF - scale ACC by the LFO and offset
            let d = Fixed::from_q(op.bits(Role::Addr), QFormat::S_15);
            latch_acc(state);
            state.acc.mult(Fixed::from_float(coefficient)).add(d);
        }
        Mnemonic::ChoRdal => {
            // CHO RDAL - load the LFO into ACC
            latch_acc(state);
            state.acc = state.value(Fixed::ZERO);
            state.acc.add(Fixed::from_float(coefficient));
        }
        _ => return Err(EngineError::UnknownInstruction { ip: state.ip }),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complement_keeps_the_sign() {
        assert_eq!(compc(0.25), 0.75);
        assert_eq!(compc(-0.25), -0.75);
        assert_eq!(compc(0.0), 1.0);
    }

    #[test]
    fn values_in_range_pass() {
        assert_eq!(checked(1.0, "test"), 1.0);
        assert_eq!(checked(-1.0, "test"), -1.0);
    }

    #[test]
    #[should_panic]
    #[cfg(debug_assertions)]
    fn values_out_of_range_assert() {
        checked(1.5, "test");
    }
}
