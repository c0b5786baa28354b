//! The 64-entry register file
//!
//! The lowest eight addresses configure the LFOs and hold plain integers;
//! everything else holds fixed-point audio values. The split is fixed by
//! the address map, so every slot is created with its final kind and a
//! write never changes it.

use crate::fixed::{Fixed, QFormat};
use crate::lfo::LfoSelect;
use save_state::{InSaveState, OutOfData, SaveStateDeserializer, SaveStateSerializer};
use save_state_macro::{DefaultByNew, InSaveState};

pub const REGISTER_COUNT: usize = 64;

pub mod addr {
    pub const SIN0_RATE: u8 = 0x00;
    pub const SIN0_RANGE: u8 = 0x01;
    pub const SIN1_RATE: u8 = 0x02;
    pub const SIN1_RANGE: u8 = 0x03;
    pub const RMP0_RATE: u8 = 0x04;
    pub const RMP0_RANGE: u8 = 0x05;
    pub const RMP1_RATE: u8 = 0x06;
    pub const RMP1_RANGE: u8 = 0x07;
    pub const POT0: u8 = 0x10;
    pub const POT1: u8 = 0x11;
    pub const POT2: u8 = 0x12;
    pub const ADCL: u8 = 0x14;
    pub const ADCR: u8 = 0x15;
    pub const DACL: u8 = 0x16;
    pub const DACR: u8 = 0x17;
    /// Indirect delay address used by RMPA
    pub const ADDR_PTR: u8 = 0x18;
    pub const REG0: u8 = 0x20;
    pub const REG31: u8 = 0x3f;
}

/// What an LFO configuration register controls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoParam {
    Rate,
    Range,
}

/// Decode a configuration register address
pub const fn lfo_param(address: u8) -> Option<(LfoSelect, LfoParam)> {
    if address > addr::RMP1_RANGE {
        return None;
    }
    let param = if address & 1 == 0 {
        LfoParam::Rate
    } else {
        LfoParam::Range
    };
    Some((LfoSelect::from_bits((address >> 1) as u32), param))
}

/// The register address holding `param` of `lfo`
pub const fn lfo_register(lfo: LfoSelect, param: LfoParam) -> u8 {
    (lfo.index() as u8) << 1 | matches!(param, LfoParam::Range) as u8
}

/// Bit position of a configuration value inside a 24-bit accumulator
///
/// Writing the accumulator to a configuration register keeps the bits
/// from this position upwards: 9-bit sine rates come from the top of the
/// word, the 15- and 16-bit fields start at bit 8.
pub const fn config_shift(lfo: LfoSelect, param: LfoParam) -> u32 {
    match (lfo, param) {
        (LfoSelect::Sin0 | LfoSelect::Sin1, LfoParam::Rate) => 14,
        _ => 8,
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Register {
    /// LFO configuration value in the oscillator's own units
    Config(i32),
    Audio(Fixed),
}

impl Default for Register {
    fn default() -> Self {
        Self::Audio(Fixed::ZERO)
    }
}

impl InSaveState for Register {
    fn serialize(&self, state: &mut SaveStateSerializer) {
        match self {
            Self::Config(v) => {
                0u8.serialize(state);
                v.serialize(state)
            }
            Self::Audio(v) => {
                1u8.serialize(state);
                v.serialize(state)
            }
        }
    }

    fn deserialize(&mut self, state: &mut SaveStateDeserializer) -> Result<(), OutOfData> {
        let mut tag: u8 = 0;
        tag.deserialize(state)?;
        *self = if tag == 0 {
            let mut v: i32 = 0;
            v.deserialize(state)?;
            Self::Config(v)
        } else {
            let mut v = Fixed::ZERO;
            v.deserialize(state)?;
            Self::Audio(v)
        };
        Ok(())
    }
}

#[derive(Debug, Clone, InSaveState, DefaultByNew)]
pub struct RegisterFile {
    slots: [Register; REGISTER_COUNT],
}

impl RegisterFile {
    pub fn new() -> Self {
        let mut slots = [Register::default(); REGISTER_COUNT];
        for (i, slot) in slots.iter_mut().enumerate() {
            if lfo_param(i as u8).is_some() {
                *slot = Register::Config(0);
            }
        }
        Self { slots }
    }

    pub fn slot(&self, address: u8) -> &Register {
        &self.slots[usize::from(address) % REGISTER_COUNT]
    }

    /// Read a register as a fixed-point value
    ///
    /// Configuration registers are shifted back into the accumulator bit
    /// position they are written from.
    pub fn read(&self, address: u8) -> Fixed {
        match *self.slot(address) {
            Register::Audio(v) => v,
            Register::Config(v) => match lfo_param(address) {
                Some((lfo, param)) => Fixed::from_raw(v << config_shift(lfo, param))
                    .with_format(QFormat::S_23),
                None => Fixed::ZERO,
            },
        }
    }

    /// Store an audio value, ignored for configuration registers
    pub fn write(&mut self, address: u8, value: Fixed) {
        if let Register::Audio(v) = &mut self.slots[usize::from(address) % REGISTER_COUNT] {
            *v = value
        }
    }

    /// Store an LFO parameter, ignored for audio registers
    pub fn set_config(&mut self, address: u8, value: i32) {
        if let Register::Config(v) = &mut self.slots[usize::from(address) % REGISTER_COUNT] {
            *v = value
        }
    }

    pub fn config(&self, address: u8) -> Option<i32> {
        match *self.slot(address) {
            Register::Config(v) => Some(v),
            Register::Audio(_) => None,
        }
    }
}
