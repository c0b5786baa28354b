//! The chip's mutable state
//!
//! One [`MachineState`] lives for as long as a program is loaded. The
//! engine mutates it instruction by instruction; the host driver only
//! touches the input registers, the oscillators and the diagnostics
//! between samples.

use crate::config::EngineConfig;
use crate::diagnostics::Diagnostics;
use crate::fixed::{Fixed, QFormat};
use crate::lfo::Lfos;
use crate::registers::{addr, RegisterFile};
use save_state::{InSaveState, OutOfData, SaveStateDeserializer, SaveStateSerializer};
use save_state_macro::InSaveState;
use thiserror::Error;

const SNAPSHOT_MAGIC: &[u8; 4] = b"FV1S";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SnapshotError {
    #[error("not a machine state snapshot")]
    BadMagic,
    #[error(transparent)]
    Truncated(#[from] OutOfData),
    #[error("snapshot has {remaining} bytes of trailing data")]
    TrailingData { remaining: usize },
    #[error("snapshot delay memory holds {found} samples, expected {expected}")]
    DelaySizeMismatch { expected: usize, found: usize },
}

/// Which side of a delay memory access an address is computed for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
}

#[derive(Debug, Clone, InSaveState)]
pub struct MachineState {
    /// Index of the next instruction
    pub ip: usize,
    pub acc: Fixed,
    pub pacc: Fixed,
    /// Last value read from delay memory
    pub lr: Fixed,
    pub regs: RegisterFile,
    /// Sign-extended 24-bit samples
    pub delay: Vec<i32>,
    pub delay_ptr: usize,
    /// Set until the first pass over the program completes
    pub run_flag: bool,
    pub lfo: Lfos,
    pub diagnostics: Diagnostics,
    /// Engine setting, a restored snapshot keeps the current one
    #[transient]
    saturate: bool,
}

impl Default for MachineState {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl MachineState {
    pub fn new(config: &EngineConfig) -> Self {
        let mut slf = Self {
            ip: 0,
            acc: Fixed::ZERO,
            pacc: Fixed::ZERO,
            lr: Fixed::ZERO,
            regs: RegisterFile::new(),
            delay: vec![0; config.delay_size.max(1)],
            delay_ptr: 0,
            run_flag: true,
            lfo: Lfos::new(),
            diagnostics: Diagnostics::new(),
            saturate: config.saturate,
        };
        slf.acc = slf.value(Fixed::ZERO);
        slf.pacc = slf.acc;
        slf
    }

    /// Return to the power-on state, keeping the delay length
    pub fn reset(&mut self) {
        let saturate = self.saturate;
        let size = self.delay.len();
        *self = Self {
            delay: vec![0; size],
            ..Self::new(&EngineConfig {
                delay_size: 1,
                saturate,
                ..EngineConfig::default()
            })
        };
    }

    pub fn is_saturating(&self) -> bool {
        self.saturate
    }

    /// `v` with this machine's saturation mode, used for every
    /// intermediate value of the engine
    pub fn value(&self, mut v: Fixed) -> Fixed {
        v.set_saturating(self.saturate);
        v
    }

    /// Move the accumulator's clamp events into the diagnostics
    pub fn commit_acc(&mut self) {
        self.diagnostics.acc_overflows += u64::from(self.acc.take_clamps());
    }

    /// Physical index of the delay memory word `offset` samples behind
    /// the delay pointer
    ///
    /// Offsets outside the delay length are clamped into it and counted.
    pub fn delay_index(&mut self, offset: i32, access: Access) -> usize {
        let size = self.delay.len();
        let in_range = usize::try_from(offset).map_or(false, |o| o < size);
        let offset = if in_range {
            offset as usize
        } else {
            match access {
                Access::Read => self.diagnostics.read_out_of_bounds += 1,
                Access::Write => self.diagnostics.write_out_of_bounds += 1,
            }
            tracing::debug!(offset, size, ?access, ip = self.ip, "delay access out of bounds");
            offset.clamp(0, size as i32 - 1) as usize
        };
        (offset + self.delay_ptr) % size
    }

    pub fn read_delay(&mut self, offset: i32) -> Fixed {
        let idx = self.delay_index(offset, Access::Read);
        self.value(Fixed::from_raw(self.delay[idx]).with_format(QFormat::S_23))
    }

    /// Store `v` as a 24-bit sample, counting values that do not fit
    pub fn write_delay(&mut self, offset: i32, v: Fixed) {
        let idx = self.delay_index(offset, Access::Write);
        let (sample, overflow) = v.to_sample();
        if overflow {
            self.diagnostics.sample_overflows += 1;
        }
        self.delay[idx] = sample;
    }

    /// Bookkeeping after the last instruction of a sample
    pub fn end_sample(&mut self) {
        self.run_flag = false;
        self.ip = 0;
        self.delay_ptr = match self.delay_ptr {
            0 => self.delay.len() - 1,
            ptr => ptr - 1,
        };
    }

    pub fn set_inputs(&mut self, adcl: Fixed, adcr: Fixed) {
        self.regs.write(addr::ADCL, adcl.with_format(QFormat::S_23));
        self.regs.write(addr::ADCR, adcr.with_format(QFormat::S_23));
    }

    /// Set potentiometer `pot` (0 to 2), other indices are ignored
    pub fn set_pot(&mut self, pot: usize, value: Fixed) {
        match [addr::POT0, addr::POT1, addr::POT2].get(pot) {
            Some(&reg) => self.regs.write(reg, value.with_format(QFormat::S_23)),
            None => tracing::warn!(pot, "no such potentiometer"),
        }
    }

    /// The left and right output registers
    pub fn outputs(&self) -> (Fixed, Fixed) {
        (self.regs.read(addr::DACL), self.regs.read(addr::DACR))
    }

    /// Advance every oscillator by one sample
    pub fn advance_lfos(&mut self) {
        self.lfo.advance()
    }

    pub fn snapshot(&self) -> Vec<u8> {
        let mut state = SaveStateSerializer::new();
        state.data.extend_from_slice(SNAPSHOT_MAGIC);
        self.serialize(&mut state);
        state.data
    }

    /// Restore a [`snapshot`](Self::snapshot), leaving `self` untouched on
    /// failure
    pub fn restore(&mut self, data: &[u8]) -> Result<(), SnapshotError> {
        let body = data
            .strip_prefix(&SNAPSHOT_MAGIC[..])
            .ok_or(SnapshotError::BadMagic)?;
        let mut state = SaveStateDeserializer::new(body);
        let mut restored = self.clone();
        restored.deserialize(&mut state)?;
        if state.remaining() > 0 {
            return Err(SnapshotError::TrailingData {
                remaining: state.remaining(),
            });
        }
        if restored.delay.len() != self.delay.len() {
            return Err(SnapshotError::DelaySizeMismatch {
                expected: self.delay.len(),
                found: restored.delay.len(),
            });
        }
        restored.acc = restored.value(restored.acc);
        restored.pacc = restored.value(restored.pacc);
        *self = restored;
        Ok(())
    }
}
