//! Fault counters
//!
//! The engine never aborts a sample for a data fault. It saturates or
//! clamps, then counts the event here. Counters only grow; the host
//! resets them explicitly.

use crate::lfo::LfoSelect;
use save_state_macro::{DefaultByNew, InSaveState};

#[derive(Debug, Clone, PartialEq, Eq, InSaveState, DefaultByNew)]
pub struct Diagnostics {
    /// Delay memory reads whose offset was outside the delay length
    pub read_out_of_bounds: u64,
    /// Delay memory writes whose offset was outside the delay length
    pub write_out_of_bounds: u64,
    /// Saturation events while computing the accumulator
    pub acc_overflows: u64,
    /// Saturation events in differences against the previous accumulator
    pub pacc_overflows: u64,
    /// Clipped values written to DACL
    pub dacl_overflows: u64,
    /// Clipped values written to DACR
    pub dacr_overflows: u64,
    /// Delay memory writes of a value that does not fit 24 bits
    pub sample_overflows: u64,
    /// Clamped LFO parameters, any oscillator
    pub invalid_lfo_params: u64,
    /// Set when the oscillator's parameters were ever clamped
    pub invalid_lfo: [bool; 4],
}

impl Diagnostics {
    pub const fn new() -> Self {
        Self {
            read_out_of_bounds: 0,
            write_out_of_bounds: 0,
            acc_overflows: 0,
            pacc_overflows: 0,
            dacl_overflows: 0,
            dacr_overflows: 0,
            sample_overflows: 0,
            invalid_lfo_params: 0,
            invalid_lfo: [false; 4],
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new()
    }

    pub fn flag_invalid_lfo(&mut self, lfo: LfoSelect) {
        self.invalid_lfo_params += 1;
        self.invalid_lfo[lfo.index()] = true;
    }

    pub fn out_of_bounds(&self) -> u64 {
        self.read_out_of_bounds + self.write_out_of_bounds
    }

    pub fn overflows(&self) -> u64 {
        self.acc_overflows
            + self.pacc_overflows
            + self.dacl_overflows
            + self.dacr_overflows
            + self.sample_overflows
    }

    pub fn is_clean(&self) -> bool {
        *self == Self::new()
    }
}

impl std::fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "oob r/w {}/{}, overflow acc {} pacc {} dac {}/{} mem {}, lfo params {}",
            self.read_out_of_bounds,
            self.write_out_of_bounds,
            self.acc_overflows,
            self.pacc_overflows,
            self.dacl_overflows,
            self.dacr_overflows,
            self.sample_overflows,
            self.invalid_lfo_params,
        )
    }
}
