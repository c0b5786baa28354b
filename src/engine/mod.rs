//! Instruction execution
//!
//! The program is run from its first instruction once per sample. Every
//! instruction except SKP advances the instruction pointer by one; the
//! sample ends when it leaves the program.
//!
//! Instructions that change the accumulator first copy it to PACC, OR
//! being the single exception. Data faults (clamping, delay memory
//! addresses out of bounds, invalid LFO parameters) are counted in the
//! machine's [`Diagnostics`](crate::diagnostics::Diagnostics) and never
//! stop a sample. Only CHO flag combinations the oscillator cannot
//! provide, reserved encodings and runaway samples are errors.
//!
//! # Literature
//!
//! - FV-1 datasheet, "Instruction set"
//! - SpinASM user manual, instruction reference

mod cho;

pub use cho::ChoFlag;

use crate::config::EngineConfig;
use crate::fixed::{Fixed, MAX_24, MIN_24};
use crate::instr::{skp, Mnemonic, Operation, Role};
use crate::lfo::LfoSelect;
use crate::registers::{addr, config_shift, lfo_param, lfo_register, LfoParam};
use crate::state::MachineState;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("instruction {ip}: {flag} cannot be used with {lfo}")]
    IncompatibleFlag {
        ip: usize,
        flag: ChoFlag,
        lfo: LfoSelect,
    },
    #[error("instruction {ip} uses a reserved encoding")]
    UnknownInstruction { ip: usize },
    #[error("sample did not finish within {limit} instructions")]
    InstructionLimit { limit: usize },
    #[error("instruction pointer {ip} is outside the program")]
    ProgramCounterOutOfRange { ip: usize },
}

/// Outcome of a single [`Engine::step`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    /// The program was left and the end-of-sample bookkeeping is done
    SampleDone,
}

#[derive(Debug, Clone)]
pub struct Engine {
    max_steps_per_sample: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            max_steps_per_sample: config.max_steps_per_sample,
        }
    }

    /// Execute the instruction at `state.ip`
    pub fn step(&self, program: &[Operation], state: &mut MachineState) -> Result<Step, EngineError> {
        let op = match program.get(state.ip) {
            Some(op) => op,
            None if program.is_empty() => {
                state.end_sample();
                return Ok(Step::SampleDone);
            }
            None => return Err(EngineError::ProgramCounterOutOfRange { ip: state.ip }),
        };
        tracing::trace!(ip = state.ip, op = %op.mnemonic, acc = %state.acc, "execute");
        execute(op, state)?;
        if state.ip >= program.len() {
            state.end_sample();
            Ok(Step::SampleDone)
        } else {
            Ok(Step::Continue)
        }
    }

    /// Run the program once from its first instruction
    pub fn run_sample(
        &self,
        program: &[Operation],
        state: &mut MachineState,
    ) -> Result<(), EngineError> {
        state.ip = 0;
        for _ in 0..self.max_steps_per_sample {
            if self.step(program, state)? == Step::SampleDone {
                return Ok(());
            }
        }
        Err(EngineError::InstructionLimit {
            limit: self.max_steps_per_sample,
        })
    }

    /// Process one input frame: load the converters, advance the
    /// oscillators, run the program and return the outputs
    pub fn process(
        &self,
        program: &[Operation],
        state: &mut MachineState,
        adcl: Fixed,
        adcr: Fixed,
    ) -> Result<(Fixed, Fixed), EngineError> {
        state.set_inputs(adcl, adcr);
        state.advance_lfos();
        self.run_sample(program, state)?;
        Ok(state.outputs())
    }
}

/// Copy ACC to PACC, returning the PACC it replaces
fn latch_acc(state: &mut MachineState) -> Fixed {
    core::mem::replace(&mut state.pacc, state.acc)
}

fn register(op: &Operation) -> u8 {
    op.bits(Role::Reg) as u8
}

fn execute(op: &Operation, state: &mut MachineState) -> Result<(), EngineError> {
    let mut next_ip = state.ip + 1;
    let c = op.real(Role::C);
    match op.mnemonic {
        Mnemonic::Rda => {
            // RDA - read delay memory, scale and accumulate
            state.lr = state.read_delay(op.bits(Role::Addr) as i32);
            latch_acc(state);
            let mut t = state.lr;
            t.mult(c);
            state.acc.add(t);
        }
        Mnemonic::Rmpa => {
            // RMPA - read delay memory at ADDR_PTR, scale and accumulate
            let offset = state.regs.read(addr::ADDR_PTR).raw() >> 8;
            state.lr = state.read_delay(offset);
            latch_acc(state);
            let mut t = state.lr;
            t.mult(c);
            state.acc.add(t);
        }
        Mnemonic::Wra => {
            // WRA - write delay memory, scale ACC
            state.write_delay(op.bits(Role::Addr) as i32, state.acc);
            latch_acc(state);
            state.acc.mult(c);
        }
        Mnemonic::Wrap => {
            // WRAP - write delay memory, scale ACC and add LR
            state.write_delay(op.bits(Role::Addr) as i32, state.acc);
            latch_acc(state);
            let lr = state.lr;
            state.acc.mult(c).add(lr);
        }
        Mnemonic::Rdax => {
            // RDAX - scale a register and accumulate
            let mut t = state.value(state.regs.read(register(op)));
            t.mult(c);
            latch_acc(state);
            state.acc.add(t);
        }
        Mnemonic::Rdfx => {
            // RDFX - filter ACC towards a register
            let reg = state.regs.read(register(op));
            latch_acc(state);
            state.acc.sub(reg).mult(c).add(reg);
        }
        Mnemonic::Ldax => {
            // LDAX - load a register into ACC
            let reg = state.regs.read(register(op));
            latch_acc(state);
            state.acc = state.value(reg);
        }
        Mnemonic::Wrax => {
            // WRAX - write ACC to a register, scale ACC
            write_register(state, register(op));
            latch_acc(state);
            state.acc.mult(c);
        }
        Mnemonic::Wrhx => {
            // WRHX - write ACC to a register, scale ACC and add PACC
            write_register(state, register(op));
            let prev = latch_acc(state);
            state.acc.mult(c).add(prev);
        }
        Mnemonic::Wrlx => {
            // WRLX - write ACC to a register, scale the difference to PACC
            write_register(state, register(op));
            let prev = latch_acc(state);
            let mut t = state.value(prev);
            t.sub(state.acc);
            state.diagnostics.pacc_overflows += u64::from(t.take_clamps());
            t.mult(c).add(prev);
            state.acc = t;
        }
        Mnemonic::Maxx => {
            // MAXX - larger magnitude of ACC and a scaled register
            let mut t = state.value(state.regs.read(register(op)));
            t.mult(c).abs();
            state.diagnostics.acc_overflows += u64::from(t.take_clamps());
            latch_acc(state);
            state.acc.abs();
            state.commit_acc();
            state.acc = state.value(state.acc.max(t));
        }
        Mnemonic::Absa => {
            // ABSA - absolute value of ACC
            latch_acc(state);
            state.acc.abs();
        }
        Mnemonic::Mulx => {
            // MULX - multiply ACC with a register
            let reg = state.regs.read(register(op));
            latch_acc(state);
            state.acc.mult(reg);
        }
        Mnemonic::Log => {
            // LOG - base 2 logarithm of |ACC| divided by 16, scale and offset
            let magnitude = state.acc.to_float().abs();
            let log = if magnitude > 0.0 {
                magnitude.log2().max(-16.0)
            } else {
                -16.0
            };
            scale_offset(state, Fixed::from_float(log / 16.0), c, op.real(Role::D));
        }
        Mnemonic::Exp => {
            // EXP - 2 to the power of 16 * ACC, scale and offset
            let exp = if state.acc.is_negative() {
                Fixed::from_float((state.acc.to_float() * 16.0).exp2())
            } else {
                Fixed::from_raw(MAX_24)
            };
            scale_offset(state, exp, c, op.real(Role::D));
        }
        Mnemonic::Sof => {
            // SOF - scale and offset ACC
            let acc = state.acc;
            scale_offset(state, acc, c, op.real(Role::D));
        }
        Mnemonic::And | Mnemonic::Clr => {
            // AND - mask ACC; CLR - clear ACC
            latch_acc(state);
            state.acc.and(op.bits(Role::Mask));
        }
        Mnemonic::Or => {
            // OR - set bits of ACC, keeps PACC
            state.acc.or(op.bits(Role::Mask));
        }
        Mnemonic::Xor => {
            // XOR - toggle bits of ACC
            latch_acc(state);
            state.acc.xor(op.bits(Role::Mask));
        }
        Mnemonic::Not => {
            // NOT - invert ACC
            latch_acc(state);
            state.acc.not();
        }
        Mnemonic::Skp => {
            // SKP - skip N instructions if any condition holds
            if skip_condition(state, op.bits(Role::Flags)) {
                next_ip += op.bits(Role::N) as usize;
            }
        }
        Mnemonic::Nop => {
            // NOP - no operation
        }
        Mnemonic::Wlds => {
            // WLDS - load sine LFO
            let lfo = LfoSelect::from_bits(op.bits(Role::Lfo));
            let osc = &mut state.lfo.sin[lfo.unit()];
            let invalid = osc.set_rate(op.bits(Role::Freq) as i32)
                | osc.set_amplitude(op.bits(Role::Amp) as i32);
            let (rate, amplitude) = (osc.rate(), osc.amplitude());
            store_lfo_config(state, lfo, rate, amplitude, invalid);
        }
        Mnemonic::Wldr => {
            // WLDR - load ramp LFO
            let lfo = LfoSelect::from_bits(2 | op.bits(Role::Lfo));
            let osc = &mut state.lfo.rmp[lfo.unit()];
            let invalid = op
                .arg(Role::Freq)
                .map_or(false, |freq| osc.set_rate(freq.signed()));
            osc.set_amplitude_index(op.bits(Role::Amp));
            let (rate, amplitude) = (osc.rate(), osc.amplitude());
            store_lfo_config(state, lfo, rate, amplitude, invalid);
        }
        Mnemonic::Jam => {
            // JAM - restart a ramp LFO
            let lfo = LfoSelect::from_bits(2 | op.bits(Role::Lfo));
            state.lfo.rmp[lfo.unit()].reset();
        }
        Mnemonic::ChoRda | Mnemonic::ChoSof | Mnemonic::ChoRdal => {
            // CHO - LFO modulated read, scale or load
            cho::execute(op, state)?;
        }
        Mnemonic::ChoUnknown => {
            return Err(EngineError::UnknownInstruction { ip: state.ip });
        }
    }
    state.commit_acc();
    state.ip = next_ip;
    Ok(())
}

/// `ACC := value * c + d`
fn scale_offset(state: &mut MachineState, value: Fixed, c: Fixed, d: Fixed) {
    latch_acc(state);
    let mut t = state.value(value);
    t.mult(c).add(d);
    state.acc = t;
}

fn skip_condition(state: &MachineState, flags: u32) -> bool {
    let (acc, pacc) = (state.acc.raw(), state.pacc.raw());
    (flags & skp::RUN != 0 && !state.run_flag)
        || (flags & skp::ZRC != 0 && acc.signum() != pacc.signum())
        || (flags & skp::ZRO != 0 && acc == 0)
        || (flags & skp::GEZ != 0 && acc >= 0)
        || (flags & skp::NEG != 0 && acc < 0)
}

/// Store ACC into a register, with the side effects of its address
fn write_register(state: &mut MachineState, reg: u8) {
    let acc = state.acc;
    if let Some((lfo, param)) = lfo_param(reg) {
        program_lfo(state, lfo, param, acc.raw() >> config_shift(lfo, param));
        return;
    }
    let rail = acc.raw() >= MAX_24 || acc.raw() <= MIN_24;
    match reg {
        addr::DACL if rail => state.diagnostics.dacl_overflows += 1,
        addr::DACR if rail => state.diagnostics.dacr_overflows += 1,
        _ => (),
    }
    state.regs.write(reg, acc);
}

fn program_lfo(state: &mut MachineState, lfo: LfoSelect, param: LfoParam, raw: i32) {
    let lfos = &mut state.lfo;
    let (invalid, stored) = match (lfo.is_ramp(), param) {
        (false, LfoParam::Rate) => {
            let osc = &mut lfos.sin[lfo.unit()];
            (osc.set_rate(raw), osc.rate())
        }
        (false, LfoParam::Range) => {
            let osc = &mut lfos.sin[lfo.unit()];
            (osc.set_amplitude(raw), osc.amplitude())
        }
        (true, LfoParam::Rate) => {
            let osc = &mut lfos.rmp[lfo.unit()];
            (osc.set_rate(raw), osc.rate())
        }
        (true, LfoParam::Range) => {
            let osc = &mut lfos.rmp[lfo.unit()];
            (osc.set_amplitude(raw), osc.amplitude())
        }
    };
    if invalid {
        tracing::warn!(%lfo, ?param, raw, stored, "LFO parameter clamped");
        state.diagnostics.flag_invalid_lfo(lfo);
    }
    state.regs.set_config(lfo_register(lfo, param), stored);
}

fn store_lfo_config(
    state: &mut MachineState,
    lfo: LfoSelect,
    rate: i32,
    amplitude: i32,
    invalid: bool,
) {
    if invalid {
        tracing::warn!(%lfo, rate, amplitude, "LFO parameter clamped");
        state.diagnostics.flag_invalid_lfo(lfo);
    }
    state.regs.set_config(lfo_register(lfo, LfoParam::Rate), rate);
    state
        .regs
        .set_config(lfo_register(lfo, LfoParam::Range), amplitude);
}
