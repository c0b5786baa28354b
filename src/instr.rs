//! Instruction decoding
//!
//! Every instruction is one 32-bit word. The low five bits select the
//! opcode, the remaining bits are sliced into arguments from bit 5
//! upwards in the order of the opcode's template. A few mnemonics are
//! aliases of another opcode with particular argument values; those are
//! resolved here so execution can dispatch on [`Mnemonic`] alone.
//!
//! # Literature
//!
//! - FV-1 datasheet, "Instruction set" (bit layouts)
//! - SpinASM user manual (alias mnemonics)

use crate::fixed::{bit_mask, sign_extend, Fixed, QFormat};
use thiserror::Error;

/// Program memory size of the chip
pub const MAX_PROGRAM_LEN: usize = 128;

pub mod opcode {
    pub const RDA: u8 = 0x00;
    pub const RMPA: u8 = 0x01;
    pub const WRA: u8 = 0x02;
    pub const WRAP: u8 = 0x03;
    pub const RDAX: u8 = 0x04;
    pub const RDFX: u8 = 0x05;
    pub const WRAX: u8 = 0x06;
    pub const WRHX: u8 = 0x07;
    pub const WRLX: u8 = 0x08;
    pub const MAXX: u8 = 0x09;
    pub const MULX: u8 = 0x0a;
    pub const LOG: u8 = 0x0b;
    pub const EXP: u8 = 0x0c;
    pub const SOF: u8 = 0x0d;
    pub const AND: u8 = 0x0e;
    pub const OR: u8 = 0x0f;
    pub const XOR: u8 = 0x10;
    pub const SKP: u8 = 0x11;
    /// WLDS or WLDR, told apart by the two highest bits
    pub const WLD: u8 = 0x12;
    pub const JAM: u8 = 0x13;
    pub const CHO: u8 = 0x14;
}

/// SKP condition bits
pub mod skp {
    pub const NEG: u32 = 0x01;
    pub const GEZ: u32 = 0x02;
    pub const ZRO: u32 = 0x04;
    pub const ZRC: u32 = 0x08;
    pub const RUN: u32 = 0x10;
}

/// CHO flag bits
pub mod cho {
    pub const SIN: u32 = 0x00;
    pub const COS: u32 = 0x01;
    pub const REG: u32 = 0x02;
    pub const COMPC: u32 = 0x04;
    pub const COMPA: u32 = 0x08;
    pub const RPTR2: u32 = 0x10;
    pub const NA: u32 = 0x20;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mnemonic {
    Rda,
    Rmpa,
    Wra,
    Wrap,
    Rdax,
    Rdfx,
    /// RDFX with register and coefficient zero
    Ldax,
    Wrax,
    Wrhx,
    Wrlx,
    Maxx,
    /// MAXX with register and coefficient zero
    Absa,
    Mulx,
    Log,
    Exp,
    Sof,
    And,
    /// AND with a zero mask
    Clr,
    Or,
    Xor,
    /// XOR with all 24 bits set
    Not,
    Skp,
    /// SKP without conditions and offset
    Nop,
    Wlds,
    Wldr,
    Jam,
    ChoRda,
    ChoSof,
    ChoRdal,
    /// CHO with the reserved sub-command `01`
    ChoUnknown,
}

impl Mnemonic {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Rda => "RDA",
            Self::Rmpa => "RMPA",
            Self::Wra => "WRA",
            Self::Wrap => "WRAP",
            Self::Rdax => "RDAX",
            Self::Rdfx => "RDFX",
            Self::Ldax => "LDAX",
            Self::Wrax => "WRAX",
            Self::Wrhx => "WRHX",
            Self::Wrlx => "WRLX",
            Self::Maxx => "MAXX",
            Self::Absa => "ABSA",
            Self::Mulx => "MULX",
            Self::Log => "LOG",
            Self::Exp => "EXP",
            Self::Sof => "SOF",
            Self::And => "AND",
            Self::Clr => "CLR",
            Self::Or => "OR",
            Self::Xor => "XOR",
            Self::Not => "NOT",
            Self::Skp => "SKP",
            Self::Nop => "NOP",
            Self::Wlds => "WLDS",
            Self::Wldr => "WLDR",
            Self::Jam => "JAM",
            Self::ChoRda => "CHO RDA",
            Self::ChoSof => "CHO SOF",
            Self::ChoRdal => "CHO RDAL",
            Self::ChoUnknown => "CHO ???",
        }
    }

    /// The mnemonic the opcode decodes to before aliasing
    pub const fn canonical(&self) -> Self {
        match self {
            Self::Ldax => Self::Rdfx,
            Self::Absa => Self::Maxx,
            Self::Clr => Self::And,
            Self::Not => Self::Xor,
            Self::Nop => Self::Skp,
            other => *other,
        }
    }
}

impl std::fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// The meaning of an argument's bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Unsigned,
    /// Signed fixed-point in the given format
    Real(QFormat),
    RawBinary,
    Flags,
    /// Fixed bits that select the instruction
    Constant(u32),
    /// Bits without meaning, always decoded as zero
    Ignored,
}

/// What an argument is used for by the instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Delay memory address or offset
    Addr,
    /// Register file address
    Reg,
    /// Multiplier
    C,
    /// Additive offset
    D,
    Mask,
    Flags,
    /// Number of instructions to skip
    N,
    Freq,
    Amp,
    Lfo,
    Sub,
    Fixed,
    Unused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub role: Role,
    pub width: u8,
    pub kind: ArgKind,
}

const fn arg(role: Role, width: u8, kind: ArgKind) -> ArgSpec {
    ArgSpec { role, width, kind }
}

const fn ignored(width: u8) -> ArgSpec {
    arg(Role::Unused, width, ArgKind::Ignored)
}

use ArgKind::*;

static DELAY_ARGS: [ArgSpec; 2] = [
    arg(Role::Addr, 16, Unsigned),
    arg(Role::C, 11, Real(QFormat::S1_9)),
];
static RMPA_ARGS: [ArgSpec; 2] = [ignored(16), arg(Role::C, 11, Real(QFormat::S1_9))];
static REGISTER_ARGS: [ArgSpec; 3] = [
    arg(Role::Reg, 6, Unsigned),
    ignored(5),
    arg(Role::C, 16, Real(QFormat::S1_14)),
];
static MULX_ARGS: [ArgSpec; 2] = [arg(Role::Reg, 6, Unsigned), ignored(21)];
static LOG_EXP_ARGS: [ArgSpec; 2] = [
    arg(Role::D, 11, Real(QFormat::S4_6)),
    arg(Role::C, 16, Real(QFormat::S1_14)),
];
static SOF_ARGS: [ArgSpec; 2] = [
    arg(Role::D, 11, Real(QFormat::S_10)),
    arg(Role::C, 16, Real(QFormat::S1_14)),
];
static BITWISE_ARGS: [ArgSpec; 2] = [ignored(3), arg(Role::Mask, 24, RawBinary)];
static SKP_ARGS: [ArgSpec; 3] = [
    ignored(16),
    arg(Role::N, 6, Unsigned),
    arg(Role::Flags, 5, Flags),
];
static WLDS_ARGS: [ArgSpec; 4] = [
    arg(Role::Amp, 15, Unsigned),
    arg(Role::Freq, 9, Unsigned),
    arg(Role::Lfo, 1, Unsigned),
    arg(Role::Fixed, 2, Constant(0b00)),
];
static WLDR_ARGS: [ArgSpec; 5] = [
    arg(Role::Amp, 2, Unsigned),
    ignored(6),
    arg(Role::Freq, 16, Real(QFormat::S_15)),
    arg(Role::Lfo, 1, Unsigned),
    arg(Role::Fixed, 2, Constant(0b01)),
];
static JAM_ARGS: [ArgSpec; 4] = [
    ignored(1),
    arg(Role::Lfo, 1, Unsigned),
    arg(Role::Fixed, 1, Constant(1)),
    ignored(24),
];
static CHO_ARGS: [ArgSpec; 5] = [
    arg(Role::Addr, 16, RawBinary),
    arg(Role::Lfo, 2, Unsigned),
    ignored(1),
    arg(Role::Flags, 6, Flags),
    arg(Role::Sub, 2, Unsigned),
];

/// The argument template and base mnemonic of a word
fn template(word: u32) -> Option<(Mnemonic, &'static [ArgSpec])> {
    use opcode::*;
    Some(match (word & 0x1f) as u8 {
        RDA => (Mnemonic::Rda, &DELAY_ARGS[..]),
        RMPA => (Mnemonic::Rmpa, &RMPA_ARGS[..]),
        WRA => (Mnemonic::Wra, &DELAY_ARGS[..]),
        WRAP => (Mnemonic::Wrap, &DELAY_ARGS[..]),
        RDAX => (Mnemonic::Rdax, &REGISTER_ARGS[..]),
        RDFX => (Mnemonic::Rdfx, &REGISTER_ARGS[..]),
        WRAX => (Mnemonic::Wrax, &REGISTER_ARGS[..]),
        WRHX => (Mnemonic::Wrhx, &REGISTER_ARGS[..]),
        WRLX => (Mnemonic::Wrlx, &REGISTER_ARGS[..]),
        MAXX => (Mnemonic::Maxx, &REGISTER_ARGS[..]),
        MULX => (Mnemonic::Mulx, &MULX_ARGS[..]),
        LOG => (Mnemonic::Log, &LOG_EXP_ARGS[..]),
        EXP => (Mnemonic::Exp, &LOG_EXP_ARGS[..]),
        SOF => (Mnemonic::Sof, &SOF_ARGS[..]),
        AND => (Mnemonic::And, &BITWISE_ARGS[..]),
        OR => (Mnemonic::Or, &BITWISE_ARGS[..]),
        XOR => (Mnemonic::Xor, &BITWISE_ARGS[..]),
        SKP => (Mnemonic::Skp, &SKP_ARGS[..]),
        WLD if word >> 30 == 0 => (Mnemonic::Wlds, &WLDS_ARGS[..]),
        WLD => (Mnemonic::Wldr, &WLDR_ARGS[..]),
        JAM => (Mnemonic::Jam, &JAM_ARGS[..]),
        CHO => (Mnemonic::ChoRda, &CHO_ARGS[..]),
        _ => return None,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationArg {
    pub role: Role,
    pub width: u8,
    pub kind: ArgKind,
    /// The argument's bits, right-aligned
    pub raw: u32,
}

impl OperationArg {
    /// The argument as a fixed-point value, raw bits for non-real kinds
    pub fn real(&self) -> Fixed {
        match self.kind {
            ArgKind::Real(fmt) => Fixed::from_q(self.raw, fmt),
            _ => Fixed::from_raw(self.raw as i32),
        }
    }

    pub fn signed(&self) -> i32 {
        sign_extend(self.raw, u32::from(self.width))
    }
}

/// A decoded instruction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operation {
    pub mnemonic: Mnemonic,
    pub args: Vec<OperationArg>,
    /// The word this was decoded from
    pub raw: u32,
}

impl Operation {
    pub fn arg(&self, role: Role) -> Option<&OperationArg> {
        self.args.iter().find(|a| a.role == role)
    }

    /// Raw bits of the argument with `role`, zero if there is none
    pub fn bits(&self, role: Role) -> u32 {
        self.arg(role).map_or(0, |a| a.raw)
    }

    /// Fixed-point value of the argument with `role`, zero if there is none
    pub fn real(&self, role: Role) -> Fixed {
        self.arg(role).map_or(Fixed::ZERO, OperationArg::real)
    }

    /// Indicate if this ends a program image
    pub fn is_terminator(&self) -> bool {
        matches!(self.mnemonic, Mnemonic::Skp | Mnemonic::Nop) && self.bits(Role::N) == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("unknown opcode {:#04x} in word {word:#010x}", .word & 0x1f)]
    UnknownOpcode { word: u32 },
    #[error("word {word:#010x} has invalid selector bits for {mnemonic}")]
    BadConstant { word: u32, mnemonic: Mnemonic },
    #[error("instruction {index} ({word:#010x}) uses a reserved encoding")]
    UnknownInstruction { index: usize, word: u32 },
    #[error("program has more than {limit} instructions")]
    ProgramTooLong { limit: usize },
}

/// Decode a single instruction word
pub fn decode(word: u32) -> Result<Operation, DecodeError> {
    let (family, template) = template(word).ok_or(DecodeError::UnknownOpcode { word })?;
    let mut shift = 5u32;
    let mut args = Vec::with_capacity(template.len());
    for field in template {
        let bits = (word >> shift) & bit_mask(u32::from(field.width));
        shift += u32::from(field.width);
        let raw = match field.kind {
            ArgKind::Ignored => 0,
            ArgKind::Constant(expected) if bits != expected => {
                return Err(DecodeError::BadConstant {
                    word,
                    mnemonic: family,
                })
            }
            _ => bits,
        };
        args.push(OperationArg {
            role: field.role,
            width: field.width,
            kind: field.kind,
            raw,
        });
    }
    let mut op = Operation {
        mnemonic: family,
        args,
        raw: word,
    };
    op.mnemonic = alias(&op);
    Ok(op)
}

fn alias(op: &Operation) -> Mnemonic {
    let zero = |role| op.bits(role) == 0;
    match op.mnemonic {
        Mnemonic::And if zero(Role::Mask) => Mnemonic::Clr,
        Mnemonic::Xor if op.bits(Role::Mask) == bit_mask(24) => Mnemonic::Not,
        Mnemonic::Rdfx if zero(Role::Reg) && zero(Role::C) => Mnemonic::Ldax,
        Mnemonic::Maxx if zero(Role::Reg) && zero(Role::C) => Mnemonic::Absa,
        Mnemonic::Skp if zero(Role::N) && zero(Role::Flags) => Mnemonic::Nop,
        Mnemonic::ChoRda => match op.bits(Role::Sub) {
            0b00 => Mnemonic::ChoRda,
            0b10 => Mnemonic::ChoSof,
            0b11 => Mnemonic::ChoRdal,
            _ => Mnemonic::ChoUnknown,
        },
        other => other,
    }
}

/// Decode a program image of at most [`MAX_PROGRAM_LEN`] instructions
pub fn decode_program(words: &[u32]) -> Result<Vec<Operation>, DecodeError> {
    decode_program_with_limit(words, MAX_PROGRAM_LEN)
}

/// Decode a program, stopping before the first skip with a zero offset
///
/// Fails without returning anything if a word does not decode or if more
/// than `limit` instructions precede the end of the program.
pub fn decode_program_with_limit(
    words: &[u32],
    limit: usize,
) -> Result<Vec<Operation>, DecodeError> {
    let mut program = Vec::with_capacity(words.len().min(limit));
    for (index, &word) in words.iter().enumerate() {
        let op = decode(word)?;
        if op.is_terminator() {
            break;
        }
        if op.mnemonic == Mnemonic::ChoUnknown {
            return Err(DecodeError::UnknownInstruction { index, word });
        }
        if program.len() == limit {
            return Err(DecodeError::ProgramTooLong { limit });
        }
        program.push(op);
    }
    tracing::debug!(
        instructions = program.len(),
        words = words.len(),
        "decoded program"
    );
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Assemble a word from `(value, width)` fields starting at bit 5
    fn word(op: u8, fields: &[(u32, u32)]) -> u32 {
        let mut w = u32::from(op);
        let mut shift = 5;
        for &(value, width) in fields {
            w |= (value & bit_mask(width)) << shift;
            shift += width;
        }
        w
    }

    #[test]
    fn decode_sof() {
        // SOF 0.5, -0.5
        let w = word(opcode::SOF, &[(0x600, 11), (0x2000, 16)]);
        let op = decode(w).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Sof);
        assert_eq!(op.raw, w);
        assert_eq!(op.real(Role::C).to_float(), 0.5);
        assert_eq!(op.real(Role::D).to_float(), -0.5);
    }

    #[test]
    fn decode_rda() {
        let w = word(opcode::RDA, &[(1000, 16), (0x200, 11)]);
        let op = decode(w).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Rda);
        assert_eq!(op.bits(Role::Addr), 1000);
        assert_eq!(op.real(Role::C).to_float(), 1.0);
    }

    #[test]
    fn decode_is_deterministic() {
        for w in [0x0000_0011, 0x8000_0011u32, 0x4020_0005, 0xc000_0014, 0x1234_5678 & !0x1f] {
            assert_eq!(decode(w), decode(w));
        }
    }

    #[test]
    fn ignored_bits_decode_as_zero() {
        // RDAX REG0, 1.0 with garbage in the unused bits
        let w = word(opcode::RDAX, &[(0x20, 6), (0x1f, 5), (0x4000, 16)]);
        let op = decode(w).unwrap();
        assert!(op
            .args
            .iter()
            .filter(|a| a.kind == ArgKind::Ignored)
            .all(|a| a.raw == 0));
        assert_eq!(op.bits(Role::Reg), 0x20);
    }

    #[test]
    fn aliases_trigger_on_zero_arguments_only() {
        let clr = decode(word(opcode::AND, &[(0, 3), (0, 24)])).unwrap();
        assert_eq!(clr.mnemonic, Mnemonic::Clr);
        let and = decode(word(opcode::AND, &[(0, 3), (1, 24)])).unwrap();
        assert_eq!(and.mnemonic, Mnemonic::And);

        let not = decode(word(opcode::XOR, &[(0, 3), (0xff_ffff, 24)])).unwrap();
        assert_eq!(not.mnemonic, Mnemonic::Not);
        let xor = decode(word(opcode::XOR, &[(0, 3), (0xff_fffe, 24)])).unwrap();
        assert_eq!(xor.mnemonic, Mnemonic::Xor);

        let ldax = decode(word(opcode::RDFX, &[(0, 6), (0, 5), (0, 16)])).unwrap();
        assert_eq!(ldax.mnemonic, Mnemonic::Ldax);
        let rdfx = decode(word(opcode::RDFX, &[(0x20, 6), (0, 5), (0, 16)])).unwrap();
        assert_eq!(rdfx.mnemonic, Mnemonic::Rdfx);
        let rdfx = decode(word(opcode::RDFX, &[(0, 6), (0, 5), (1, 16)])).unwrap();
        assert_eq!(rdfx.mnemonic, Mnemonic::Rdfx);

        let absa = decode(word(opcode::MAXX, &[(0, 6), (0, 5), (0, 16)])).unwrap();
        assert_eq!(absa.mnemonic, Mnemonic::Absa);
        let maxx = decode(word(opcode::MAXX, &[(1, 6), (0, 5), (0, 16)])).unwrap();
        assert_eq!(maxx.mnemonic, Mnemonic::Maxx);

        assert_eq!(decode(0x0000_0011).unwrap().mnemonic, Mnemonic::Nop);
        let skp = decode(word(opcode::SKP, &[(0, 16), (0, 6), (skp::RUN, 5)])).unwrap();
        assert_eq!(skp.mnemonic, Mnemonic::Skp);
        let skp = decode(word(opcode::SKP, &[(0, 16), (3, 6), (0, 5)])).unwrap();
        assert_eq!(skp.mnemonic, Mnemonic::Skp);
        for m in [clr, not, ldax, absa] {
            assert_ne!(m.mnemonic.canonical(), m.mnemonic);
        }
    }

    #[test]
    fn wld_selects_layout_by_top_bits() {
        // WLDS SIN1, 100, 10
        let wlds = decode(word(opcode::WLD, &[(10, 15), (100, 9), (1, 1), (0, 2)])).unwrap();
        assert_eq!(wlds.mnemonic, Mnemonic::Wlds);
        assert_eq!(wlds.bits(Role::Amp), 10);
        assert_eq!(wlds.bits(Role::Freq), 100);
        assert_eq!(wlds.bits(Role::Lfo), 1);

        // WLDR RMP0, -16384, 1024
        let wldr = decode(word(opcode::WLD, &[(2, 2), (0, 6), (0xc000, 16), (0, 1), (1, 2)]))
            .unwrap();
        assert_eq!(wldr.mnemonic, Mnemonic::Wldr);
        assert_eq!(wldr.bits(Role::Amp), 2);
        assert_eq!(wldr.arg(Role::Freq).unwrap().signed(), -0x4000);

        assert_eq!(
            decode(0xc000_0012),
            Err(DecodeError::BadConstant {
                word: 0xc000_0012,
                mnemonic: Mnemonic::Wldr
            })
        );
    }

    #[test]
    fn decode_jam() {
        let op = decode(0x0000_00d3).unwrap();
        assert_eq!(op.mnemonic, Mnemonic::Jam);
        assert_eq!(op.bits(Role::Lfo), 1);
        assert!(decode(0x0000_0053).is_err());
    }

    #[test]
    fn cho_sub_commands() {
        let chorus = |sub| {
            decode(word(opcode::CHO, &[(0, 16), (2, 2), (0, 1), (cho::NA, 6), (sub, 2)]))
        };
        assert_eq!(chorus(0b00).unwrap().mnemonic, Mnemonic::ChoRda);
        assert_eq!(chorus(0b10).unwrap().mnemonic, Mnemonic::ChoSof);
        assert_eq!(chorus(0b11).unwrap().mnemonic, Mnemonic::ChoRdal);
        assert_eq!(chorus(0b01).unwrap().mnemonic, Mnemonic::ChoUnknown);
        assert_eq!(chorus(0b11).unwrap().bits(Role::Flags), cho::NA);
        assert_eq!(chorus(0b11).unwrap().bits(Role::Lfo), 2);
    }

    #[test]
    fn unknown_opcodes_are_rejected() {
        for op in 0x15..=0x1f {
            assert_eq!(
                decode(op),
                Err(DecodeError::UnknownOpcode { word: op })
            );
        }
    }

    #[test]
    fn program_stops_at_first_zero_skip() {
        let sof = word(opcode::SOF, &[(0, 11), (0x4000, 16)]);
        let skp_run_0 = word(opcode::SKP, &[(0, 16), (0, 6), (skp::RUN, 5)]);
        let program = decode_program(&[sof, sof, skp_run_0, sof]).unwrap();
        assert_eq!(program.len(), 2);
        let program = decode_program(&[sof, 0x11, sof]).unwrap();
        assert_eq!(program.len(), 1);
        let skp_1 = word(opcode::SKP, &[(0, 16), (1, 6), (skp::RUN, 5)]);
        let program = decode_program(&[skp_1, sof]).unwrap();
        assert_eq!(program.len(), 2);
    }

    #[test]
    fn program_length_is_bounded() {
        let sof = word(opcode::SOF, &[(0, 11), (0x4000, 16)]);
        let mut words = vec![sof; MAX_PROGRAM_LEN];
        assert_eq!(decode_program(&words).unwrap().len(), MAX_PROGRAM_LEN);
        words.push(0x11);
        assert_eq!(decode_program(&words).unwrap().len(), MAX_PROGRAM_LEN);
        words.insert(0, sof);
        assert_eq!(
            decode_program(&words),
            Err(DecodeError::ProgramTooLong {
                limit: MAX_PROGRAM_LEN
            })
        );
    }

    #[test]
    fn program_rejects_reserved_chorus_mode() {
        let sof = word(opcode::SOF, &[(0, 11), (0x4000, 16)]);
        let bad = word(opcode::CHO, &[(0, 16), (0, 2), (0, 1), (0, 6), (0b01, 2)]);
        assert_eq!(
            decode_program(&[sof, bad]),
            Err(DecodeError::UnknownInstruction {
                index: 1,
                word: bad
            })
        );
    }
}
