//! An instruction-level emulator of the FV-1 audio effects DSP
//!
//! The chip runs a program of at most 128 instructions once per audio
//! sample. A host decodes the program image once with
//! [`instr::decode_program`], creates one [`state::MachineState`] and then
//! calls [`engine::Engine::process`] for every input frame.
//!
//! ```no_run
//! use fv1::{config::EngineConfig, engine::Engine, fixed::Fixed, instr, state::MachineState};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load(None)?;
//! // SOF 0.5, 0.0
//! let program = instr::decode_program_with_limit(&[0x2000_000d], config.max_program_len)?;
//! let engine = Engine::new(&config);
//! let mut state = MachineState::new(&config);
//! let (left, right) = engine.process(&program, &mut state, Fixed::from_float(0.5), Fixed::ZERO)?;
//! println!("{left} {right}, {}", state.diagnostics);
//! # Ok(())
//! # }
//! ```
//!
//! # Literature
//!
//! - FV-1 datasheet, Spin Semiconductor
//! - SpinASM user manual

pub mod config;
pub mod diagnostics;
pub mod engine;
pub mod fixed;
pub mod instr;
pub mod lfo;
pub mod registers;
pub mod state;

pub use config::{ConfigLoadError, EngineConfig};
pub use engine::{Engine, EngineError, Step};
pub use fixed::{Fixed, QFormat};
pub use instr::{decode, decode_program, DecodeError, Operation};
pub use state::{MachineState, SnapshotError};
