//! Engine configuration
//!
//! Everything has a default matching the documented chip, so a missing
//! config file is not an error. A present file is read as TOML:
//!
//! ```toml
//! delay-size = 32768
//! saturate = true
//! max-program-len = 128
//! max-steps-per-sample = 1024
//! sample-rate = 32768
//! ```

use crate::instr::MAX_PROGRAM_LEN;
use crate::lfo::SAMPLE_RATE;
use std::path::{Path, PathBuf};
use thiserror::Error;
use toml::value::{Table, Value};

static CONFIG_FILE_PATHS: &[(bool, &str)] = &[
    (true, ".config/fv1/config.toml"),
    (true, ".config/fv1.toml"),
    (false, "/etc/fv1.toml"),
];

/// Delay memory size of the chip in samples
pub const DELAY_SIZE: usize = 32768;

const MAX_PROGRAM_LEN_LIMIT: usize = 1024;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("unable to read config file ({0})")]
    Io(#[from] std::io::Error),
    #[error("config file parsing error: {0}")]
    De(#[from] toml::de::Error),
    #[error("expected type `{expected}`, got `{got}`")]
    WrongType {
        expected: &'static str,
        got: &'static str,
    },
    #[error("unknown field `{0}`")]
    UnknownField(String),
    #[error("value {value} for field `{field}` is not within {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },
}

macro_rules! getval {
    ($val:expr, $ty:ident) => {
        match $val {
            Value::$ty(val) => Ok(val),
            val => Err(ConfigLoadError::WrongType {
                expected: stringify!($ty),
                got: val.type_str(),
            }),
        }
    };
}

fn ranged(
    field: &'static str,
    val: &Value,
    min: i64,
    max: i64,
) -> Result<i64, ConfigLoadError> {
    let value = *getval!(val, Integer)?;
    if (min..=max).contains(&value) {
        Ok(value)
    } else {
        Err(ConfigLoadError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Length of the delay memory in samples
    pub delay_size: usize,
    /// Clamp arithmetic to 24 bits; off for unclamped reference runs
    pub saturate: bool,
    /// Upper bound for decoded programs
    pub max_program_len: usize,
    /// Instructions one sample may execute before it is aborted
    pub max_steps_per_sample: usize,
    /// Sample rate the chip is clocked for, only used to report LFO rates
    pub sample_rate: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            delay_size: DELAY_SIZE,
            saturate: true,
            max_program_len: MAX_PROGRAM_LEN,
            max_steps_per_sample: 1024,
            sample_rate: SAMPLE_RATE,
        }
    }
}

impl EngineConfig {
    /// Load `path`, or the first existing default config file
    pub fn load(path: Option<PathBuf>) -> Result<Self, ConfigLoadError> {
        if let Some(path) = path.or_else(Self::seek_config_path) {
            tracing::info!(path = %path.display(), "loading config file");
            Self::load_from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigLoadError> {
        Self::load_from_str(&std::fs::read_to_string(path)?)
    }

    pub fn load_from_str(src: &str) -> Result<Self, ConfigLoadError> {
        let main: Table = toml::de::from_str(src)?;
        let mut slf = Self::default();
        for (key, val) in main.iter() {
            match key.as_str() {
                "delay-size" => {
                    slf.delay_size = ranged("delay-size", val, 1, DELAY_SIZE as i64)? as usize
                }
                "saturate" => slf.saturate = *getval!(val, Boolean)?,
                "max-program-len" => {
                    slf.max_program_len =
                        ranged("max-program-len", val, 1, MAX_PROGRAM_LEN_LIMIT as i64)? as usize
                }
                "max-steps-per-sample" => {
                    slf.max_steps_per_sample =
                        ranged("max-steps-per-sample", val, 1, u32::MAX.into())? as usize
                }
                "sample-rate" => {
                    slf.sample_rate = ranged("sample-rate", val, 1, u32::MAX.into())? as u32
                }
                _ => return Err(ConfigLoadError::UnknownField(key.clone())),
            }
        }
        Ok(slf)
    }

    pub fn seek_config_path() -> Option<PathBuf> {
        CONFIG_FILE_PATHS
            .iter()
            .filter_map(|&(with_home, path)| {
                if with_home {
                    std::env::var_os("HOME").map(|home| Path::new(&home).join(path))
                } else {
                    Some(PathBuf::from(path))
                }
            })
            .find(|path| path.is_file())
    }
}
