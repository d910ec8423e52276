//! Startup and configuration errors
//!
//! Everything that can stop the program before streaming begins. Once
//! samples flow, recoverable conditions are boolean outcomes plus a stats
//! counter; nothing on the hot path raises an error.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid sample rate: {0}")]
    InvalidRate(String),

    #[error("unsupported rate combination: {0} -> {1} MHz")]
    UnsupportedRatePair(f64, f64),

    #[error("no supported output rate for input rate {0} MHz")]
    NoOutputRate(f64),

    #[error("missing required argument: {0}")]
    MissingArgument(&'static str),

    #[error("unknown or incomplete argument: {0}")]
    UnknownArgument(String),

    #[error("device config {0}: {1}")]
    DeviceConfig(String, String),

    #[error("taps file {0}: {1}")]
    TapsFile(String, String),
}

#[derive(Debug, Error)]
pub enum DeviceError {
    #[error("failed to spawn {0}: {1}")]
    Spawn(String, String),
}
