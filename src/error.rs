//! Error taxonomy for the acquisition binaries.
//!
//! Startup-fatal variants carry the process exit code the binaries report;
//! everything else is runtime-recoverable and handled at the call site.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AcqError {
    #[error("serial port {port} not opened: {source}")]
    SerialOpen {
        port: String,
        source: serialport::Error,
    },

    #[error("command input pipe not created: {0}")]
    PipeCreate(io::Error),

    #[error("command input pipe not opened: {0}")]
    PipeOpen(io::Error),

    #[error("initial output data file not opened: {0}")]
    InitialRawFile(io::Error),

    #[error("configuration file missing or not found: {0}")]
    ConfigMissing(String),

    #[error("configuration file not readable: {0}")]
    ConfigParse(String),

    #[error("another instance holds the lock file {0}")]
    LockContention(String),

    #[error("too many averaging windows: {got} (max {max})")]
    TooManyWindows { got: usize, max: usize },

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl AcqError {
    /// Exit code reported when the error aborts process startup.
    pub fn exit_code(&self) -> i32 {
        match self {
            AcqError::SerialOpen { .. } => 3,
            AcqError::PipeCreate(_) => 4,
            AcqError::PipeOpen(_) => 5,
            AcqError::InitialRawFile(_) => 6,
            AcqError::ConfigMissing(_) | AcqError::ConfigParse(_) => 20,
            AcqError::LockContention(_) => 30,
            AcqError::TooManyWindows { .. } | AcqError::Io(_) => 1,
        }
    }
}
