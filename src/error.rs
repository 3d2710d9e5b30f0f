//! Custom error types for the application.
//!
//! This module defines the primary error type, `SweepError`, for the entire crate.
//! Using the `thiserror` crate, it gives one place to classify everything that can
//! go wrong during a bench run, from bad sweep parameters to a multimeter that
//! stops answering halfway through.
//!
//! ## Error Hierarchy
//!
//! - **`InvalidParameter`**: the sweep configuration is unusable (e.g. a zero step).
//!   Raised before any instrument is touched.
//! - **`Connection`**: an instrument address could not be opened.
//! - **`Instrument`**: a write or query failed (or timed out) after the instrument
//!   was opened. Terminal for the run.
//! - **`Parse`**: an instrument reply could not be read as a number. The sequencer
//!   recovers from this locally by recording a NaN reading.
//! - **`Io`** / **`Storage`**: the output file could not be created or written.
//! - **`Config`**: settings failed to load or validate.
//! - **`FeatureNotEnabled`**: code tried to use a transport or storage backend that
//!   was not compiled in.
//!
//! Transports report `anyhow::Error`; the instrument session converts those into
//! `Connection` or `Instrument` depending on the lifecycle stage.

use crate::config::ConfigError;
use std::fmt;
use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type AppResult<T> = std::result::Result<T, SweepError>;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Connection to '{address}' failed: {reason}")]
    Connection { address: String, reason: String },

    #[error("Instrument error: {0}")]
    Instrument(String),

    #[error("Could not parse instrument reply: {0}")]
    Parse(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Feature '{0}' is not enabled. Please build with --features {0}")]
    FeatureNotEnabled(String),
}

/// Coarse classification of a [`SweepError`], stable for logs and reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidParameter,
    Connection,
    InstrumentFault,
    ParseFault,
    IoFault,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidParameter => "InvalidParameter",
            ErrorKind::Connection => "ConnectionError",
            ErrorKind::InstrumentFault => "InstrumentFault",
            ErrorKind::ParseFault => "ParseFault",
            ErrorKind::IoFault => "IOFault",
            ErrorKind::Config => "ConfigError",
        };
        f.write_str(name)
    }
}

impl SweepError {
    /// Returns the taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SweepError::InvalidParameter(_) => ErrorKind::InvalidParameter,
            SweepError::Connection { .. } => ErrorKind::Connection,
            SweepError::Instrument(_) => ErrorKind::InstrumentFault,
            SweepError::Parse(_) => ErrorKind::ParseFault,
            SweepError::Io(_) | SweepError::Storage(_) => ErrorKind::IoFault,
            SweepError::Config(_) | SweepError::FeatureNotEnabled(_) => ErrorKind::Config,
        }
    }

    /// Builds a `Connection` error, keeping the full `anyhow` context chain.
    pub fn connection(address: &str, err: &anyhow::Error) -> Self {
        SweepError::Connection {
            address: address.to_string(),
            reason: format!("{:#}", err),
        }
    }

    /// Builds an `Instrument` error, keeping the full `anyhow` context chain.
    pub fn instrument(err: &anyhow::Error) -> Self {
        SweepError::Instrument(format!("{:#}", err))
    }
}

#[cfg(feature = "storage_csv")]
impl From<csv::Error> for SweepError {
    fn from(err: csv::Error) -> Self {
        SweepError::Storage(err.to_string())
    }
}
